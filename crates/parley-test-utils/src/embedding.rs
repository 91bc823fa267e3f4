use async_trait::async_trait;
use parley_protocol::{EmbeddingService, ServiceError};
use std::collections::HashMap;

/// Bag-of-words embedder: each lowercase token bumps one hashed bucket.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        if self.dimensions == 0 {
            return vector;
        }
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) as usize % self.dimensions;
            vector[bucket] += 1.0;
        }
        vector
    }
}

fn fnv1a(value: &str) -> u64 {
    value.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl EmbeddingService for HashEmbedder {
    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(inputs.iter().map(|input| self.vector(input)).collect())
    }
}

/// Returns a preset vector per exact input text, and `fallback` otherwise.
#[derive(Debug, Clone)]
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
}

impl FixedEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            vectors: HashMap::new(),
            fallback,
        }
    }

    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingService for FixedEmbedder {
    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(inputs
            .iter()
            .map(|input| {
                self.vectors
                    .get(input)
                    .cloned()
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct FailingEmbedder {
    message: String,
}

impl FailingEmbedder {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl EmbeddingService for FailingEmbedder {
    async fn embed(&self, _inputs: Vec<String>) -> Result<Vec<Vec<f32>>, ServiceError> {
        Err(ServiceError::Embedding(self.message.clone()))
    }
}
