//! Contracts for the external services memory stores depend on.

use async_trait::async_trait;

/// Failures reported by embedding, completion, or index services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Embedding request failed.
    #[error("embedding failed: {0}")]
    Embedding(String),
    /// Completion request failed.
    #[error("completion failed: {0}")]
    Completion(String),
    /// Remote index request failed.
    #[error("index request failed: {0}")]
    Index(String),
    /// Service is not reachable or not configured.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed every input, preserving order.
    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, ServiceError>;
}

/// Produces a completion for a prompt.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Complete a single prompt.
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// Extracts ranked keywords from text.
pub trait KeywordExtractor: Send + Sync {
    /// Return up to `top_n` unique keywords, most significant first.
    /// `None` returns every keyword.
    fn extract(&self, text: &str, top_n: Option<usize>) -> Vec<String>;
}
