//! Config-driven construction of memory stores and compactors.

use crate::error::MemoryError;
use crate::file::FileMemoryStore;
use crate::keywords::TermFrequencyExtractor;
use crate::llm::LlmServices;
use crate::search::SearchMemoryStore;
use crate::store::ConversationMemory;
use crate::summary::SummaryCompactor;
use autoagents_llm::LLMProvider;
use log::info;
use parley_config::{BackendKind, MemoryConfig};
use parley_protocol::{
    CompletionService, EmbeddingService, KeywordExtractor, SearchClient, ServiceError,
};
use std::sync::Arc;

/// External collaborators handed to [`build_memory`].
#[derive(Clone, Default)]
pub struct MemoryServices {
    pub embedder: Option<Arc<dyn EmbeddingService>>,
    pub completion: Option<Arc<dyn CompletionService>>,
    pub keywords: Option<Arc<dyn KeywordExtractor>>,
    pub search_client: Option<Arc<dyn SearchClient>>,
}

impl MemoryServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embedding and completion from one LLM provider.
    pub fn from_llm(llm: Arc<dyn LLMProvider>) -> Self {
        let services = Arc::new(LlmServices::new(llm));
        Self {
            embedder: Some(services.clone()),
            completion: Some(services),
            ..Self::default()
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingService>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_completion(mut self, completion: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn with_keywords(mut self, keywords: Arc<dyn KeywordExtractor>) -> Self {
        self.keywords = Some(keywords);
        self
    }

    pub fn with_search_client(mut self, client: Arc<dyn SearchClient>) -> Self {
        self.search_client = Some(client);
        self
    }

    fn keyword_extractor(&self) -> Result<Arc<dyn KeywordExtractor>, MemoryError> {
        match &self.keywords {
            Some(keywords) => Ok(keywords.clone()),
            None => Ok(Arc::new(TermFrequencyExtractor::new()?)),
        }
    }
}

/// Build the configured backend.
///
/// The embedder is attached only when `embedding.enabled` is set; enabling
/// embeddings without providing one is an error.
pub fn build_memory(
    config: &MemoryConfig,
    services: MemoryServices,
) -> Result<Arc<dyn ConversationMemory>, MemoryError> {
    config.validate()?;
    let extractor = services.keyword_extractor()?;
    let embedder = if config.embedding.enabled {
        let embedder = services.embedder.clone().ok_or_else(|| {
            ServiceError::Unavailable("embedding enabled but no embedder provided".to_string())
        })?;
        Some(embedder)
    } else {
        None
    };
    let dimensions = config.embedding.dimensions;

    match config.backend {
        BackendKind::File => {
            let root = config.file.resolved_root();
            let mut store = FileMemoryStore::new(&root, extractor)?
                .with_retrieval(config.retrieval.clone());
            if let Some(embedder) = embedder {
                store = store.with_embedder(embedder, dimensions);
            }
            info!(
                "built file memory (root={}, embeddings={})",
                root.display(),
                config.embedding.enabled
            );
            Ok(Arc::new(store))
        }
        BackendKind::Search => {
            let client = services.search_client.clone().ok_or_else(|| {
                ServiceError::Unavailable("search backend selected without a client".to_string())
            })?;
            let mut store = SearchMemoryStore::new(client, extractor)
                .with_settings(config.search.clone())
                .with_retrieval(config.retrieval.clone())
                .with_dimensions(dimensions);
            if let Some(embedder) = embedder {
                store = store.with_embedder(embedder, dimensions);
            }
            info!(
                "built search memory (index_prefix={}, embeddings={})",
                config.search.index_prefix, config.embedding.enabled
            );
            Ok(Arc::new(store))
        }
    }
}

/// Build a compactor when a completion service is available.
pub fn build_compactor(
    config: &MemoryConfig,
    services: &MemoryServices,
) -> Result<Option<SummaryCompactor>, MemoryError> {
    config.validate()?;
    let Some(completion) = services.completion.clone() else {
        if config.summary.enabled {
            return Err(ServiceError::Unavailable(
                "summary enabled but no completion service provided".to_string(),
            )
            .into());
        }
        return Ok(None);
    };
    Ok(Some(SummaryCompactor::from_config(
        completion,
        &config.summary,
    )))
}
