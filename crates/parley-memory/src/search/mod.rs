//! Memory store backed by a remote hash-indexed search engine.
//!
//! The remote index is both durable state and retrieval index. One index exists
//! per namespace; partitions within it are separated by `chat_index`.

mod codec;
mod query;
mod schema;

pub use codec::{
    datetime_millis, decode_document, document_keywords, document_vector, encode_message,
};
pub use query::{FieldFilter, QueryBuilder, VECTOR_PARAM, escape};
pub use schema::{
    DEFAULT_VECTOR_DIM, DISTANCE_FIELD, KEYWORD_FIELD, VECTOR_FIELD, document_key, index_name,
    message_schema,
};

use crate::error::MemoryError;
use crate::retrieval::{DatetimeQuery, EmbeddingQuery, TextQuery};
use crate::similarity::KeywordMatcher;
use crate::store::{MemoryStore, PartitionViews, RetrievalRouter, select_window};
use crate::window::TimeWindow;
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use parley_config::{RetrievalConfig, SearchBackendConfig};
use parley_protocol::{
    EmbeddingService, HashDocument, HashValue, KeywordExtractor, Memory, Message, PartitionKey,
    SearchClient, SearchRequest, ServiceError, SortKey, vector_to_bytes,
};
use std::collections::HashSet;
use std::sync::Arc;

const CHAT_FIELD: &str = "chat_index";
const CONTENT_FIELD: &str = "role_content";

/// Memory store persisting messages as hashes in a remote search index.
pub struct SearchMemoryStore {
    client: Arc<dyn SearchClient>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    matcher: KeywordMatcher,
    settings: SearchBackendConfig,
    retrieval: RetrievalConfig,
    dimensions: usize,
    ensured: Mutex<HashSet<String>>,
}

impl SearchMemoryStore {
    /// Create a store without embeddings; vectors are stored as zero placeholders.
    pub fn new(client: Arc<dyn SearchClient>, extractor: Arc<dyn KeywordExtractor>) -> Self {
        Self {
            client,
            embedder: None,
            matcher: KeywordMatcher::new(extractor),
            settings: SearchBackendConfig::default(),
            retrieval: RetrievalConfig::default(),
            dimensions: DEFAULT_VECTOR_DIM,
            ensured: Mutex::new(HashSet::new()),
        }
    }

    /// Attach an embedding service producing `dimensions`-wide vectors.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingService>, dimensions: usize) -> Self {
        self.embedder = Some(embedder);
        self.dimensions = dimensions;
        self
    }

    /// Vector width used for the schema and placeholders.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_settings(mut self, settings: SearchBackendConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    /// Index holding the partition's namespace.
    pub fn index_for(&self, key: &PartitionKey) -> String {
        index_name(&self.settings.index_prefix, &key.unique_name, &key.memory_type)
    }

    /// Time-sorted messages of the partition matching every filter.
    pub async fn pool_by_fields(
        &self,
        key: &PartitionKey,
        filters: &[FieldFilter],
    ) -> Result<Memory, MemoryError> {
        let documents = self.fetch(key, filters.to_vec()).await?;
        Ok(sorted_memory(documents))
    }

    /// Time-sorted messages of the partition whose content matches a term.
    pub async fn pool_by_content(
        &self,
        key: &PartitionKey,
        text: &str,
    ) -> Result<Memory, MemoryError> {
        self.pool_by_fields(key, &[FieldFilter::text(CONTENT_FIELD, text)])
            .await
    }

    /// Create the namespace index unless it already exists.
    async fn ensure_index(&self, index: &str) -> Result<(), MemoryError> {
        if self.ensured.lock().contains(index) {
            return Ok(());
        }
        if !self.client.index_exists(index).await? {
            self.client
                .create_index(index, &format!("{index}:"), &message_schema(self.dimensions))
                .await?;
            info!(
                "created search index (index={index}, dimensions={})",
                self.dimensions
            );
        }
        self.ensured.lock().insert(index.to_string());
        Ok(())
    }

    /// Documents of the partition matching the extra filters, read page by page.
    ///
    /// The chat clause is a full-text match, so hits from other chats whose
    /// `chat_index` merely contains the same tokens are dropped here.
    async fn fetch(
        &self,
        key: &PartitionKey,
        filters: Vec<FieldFilter>,
    ) -> Result<Vec<HashDocument>, MemoryError> {
        let index = self.index_for(key);
        self.ensure_index(&index).await?;
        let query = QueryBuilder::new()
            .filter(FieldFilter::text(CHAT_FIELD, key.chat_index.clone()))
            .filters(filters)
            .build();
        debug!("search query (index={index}, query={query})");
        let page_size = self.settings.max_results.max(1);
        let mut documents = Vec::new();
        let mut offset = 0;
        loop {
            let request = SearchRequest::new(query.clone(), page_size).with_offset(offset);
            let page = self.client.search(&index, &request).await?;
            let fetched = page.len();
            offset += fetched;
            documents.extend(
                page.into_iter()
                    .filter(|document| in_chat(document, &key.chat_index)),
            );
            if fetched < page_size {
                break;
            }
        }
        Ok(documents)
    }

    async fn read_partition(&self, key: &PartitionKey) -> Result<Memory, MemoryError> {
        let documents = self.fetch(key, Vec::new()).await?;
        Ok(sorted_memory(documents))
    }

    /// Tags stored with a message: keywords of its primary text plus the
    /// message-index prefix.
    fn keywords_for(&self, message: &Message) -> Vec<String> {
        let mut keywords = self
            .matcher
            .extractor()
            .extract(message.primary_text(), None);
        let prefix = message
            .message_index
            .split('-')
            .next()
            .unwrap_or_default()
            .to_string();
        if !prefix.is_empty() && !keywords.contains(&prefix) {
            keywords.push(prefix);
        }
        keywords
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let Some(embedder) = &self.embedder else {
            return Ok(vec![0.0; self.dimensions]);
        };
        let vector = embedder
            .embed(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Embedding("empty embedding response".to_string()))?;
        if vector.len() != self.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Stored vector for a message; a zero placeholder without embeddings or text.
    async fn vector_for(&self, message: &Message) -> Result<Vec<f32>, MemoryError> {
        let text = message.primary_text();
        if self.embedder.is_none() || text.is_empty() {
            return Ok(vec![0.0; self.dimensions]);
        }
        self.embed_one(text).await
    }
}

fn in_chat(document: &HashDocument, chat_index: &str) -> bool {
    document.get(CHAT_FIELD).and_then(HashValue::as_text) == Some(chat_index)
}

fn sorted_memory(documents: Vec<HashDocument>) -> Memory {
    let mut memory: Memory = documents.iter().map(decode_document).collect();
    memory.sort_by_key(SortKey::EndDatetime);
    memory
}

#[async_trait]
impl MemoryStore for SearchMemoryStore {
    async fn append(&self, key: &PartitionKey, message: Message) -> Result<bool, MemoryError> {
        let views = self.views(key).await?;
        if views.contains_equivalent(&message) {
            debug!(
                "skipped duplicate message (key={key}, message_index={})",
                message.message_index
            );
            return Ok(false);
        }
        let index = self.index_for(key);
        let keywords = self.keywords_for(&message);
        let vector = self.vector_for(&message).await?;
        let mut document = encode_message(
            document_key(&index, &key.chat_index, &message.message_index),
            &message,
            &keywords,
            &vector,
        )?;
        document.insert(CHAT_FIELD, HashValue::Text(key.chat_index.clone()));
        self.client.insert_hash(&document).await?;
        debug!(
            "appended message (key={key}, role_type={}, keywords={})",
            message.role_type,
            keywords.len()
        );
        Ok(true)
    }

    async fn load(&self, key: &PartitionKey) -> Result<Memory, MemoryError> {
        let memory = self.read_partition(key).await?;
        debug!("loaded partition (key={key}, messages={})", memory.len());
        Ok(memory)
    }

    async fn save(&self, key: &PartitionKey) -> Result<(), MemoryError> {
        let documents = self.fetch(key, Vec::new()).await?;
        for document in &documents {
            let message = decode_document(document);
            let vector =
                document_vector(document).unwrap_or_else(|| vec![0.0; self.dimensions]);
            let rewritten = encode_message(
                document.id.clone(),
                &message,
                &document_keywords(document),
                &vector,
            )?;
            self.client.insert_hash(&rewritten).await?;
        }
        debug!("saved partition (key={key}, documents={})", documents.len());
        Ok(())
    }

    async fn clear(&self, key: &PartitionKey) -> Result<(), MemoryError> {
        let ids: Vec<String> = self
            .fetch(key, Vec::new())
            .await?
            .into_iter()
            .map(|document| document.id)
            .collect();
        let deleted = if ids.is_empty() {
            0
        } else {
            self.client.delete(&ids).await?
        };
        info!("cleared partition (key={key}, deleted={deleted})");
        Ok(())
    }

    async fn reload(&self, key: &PartitionKey) -> Result<Memory, MemoryError> {
        self.ensured.lock().remove(&self.index_for(key));
        let memory = self.read_partition(key).await?;
        info!("reloaded partition (key={key}, messages={})", memory.len());
        Ok(memory)
    }

    async fn views(&self, key: &PartitionKey) -> Result<PartitionViews, MemoryError> {
        Ok(PartitionViews::from_recall(self.read_partition(key).await?))
    }

    fn vector_search_available(&self) -> bool {
        self.embedder.is_some()
    }
}

#[async_trait]
impl RetrievalRouter for SearchMemoryStore {
    fn retrieval_defaults(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    async fn embedding_retrieval(
        &self,
        key: &PartitionKey,
        query: &EmbeddingQuery,
    ) -> Result<Vec<Message>, MemoryError> {
        if self.embedder.is_none() {
            return Err(MemoryError::VectorSearchUnavailable(
                "no embedding service configured".to_string(),
            ));
        }
        let vector = self.embed_one(&query.text).await?;
        let index = self.index_for(key);
        self.ensure_index(&index).await?;
        let knn = QueryBuilder::new()
            .filter(FieldFilter::text(CHAT_FIELD, key.chat_index.clone()))
            .knn(query.top_k);
        let request =
            SearchRequest::new(knn, query.top_k).with_param(VECTOR_PARAM, vector_to_bytes(&vector));
        let documents = self.client.search(&index, &request).await?;
        let hits: Vec<Message> = documents
            .iter()
            .filter(|document| in_chat(document, &key.chat_index))
            .filter(|document| {
                let distance = document
                    .get(DISTANCE_FIELD)
                    .and_then(HashValue::as_number)
                    .unwrap_or(1.0);
                1.0 - distance as f32 >= query.score_threshold
            })
            .take(query.top_k)
            .map(decode_document)
            .collect();
        debug!("embedding retrieval (key={key}, hits={})", hits.len());
        Ok(hits)
    }

    async fn text_retrieval(
        &self,
        key: &PartitionKey,
        query: &TextQuery,
    ) -> Result<Vec<Message>, MemoryError> {
        let keywords = self
            .matcher
            .extractor()
            .extract(&query.text, query.options.tag_top_k);
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self
            .pool_by_fields(key, &[FieldFilter::tags(KEYWORD_FIELD, keywords)])
            .await?;
        Ok(self
            .matcher
            .rank(&query.text, pool.into_messages(), &query.options))
    }

    async fn datetime_retrieval(
        &self,
        key: &PartitionKey,
        query: &DatetimeQuery,
    ) -> Result<Vec<Message>, MemoryError> {
        let window = TimeWindow::around(query.datetime, query.window_minutes);
        let pool = self
            .pool_by_fields(
                key,
                &[FieldFilter::range(
                    query.field.as_str(),
                    datetime_millis(window.start),
                    datetime_millis(window.end),
                )],
            )
            .await?;
        Ok(select_window(&pool, query, &self.matcher))
    }
}
