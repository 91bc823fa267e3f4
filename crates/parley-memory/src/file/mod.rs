//! File-backed memory store: one JSONL file per partition plus a flat local vector index.
//!
//! Safe for a single process with a single writer per partition.

mod vector;

pub use vector::{LocalVectorIndex, cosine_similarity};

use crate::error::MemoryError;
use crate::naming::key_component;
use crate::record::MessageRecord;
use crate::retrieval::{DatetimeQuery, EmbeddingQuery, TextQuery};
use crate::similarity::KeywordMatcher;
use crate::store::{MemoryStore, PartitionViews, RetrievalRouter, select_window};
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use parley_config::RetrievalConfig;
use parley_protocol::{
    EmbeddingService, KeywordExtractor, Memory, Message, PartitionKey, ServiceError,
};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of a partition's record file.
const RECORD_FILE: &str = "conversation.jsonl";

/// Memory store persisting each partition under `root/<chat>/<namespace>/<type>/`.
pub struct FileMemoryStore {
    root: PathBuf,
    partitions: Mutex<HashMap<PartitionKey, PartitionViews>>,
    vectors: Mutex<HashMap<PartitionKey, LocalVectorIndex>>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    dimensions: usize,
    matcher: KeywordMatcher,
    retrieval: RetrievalConfig,
}

impl FileMemoryStore {
    /// Create a store under the given root. Vector search stays unavailable until
    /// an embedder is attached.
    pub fn new(
        root: impl AsRef<Path>,
        extractor: Arc<dyn KeywordExtractor>,
    ) -> Result<Self, MemoryError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        info!("initialized file memory store (root={})", root.display());
        Ok(Self {
            root,
            partitions: Mutex::new(HashMap::new()),
            vectors: Mutex::new(HashMap::new()),
            embedder: None,
            dimensions: 0,
            matcher: KeywordMatcher::new(extractor),
            retrieval: RetrievalConfig::default(),
        })
    }

    /// Attach an embedding service producing `dimensions`-wide vectors.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingService>, dimensions: usize) -> Self {
        self.embedder = Some(embedder);
        self.dimensions = dimensions;
        self
    }

    /// Replace the retrieval defaults.
    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the partition's record file.
    pub fn partition_path(&self, key: &PartitionKey) -> PathBuf {
        self.root
            .join(key_component(&key.chat_index))
            .join(key_component(&key.unique_name))
            .join(key_component(&key.memory_type))
            .join(RECORD_FILE)
    }

    /// Number of messages in the partition's vector index.
    pub fn indexed_len(&self, key: &PartitionKey) -> usize {
        self.vectors.lock().get(key).map_or(0, LocalVectorIndex::len)
    }

    /// Path to the temporary record file.
    fn temp_path(&self, key: &PartitionKey) -> PathBuf {
        self.partition_path(key).with_extension("jsonl.tmp")
    }

    /// Load all records for a partition; `None` when no file exists.
    fn read_records(&self, key: &PartitionKey) -> Result<Option<Memory>, MemoryError> {
        let path = self.partition_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let file = OpenOptions::new().read(true).open(&path)?;
        let reader = BufReader::new(file);
        let mut memory = Memory::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: MessageRecord =
                serde_json::from_str(&line).map_err(|err| MemoryError::MalformedRecord {
                    path: path.display().to_string(),
                    line: index + 1,
                    message: err.to_string(),
                })?;
            memory.push(Message::from(record));
        }
        Ok(Some(memory))
    }

    /// Rewrite a partition's records atomically.
    fn write_records(&self, key: &PartitionKey, memory: &Memory) -> Result<(), MemoryError> {
        let path = self.partition_path(key);
        let temp_path = self.temp_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        {
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&temp_path)?;
            for message in memory.iter() {
                let line = serde_json::to_string(&MessageRecord::from(message))?;
                writeln!(file, "{line}")?;
            }
        }
        std::fs::rename(temp_path, path)?;
        Ok(())
    }

    /// Embed the primary text of each message that has one.
    async fn embed_messages(
        &self,
        messages: Vec<Message>,
    ) -> Result<Vec<(Vec<f32>, Message)>, MemoryError> {
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };
        let messages: Vec<Message> = messages
            .into_iter()
            .filter(|message| !message.primary_text().is_empty())
            .collect();
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let inputs = messages
            .iter()
            .map(|message| message.primary_text().to_string())
            .collect::<Vec<_>>();
        let vectors = embedder.embed(inputs).await?;
        if vectors.len() != messages.len() {
            return Err(ServiceError::Embedding(format!(
                "expected {} vectors, got {}",
                messages.len(),
                vectors.len()
            ))
            .into());
        }
        Ok(vectors.into_iter().zip(messages).collect())
    }

    /// Add messages to the partition's vector index.
    async fn index_messages(
        &self,
        key: &PartitionKey,
        messages: Vec<Message>,
    ) -> Result<(), MemoryError> {
        let embedded = self.embed_messages(messages).await?;
        if embedded.is_empty() {
            return Ok(());
        }
        let mut vectors = self.vectors.lock();
        let index = vectors
            .entry(key.clone())
            .or_insert_with(|| LocalVectorIndex::new(self.dimensions));
        for (vector, message) in embedded {
            index.add(vector, message)?;
        }
        Ok(())
    }

    /// Load the partition on first reference.
    async fn ensure_loaded(&self, key: &PartitionKey) -> Result<(), MemoryError> {
        if self.partitions.lock().contains_key(key) {
            return Ok(());
        }
        self.reload(key).await.map(|_| ())
    }

    fn snapshot(&self, key: &PartitionKey) -> PartitionViews {
        self.partitions
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn append(&self, key: &PartitionKey, message: Message) -> Result<bool, MemoryError> {
        self.ensure_loaded(key).await?;
        {
            let mut partitions = self.partitions.lock();
            let views = partitions.entry(key.clone()).or_default();
            if views.contains_equivalent(&message) {
                debug!(
                    "skipped duplicate message (key={key}, message_index={})",
                    message.message_index
                );
                return Ok(false);
            }
            views.push(message.clone());
            self.write_records(key, views.recall())?;
            debug!(
                "appended message (key={key}, role_type={}, size={})",
                message.role_type,
                views.len()
            );
        }
        self.index_messages(key, vec![message]).await?;
        Ok(true)
    }

    async fn load(&self, key: &PartitionKey) -> Result<Memory, MemoryError> {
        if !self.partitions.lock().contains_key(key) {
            return self.reload(key).await;
        }
        let recall = self.read_records(key)?.unwrap_or_default();
        debug!("loaded partition (key={key}, messages={})", recall.len());
        self.partitions
            .lock()
            .insert(key.clone(), PartitionViews::from_recall(recall.clone()));
        Ok(recall)
    }

    async fn save(&self, key: &PartitionKey) -> Result<(), MemoryError> {
        self.ensure_loaded(key).await?;
        let partitions = self.partitions.lock();
        let recall = partitions
            .get(key)
            .map(PartitionViews::recall)
            .cloned()
            .unwrap_or_default();
        self.write_records(key, &recall)?;
        debug!("saved partition (key={key}, messages={})", recall.len());
        Ok(())
    }

    async fn clear(&self, key: &PartitionKey) -> Result<(), MemoryError> {
        self.vectors.lock().remove(key);
        self.partitions
            .lock()
            .insert(key.clone(), PartitionViews::new());
        let path = self.partition_path(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        info!("cleared partition (key={key})");
        Ok(())
    }

    async fn reload(&self, key: &PartitionKey) -> Result<Memory, MemoryError> {
        self.vectors.lock().remove(key);
        let recall = self.read_records(key)?.unwrap_or_default();
        self.partitions
            .lock()
            .insert(key.clone(), PartitionViews::from_recall(recall.clone()));
        self.index_messages(key, recall.messages().to_vec()).await?;
        info!(
            "reloaded partition (key={key}, messages={}, indexed={})",
            recall.len(),
            self.indexed_len(key)
        );
        Ok(recall)
    }

    async fn views(&self, key: &PartitionKey) -> Result<PartitionViews, MemoryError> {
        self.ensure_loaded(key).await?;
        Ok(self.snapshot(key))
    }

    fn vector_search_available(&self) -> bool {
        self.embedder.is_some()
    }
}

#[async_trait]
impl RetrievalRouter for FileMemoryStore {
    fn retrieval_defaults(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    async fn embedding_retrieval(
        &self,
        key: &PartitionKey,
        query: &EmbeddingQuery,
    ) -> Result<Vec<Message>, MemoryError> {
        let Some(embedder) = &self.embedder else {
            return Err(MemoryError::VectorSearchUnavailable(
                "no embedding service configured".to_string(),
            ));
        };
        self.ensure_loaded(key).await?;
        let query_vector = embedder
            .embed(vec![query.text.clone()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Embedding("empty embedding response".to_string()))?;
        let vectors = self.vectors.lock();
        let Some(index) = vectors.get(key) else {
            return Ok(Vec::new());
        };
        let hits = index.search(&query_vector, query.top_k, query.score_threshold)?;
        debug!("embedding retrieval (key={key}, hits={})", hits.len());
        Ok(hits.into_iter().map(|(message, _)| message).collect())
    }

    async fn text_retrieval(
        &self,
        key: &PartitionKey,
        query: &TextQuery,
    ) -> Result<Vec<Message>, MemoryError> {
        let recall = self.views(key).await?.into_recall();
        Ok(self
            .matcher
            .rank(&query.text, recall.into_messages(), &query.options))
    }

    async fn datetime_retrieval(
        &self,
        key: &PartitionKey,
        query: &DatetimeQuery,
    ) -> Result<Vec<Message>, MemoryError> {
        let recall = self.views(key).await?.into_recall();
        Ok(select_window(&recall, query, &self.matcher))
    }
}

#[cfg(test)]
mod tests {
    use super::FileMemoryStore;
    use crate::keywords::TermFrequencyExtractor;
    use parley_protocol::{Memory, Message, PartitionKey, RoleType};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn rewrite_replaces_existing_records_in_place() {
        let temp = tempdir().expect("tempdir");
        let extractor = Arc::new(TermFrequencyExtractor::new().expect("extractor"));
        let store = FileMemoryStore::new(temp.path(), extractor).expect("store");
        let key = PartitionKey::new("chat", "planner", "recall");
        let first: Memory = vec![
            Message::new("chat", "agent", RoleType::Assistant).with_role_content("first"),
        ]
        .into();
        let second: Memory = vec![
            Message::new("chat", "agent", RoleType::Assistant).with_role_content("second"),
        ]
        .into();

        store.write_records(&key, &first).expect("write");
        store.write_records(&key, &second).expect("rewrite");

        let stored = store.read_records(&key).expect("read").expect("records");
        assert_eq!(stored.contents(), vec!["second"]);
        assert!(!store.temp_path(&key).exists());
    }

    #[test]
    fn lookalike_keys_get_separate_files() {
        let temp = tempdir().expect("tempdir");
        let extractor = Arc::new(TermFrequencyExtractor::new().expect("extractor"));
        let store = FileMemoryStore::new(temp.path(), extractor).expect("store");
        let slash = store.partition_path(&PartitionKey::new("team/a", "planner", "recall"));
        let underscore = store.partition_path(&PartitionKey::new("team_a", "planner", "recall"));
        assert_ne!(slash, underscore);
        assert!(slash.starts_with(temp.path().join("team%2Fa")));
    }

    #[test]
    fn partition_path_nests_key_parts() {
        let temp = tempdir().expect("tempdir");
        let extractor = Arc::new(TermFrequencyExtractor::new().expect("extractor"));
        let store = FileMemoryStore::new(temp.path(), extractor).expect("store");
        let key = PartitionKey::new("chat", "planner", "recall");
        assert_eq!(
            store.partition_path(&key),
            temp.path()
                .join("chat")
                .join("planner")
                .join("recall")
                .join("conversation.jsonl")
        );
    }
}
