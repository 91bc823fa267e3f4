//! Configuration schema for Parley memory.

use directories::ProjectDirs;
use parley_protocol::PartitionKey;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placeholder the summary prompt template must contain.
pub const CONVERSATION_PLACEHOLDER: &str = "{conversation}";

/// Root config for a memory store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub namespace: NamespaceConfig,
    #[serde(default)]
    pub file: FileBackendConfig,
    #[serde(default)]
    pub search: SearchBackendConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
}

impl MemoryConfig {
    /// Partition key for a chat under the configured namespace.
    pub fn partition_key(&self, chat_index: impl Into<String>) -> PartitionKey {
        PartitionKey::new(
            chat_index,
            self.namespace.unique_name.clone(),
            self.namespace.memory_type.clone(),
        )
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Local JSONL files plus an in-process vector index.
    #[default]
    File,
    /// Remote hash-indexed search engine.
    Search,
}

/// Default namespace used to build partition keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    #[serde(default = "default_unique_name")]
    pub unique_name: String,
    #[serde(default = "default_memory_type")]
    pub memory_type: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            unique_name: default_unique_name(),
            memory_type: default_memory_type(),
        }
    }
}

fn default_unique_name() -> String {
    "default".to_string()
}

fn default_memory_type() -> String {
    "recall".to_string()
}

/// Settings for the file backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileBackendConfig {
    #[serde(default)]
    pub root: Option<String>,
}

impl FileBackendConfig {
    /// Configured root, or the platform data directory when unset.
    pub fn resolved_root(&self) -> PathBuf {
        if let Some(root) = &self.root {
            return PathBuf::from(root);
        }
        ProjectDirs::from("ai", "liquidos", "parley")
            .map(|dirs| dirs.data_dir().join("memory"))
            .unwrap_or_else(|| PathBuf::from(".parley").join("memory"))
    }
}

/// Settings for the search-engine backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBackendConfig {
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchBackendConfig {
    fn default() -> Self {
        Self {
            index_prefix: default_index_prefix(),
            max_results: default_max_results(),
        }
    }
}

/// Default prefix for index names and hash keys.
fn default_index_prefix() -> String {
    "parley_message".to_string()
}

/// Default page size for partition reads.
fn default_max_results() -> usize {
    1000
}

/// Embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dimensions: default_dimensions(),
        }
    }
}

/// Vector width of the reference embedding model.
fn default_dimensions() -> usize {
    768
}

/// Retrieval defaults applied when a caller leaves a parameter unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_text_score_threshold")]
    pub text_score_threshold: f32,
    #[serde(default)]
    pub embedding_score_threshold: f32,
    /// Keywords extracted per text; `0` keeps every keyword.
    #[serde(default = "default_tag_top_k")]
    pub tag_top_k: usize,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            text_score_threshold: default_text_score_threshold(),
            embedding_score_threshold: 0.0,
            tag_top_k: default_tag_top_k(),
            window_minutes: default_window_minutes(),
        }
    }
}

impl RetrievalConfig {
    /// Keyword limit as an option, `None` meaning unlimited.
    pub fn tag_limit(&self) -> Option<usize> {
        (self.tag_top_k > 0).then_some(self.tag_top_k)
    }
}

fn default_top_k() -> usize {
    5
}

fn default_text_score_threshold() -> f32 {
    0.3
}

fn default_tag_top_k() -> usize {
    5
}

fn default_window_minutes() -> i64 {
    5
}

/// Compaction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_split_n")]
    pub split_n: usize,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            split_n: default_split_n(),
            max_messages: default_max_messages(),
            prompt_template: None,
        }
    }
}

/// Messages kept verbatim after a compaction pass.
fn default_split_n() -> usize {
    20
}

/// Current-view size that triggers a policy-driven compaction.
fn default_max_messages() -> usize {
    40
}
