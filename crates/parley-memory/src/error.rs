//! Error types for memory operations.

use parley_config::ConfigError;
use parley_protocol::ServiceError;

/// Errors returned by memory stores, retrieval, and compaction.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Regex compilation error.
    #[error("regex error: {0}")]
    Regex(String),
    /// A persisted record could not be decoded.
    #[error("malformed record at {path}:{line}: {message}")]
    MalformedRecord {
        path: String,
        line: usize,
        message: String,
    },
    /// Retrieval dispatch key is not recognized.
    #[error("unsupported retrieval type '{requested}' (valid: {valid})")]
    UnsupportedRetrievalType { requested: String, valid: String },
    /// A datetime parameter could not be parsed.
    #[error("invalid datetime: {0}")]
    InvalidDatetime(String),
    /// Similarity search requested while no embedding service is configured.
    #[error("vector search unavailable: {0}")]
    VectorSearchUnavailable(String),
    /// Embedding width differs from the configured dimensions.
    #[error("embedding dimension mismatch (expected={expected}, actual={actual})")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Embedding, completion, or index service failure.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
