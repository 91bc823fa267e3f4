//! Shared types for Parley conversation memory: messages, partitions, and
//! the contracts of the external services the memory stores call into.

mod memory;
mod message;
mod partition;
mod search;
mod service;

pub use memory::{Memory, SortKey};
pub use message::{Message, RoleType};
pub use partition::PartitionKey;
pub use search::{
    FieldKind, HashDocument, HashValue, SchemaField, SearchClient, SearchRequest,
    vector_from_bytes, vector_to_bytes,
};
pub use service::{CompletionService, EmbeddingService, KeywordExtractor, ServiceError};
