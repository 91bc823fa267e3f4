//! Partitioned conversation memory with keyword, embedding and time-window
//! retrieval, plus recursive summarization of long histories.

pub mod builder;
pub mod error;
pub mod file;
pub mod keywords;
pub mod llm;
pub mod naming;
pub mod record;
pub mod retrieval;
pub mod search;
pub mod similarity;
pub mod store;
pub mod summary;
pub mod tools;
pub mod window;

/// Config-driven construction.
pub use builder::{MemoryServices, build_compactor, build_memory};
/// Memory error type.
pub use error::MemoryError;
/// Local file backend.
pub use file::{FileMemoryStore, LocalVectorIndex};
/// Default keyword extractor.
pub use keywords::TermFrequencyExtractor;
/// autoagents adapter.
pub use llm::LlmServices;
pub use record::MessageRecord;
/// Retrieval requests and parameters.
pub use retrieval::{
    DatetimeField, DatetimeQuery, EmbeddingQuery, MatchOptions, RetrievalParams,
    RetrievalRequest, RetrievalType, TextQuery,
};
/// Remote search backend.
pub use search::{FieldFilter, QueryBuilder, SearchMemoryStore};
pub use similarity::{KeywordMatcher, weighted_jaccard};
/// Store and router contracts.
pub use store::{ConversationMemory, MemoryStore, PartitionViews, RetrievalRouter};
/// History compaction.
pub use summary::{
    SUMMARY_PROMPT_TEMPLATE, SummaryCompactor, SummaryContext, SummaryPolicy, render_transcript,
    split_at_user_turn,
};
pub use tools::ToolTrace;
pub use window::{TimeWindow, parse_datetime};
