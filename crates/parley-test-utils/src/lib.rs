//! Test helpers shared across Parley crates.

pub mod completion;
pub mod embedding;
pub mod fixtures;
pub mod llm;
pub mod logging;
pub mod search;

pub use completion::{FailingCompleter, RecordingCompleter};
pub use embedding::{FailingEmbedder, FixedEmbedder, HashEmbedder};
pub use fixtures::{agent_turn, at, summary_turn, user_turn};
pub use llm::{FailingLLM, ScriptedLLM};
pub use logging::init_logging;
pub use search::InMemorySearchClient;
