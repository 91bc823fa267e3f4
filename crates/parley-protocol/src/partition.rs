//! Partition identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Isolation unit for stored messages: chat, namespace, memory kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Chat identifier.
    pub chat_index: String,
    /// Namespace the chat is stored under (usually the agent or team name).
    pub unique_name: String,
    /// Kind of memory, e.g. `recall`.
    pub memory_type: String,
}

impl PartitionKey {
    /// Build a key from its three parts.
    pub fn new(
        chat_index: impl Into<String>,
        unique_name: impl Into<String>,
        memory_type: impl Into<String>,
    ) -> Self {
        Self {
            chat_index: chat_index.into(),
            unique_name: unique_name.into(),
            memory_type: memory_type.into(),
        }
    }

    /// Same namespace, different chat.
    pub fn with_chat(&self, chat_index: impl Into<String>) -> Self {
        Self {
            chat_index: chat_index.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.chat_index, self.unique_name, self.memory_type
        )
    }
}
