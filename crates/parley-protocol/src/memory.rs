//! Ordered message collection and its derived views.

use crate::message::{Message, RoleType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Field used to order a [`Memory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Order by `start_datetime`.
    StartDatetime,
    /// Order by `end_datetime`.
    EndDatetime,
    /// Order by `message_index` (lexicographic).
    MessageIndex,
    /// Order by `chat_index` (lexicographic).
    ChatIndex,
}

/// Messages in append order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    #[serde(default)]
    messages: Vec<Message>,
}

impl Memory {
    /// Create an empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append every message from another memory.
    pub fn extend(&mut self, other: Memory) {
        self.messages.extend(other.messages);
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Borrow the messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Consume into the underlying vector.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Iterate messages in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// Messages whose role type is not in `role_types`.
    pub fn filter_by_role_type(&self, role_types: &[RoleType]) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|message| !role_types.contains(&message.role_type))
            .cloned()
            .collect()
    }

    /// Messages whose role type is in `role_types`.
    pub fn select_by_role_type(&self, role_types: &[RoleType]) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|message| role_types.contains(&message.role_type))
            .cloned()
            .collect()
    }

    /// End timestamps of every message.
    pub fn datetimes(&self) -> Vec<DateTime<Utc>> {
        self.messages
            .iter()
            .map(|message| message.end_datetime)
            .collect()
    }

    /// Primary texts of every message.
    pub fn contents(&self) -> Vec<&str> {
        self.messages.iter().map(Message::primary_text).collect()
    }

    /// Stable sort by the given key.
    pub fn sort_by_key(&mut self, key: SortKey) {
        match key {
            SortKey::StartDatetime => self.messages.sort_by_key(|message| message.start_datetime),
            SortKey::EndDatetime => self.messages.sort_by_key(|message| message.end_datetime),
            SortKey::MessageIndex => self
                .messages
                .sort_by(|a, b| a.message_index.cmp(&b.message_index)),
            SortKey::ChatIndex => self.messages.sort_by(|a, b| a.chat_index.cmp(&b.chat_index)),
        }
    }
}

impl From<Vec<Message>> for Memory {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl FromIterator<Message> for Memory {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Memory {
    type Item = Message;
    type IntoIter = std::vec::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}
