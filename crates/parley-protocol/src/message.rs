//! Dialogue turn record shared by every memory backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Tag describing who produced a message. Drives view routing and compaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RoleType {
    /// A human turn.
    #[default]
    User,
    /// An agent turn.
    Assistant,
    /// Tool or environment output.
    Observation,
    /// Synthetic compaction summary.
    Summary,
    /// Any other tag, kept verbatim.
    Other(String),
}

impl RoleType {
    /// String form used in storage and prompts.
    pub fn as_str(&self) -> &str {
        match self {
            RoleType::User => "user",
            RoleType::Assistant => "assistant",
            RoleType::Observation => "observation",
            RoleType::Summary => "summary",
            RoleType::Other(value) => value.as_str(),
        }
    }
}

impl From<&str> for RoleType {
    fn from(value: &str) -> Self {
        match value {
            "user" => RoleType::User,
            "assistant" => RoleType::Assistant,
            "observation" => RoleType::Observation,
            "summary" => RoleType::Summary,
            other => RoleType::Other(other.to_string()),
        }
    }
}

impl From<String> for RoleType {
    fn from(value: String) -> Self {
        RoleType::from(value.as_str())
    }
}

impl From<RoleType> for String {
    fn from(value: RoleType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dialogue turn or system-generated artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    /// Chat (conversation) identifier.
    pub chat_index: String,
    /// Identifier unique within a chat.
    pub message_index: String,
    /// User the chat belongs to.
    pub user_name: String,
    /// Name of the agent or role that produced the message.
    pub role_name: String,
    /// Role tag.
    pub role_type: RoleType,
    /// Prompt the role was running with.
    pub role_prompt: String,
    /// Original query text.
    pub input_query: String,
    /// Role output text.
    pub role_content: String,
    /// Intermediate step output text.
    pub step_content: String,
    /// Structured output parsed from the role content.
    pub parsed_output: Map<String, Value>,
    /// Structured outputs for each step.
    pub parsed_output_list: Vec<Map<String, Value>>,
    /// Caller-defined side-channel values.
    pub customed_kargs: Map<String, Value>,
    /// Documents retrieved from databases.
    pub db_docs: Vec<Value>,
    /// Documents retrieved from code search.
    pub code_docs: Vec<Value>,
    /// Documents retrieved from web search.
    pub search_docs: Vec<Value>,
    /// Phase that produced the message.
    pub phase_name: String,
    /// Chain that produced the message.
    pub chain_name: String,
    /// Turn start timestamp.
    pub start_datetime: DateTime<Utc>,
    /// Turn end timestamp; canonical ordering key.
    pub end_datetime: DateTime<Utc>,
    /// Derived tags for tag indexes.
    pub keyword: Vec<String>,
    /// Rendered figures keyed by name. Never persisted.
    pub figures: BTreeMap<String, String>,
    /// Tool descriptors available to the role. Never persisted.
    pub tools: Vec<Value>,
}

impl Default for Message {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            chat_index: String::new(),
            message_index: Uuid::new_v4().to_string(),
            user_name: String::new(),
            role_name: String::new(),
            role_type: RoleType::default(),
            role_prompt: String::new(),
            input_query: String::new(),
            role_content: String::new(),
            step_content: String::new(),
            parsed_output: Map::new(),
            parsed_output_list: Vec::new(),
            customed_kargs: Map::new(),
            db_docs: Vec::new(),
            code_docs: Vec::new(),
            search_docs: Vec::new(),
            phase_name: String::new(),
            chain_name: String::new(),
            start_datetime: now,
            end_datetime: now,
            keyword: Vec::new(),
            figures: BTreeMap::new(),
            tools: Vec::new(),
        }
    }
}

impl Message {
    /// Create a message for a chat, stamped with the current time.
    pub fn new(
        chat_index: impl Into<String>,
        role_name: impl Into<String>,
        role_type: impl Into<RoleType>,
    ) -> Self {
        Self {
            chat_index: chat_index.into(),
            role_name: role_name.into(),
            role_type: role_type.into(),
            ..Self::default()
        }
    }

    /// Set the message index.
    pub fn with_message_index(mut self, message_index: impl Into<String>) -> Self {
        self.message_index = message_index.into();
        self
    }

    /// Set the user name.
    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self
    }

    /// Set the input query.
    pub fn with_input_query(mut self, input_query: impl Into<String>) -> Self {
        self.input_query = input_query.into();
        self
    }

    /// Set the role content.
    pub fn with_role_content(mut self, role_content: impl Into<String>) -> Self {
        self.role_content = role_content.into();
        self
    }

    /// Set the step content.
    pub fn with_step_content(mut self, step_content: impl Into<String>) -> Self {
        self.step_content = step_content.into();
        self
    }

    /// Append one parsed output entry.
    pub fn with_parsed_output(mut self, entry: Map<String, Value>) -> Self {
        self.parsed_output_list.push(entry);
        self
    }

    /// Replace the side-channel values.
    pub fn with_customed_kargs(mut self, customed_kargs: Map<String, Value>) -> Self {
        self.customed_kargs = customed_kargs;
        self
    }

    /// Stamp both start and end with the same instant.
    pub fn at(mut self, datetime: DateTime<Utc>) -> Self {
        self.start_datetime = datetime;
        self.end_datetime = datetime;
        self
    }

    /// First non-empty of step content, role content, input query.
    pub fn primary_text(&self) -> &str {
        [&self.step_content, &self.role_content, &self.input_query]
            .into_iter()
            .find(|text| !text.is_empty())
            .map_or("", String::as_str)
    }

    /// Whether the message is a compaction summary.
    pub fn is_summary(&self) -> bool {
        self.role_type == RoleType::Summary
    }
}
