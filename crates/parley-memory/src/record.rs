//! Persisted form of a message.

use chrono::{DateTime, Utc};
use parley_protocol::{Message, RoleType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Allow-listed message fields that survive persistence.
///
/// `keyword`, `figures` and `tools` are not part of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageRecord {
    pub chat_index: String,
    pub message_index: String,
    pub user_name: String,
    pub role_name: String,
    pub role_type: RoleType,
    pub role_prompt: String,
    pub input_query: String,
    pub role_content: String,
    pub step_content: String,
    pub parsed_output: Map<String, Value>,
    pub parsed_output_list: Vec<Map<String, Value>>,
    pub customed_kargs: Map<String, Value>,
    pub db_docs: Vec<Value>,
    pub code_docs: Vec<Value>,
    pub search_docs: Vec<Value>,
    pub phase_name: String,
    pub chain_name: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
}

impl MessageRecord {
    /// Field names, in record order.
    pub const FIELDS: &'static [&'static str] = &[
        "chat_index",
        "message_index",
        "user_name",
        "role_name",
        "role_type",
        "role_prompt",
        "input_query",
        "role_content",
        "step_content",
        "parsed_output",
        "parsed_output_list",
        "customed_kargs",
        "db_docs",
        "code_docs",
        "search_docs",
        "phase_name",
        "chain_name",
        "start_datetime",
        "end_datetime",
    ];
}

impl Default for MessageRecord {
    fn default() -> Self {
        MessageRecord::from(&Message::default())
    }
}

impl From<&Message> for MessageRecord {
    fn from(message: &Message) -> Self {
        Self {
            chat_index: message.chat_index.clone(),
            message_index: message.message_index.clone(),
            user_name: message.user_name.clone(),
            role_name: message.role_name.clone(),
            role_type: message.role_type.clone(),
            role_prompt: message.role_prompt.clone(),
            input_query: message.input_query.clone(),
            role_content: message.role_content.clone(),
            step_content: message.step_content.clone(),
            parsed_output: message.parsed_output.clone(),
            parsed_output_list: message.parsed_output_list.clone(),
            customed_kargs: message.customed_kargs.clone(),
            db_docs: message.db_docs.clone(),
            code_docs: message.code_docs.clone(),
            search_docs: message.search_docs.clone(),
            phase_name: message.phase_name.clone(),
            chain_name: message.chain_name.clone(),
            start_datetime: message.start_datetime,
            end_datetime: message.end_datetime,
        }
    }
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Message {
            chat_index: record.chat_index,
            message_index: record.message_index,
            user_name: record.user_name,
            role_name: record.role_name,
            role_type: record.role_type,
            role_prompt: record.role_prompt,
            input_query: record.input_query,
            role_content: record.role_content,
            step_content: record.step_content,
            parsed_output: record.parsed_output,
            parsed_output_list: record.parsed_output_list,
            customed_kargs: record.customed_kargs,
            db_docs: record.db_docs,
            code_docs: record.code_docs,
            search_docs: record.search_docs,
            phase_name: record.phase_name,
            chain_name: record.chain_name,
            start_datetime: record.start_datetime,
            end_datetime: record.end_datetime,
            ..Message::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MessageRecord;
    use parley_protocol::{Message, RoleType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn record_drops_transient_fields() {
        let mut message = Message::new("c1", "coder", RoleType::Assistant)
            .with_role_content("done")
            .with_parsed_output(json!({"Action Status": "finished"}).as_object().cloned().unwrap());
        message.keyword = vec!["done".to_string()];
        message.figures.insert("plot".to_string(), "aGVsbG8=".to_string());
        message.tools.push(json!({"name": "search"}));

        let value = serde_json::to_value(MessageRecord::from(&message)).expect("serialize");
        let object = value.as_object().expect("object");
        assert!(!object.contains_key("keyword"));
        assert!(!object.contains_key("figures"));
        assert!(!object.contains_key("tools"));
        assert_eq!(object.len(), MessageRecord::FIELDS.len());
        for field in MessageRecord::FIELDS {
            assert!(object.contains_key(*field), "missing {field}");
        }

        let restored = Message::from(MessageRecord::from(&message));
        assert_eq!(restored.role_content, "done");
        assert_eq!(restored.parsed_output_list, message.parsed_output_list);
        assert!(restored.keyword.is_empty());
        assert!(restored.figures.is_empty());
        assert!(restored.tools.is_empty());
    }
}
