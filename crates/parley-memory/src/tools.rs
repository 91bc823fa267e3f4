//! Tool invocation capture.

use parley_protocol::{Memory, Message, RoleType};
use serde_json::{Map, Value};

/// One tool invocation, from selection to summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolTrace {
    /// Graph node the invocation belongs to; prefixes each message index.
    pub node_id: String,
    pub user_name: String,
    /// Selected tool key.
    pub tool_key: String,
    /// Tool schema definition.
    pub tool_def: String,
    /// Filled-in parameters.
    pub tool_param: String,
    /// Raw tool response.
    pub tool_response: String,
    /// Summary of the response.
    pub tool_summary: String,
}

impl ToolTrace {
    pub fn new(node_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            user_name: user_name.into(),
            ..Self::default()
        }
    }

    /// Expand into selector, filler, caller, and summary messages, in that order.
    pub fn to_memory(&self, chat_index: &str) -> Memory {
        let mut selector_kargs = Map::new();
        selector_kargs.insert("toolDef".to_string(), Value::String(self.tool_def.clone()));

        [
            ("toolKey", "tool_selector", RoleType::Assistant, &self.tool_key, selector_kargs),
            ("toolParam", "tool_filler", RoleType::Assistant, &self.tool_param, Map::new()),
            (
                "toolResponse",
                "function_caller",
                RoleType::Observation,
                &self.tool_response,
                Map::new(),
            ),
            (
                "toolSummary",
                "function_summary",
                RoleType::Assistant,
                &self.tool_summary,
                Map::new(),
            ),
        ]
        .into_iter()
        .map(|(field, role_name, role_type, content, kargs)| {
            Message::new(chat_index, role_name, role_type)
                .with_message_index(format!("{}-{field}", self.node_id))
                .with_user_name(self.user_name.clone())
                .with_role_content(content.clone())
                .with_customed_kargs(kargs)
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::ToolTrace;
    use parley_protocol::RoleType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn trace_expands_to_four_messages() {
        let trace = ToolTrace {
            tool_key: "weather".to_string(),
            tool_def: "{\"name\":\"weather\"}".to_string(),
            tool_param: "{\"city\":\"Paris\"}".to_string(),
            tool_response: "12C".to_string(),
            tool_summary: "It is 12C in Paris".to_string(),
            ..ToolTrace::new("node7", "alice")
        };
        let memory = trace.to_memory("chat-1");
        let messages = memory.messages();
        assert_eq!(messages.len(), 4);

        let indexes: Vec<_> = messages.iter().map(|m| m.message_index.as_str()).collect();
        assert_eq!(
            indexes,
            vec![
                "node7-toolKey",
                "node7-toolParam",
                "node7-toolResponse",
                "node7-toolSummary"
            ]
        );
        let roles: Vec<_> = messages.iter().map(|m| m.role_name.as_str()).collect();
        assert_eq!(
            roles,
            vec![
                "tool_selector",
                "tool_filler",
                "function_caller",
                "function_summary"
            ]
        );
        assert_eq!(messages[2].role_type, RoleType::Observation);
        assert_eq!(
            messages[0].customed_kargs.get("toolDef"),
            Some(&json!("{\"name\":\"weather\"}"))
        );
        assert!(messages[1].customed_kargs.is_empty());
        assert!(messages.iter().all(|m| m.user_name == "alice"));
        assert!(messages.iter().all(|m| m.chat_index == "chat-1"));
        assert!(messages.iter().all(|m| !m.is_summary()));
    }
}
