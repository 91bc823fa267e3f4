//! Index layout for messages stored in a remote search engine.

use crate::naming::key_component;
use parley_protocol::{FieldKind, SchemaField};

/// Vector width used when none is configured.
pub const DEFAULT_VECTOR_DIM: usize = 768;

/// Field holding the embedding.
pub const VECTOR_FIELD: &str = "vector";

/// Field holding `|`-separated keywords.
pub const KEYWORD_FIELD: &str = "keyword";

/// Separator of the keyword tag field.
pub const KEYWORD_SEPARATOR: char = '|';

/// Score field produced by KNN queries.
pub const DISTANCE_FIELD: &str = "distance";

const TEXT_FIELDS: &[&str] = &[
    "chat_index",
    "message_index",
    "user_name",
    "role_name",
    "role_type",
    "input_query",
    "role_content",
    "parsed_output",
    "customed_kargs",
    "db_docs",
    "code_docs",
    "search_docs",
];

const NUMERIC_FIELDS: &[&str] = &["start_datetime", "end_datetime"];

/// Schema of the message index.
pub fn message_schema(dimensions: usize) -> Vec<SchemaField> {
    let mut schema: Vec<SchemaField> = TEXT_FIELDS
        .iter()
        .map(|name| SchemaField::new(*name, FieldKind::Text))
        .collect();
    schema.extend(
        NUMERIC_FIELDS
            .iter()
            .map(|name| SchemaField::new(*name, FieldKind::Numeric)),
    );
    schema.push(SchemaField::new(
        VECTOR_FIELD,
        FieldKind::Vector { dim: dimensions },
    ));
    schema.push(SchemaField::new(
        KEYWORD_FIELD,
        FieldKind::Tag {
            separator: KEYWORD_SEPARATOR,
        },
    ));
    schema
}

/// Index name for a namespace: `<prefix>:<unique_name>:<memory_type>`.
pub fn index_name(prefix: &str, unique_name: &str, memory_type: &str) -> String {
    [prefix, unique_name, memory_type]
        .iter()
        .map(|part| key_component(part))
        .collect::<Vec<_>>()
        .join(":")
}

/// Key of one stored message.
pub fn document_key(index: &str, chat_index: &str, message_index: &str) -> String {
    format!(
        "{index}:{}:{}",
        key_component(chat_index),
        key_component(message_index)
    )
}

#[cfg(test)]
mod tests {
    use super::{document_key, index_name, message_schema};
    use parley_protocol::FieldKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn schema_covers_vector_and_keyword_fields() {
        let schema = message_schema(4);
        assert_eq!(schema.len(), 16);
        assert!(
            schema
                .iter()
                .any(|field| field.name == "vector" && field.kind == FieldKind::Vector { dim: 4 })
        );
        assert!(schema.iter().any(|field| field.name == "end_datetime"
            && field.kind == FieldKind::Numeric));
    }

    #[test]
    fn keys_are_scoped_to_namespace() {
        let index = index_name("parley_message", "planner agent", "recall");
        assert_eq!(index, "parley_message:planner%20agent:recall");
        assert_ne!(index, index_name("parley_message", "planner_agent", "recall"));
        assert_eq!(
            document_key(&index, "chat:1", "m-1"),
            "parley_message:planner%20agent:recall:chat%3A1:m-1"
        );
    }
}
