//! Conversion between messages and search-engine hashes.
//!
//! Structured fields travel as JSON text, timestamps as epoch milliseconds, the
//! embedding as little-endian float32 bytes and keywords as a `|`-joined tag list.
//! Decoding is lenient: values that fail to parse are kept in raw form.

use super::schema::{KEYWORD_FIELD, KEYWORD_SEPARATOR, VECTOR_FIELD};
use crate::error::MemoryError;
use crate::record::MessageRecord;
use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use parley_protocol::{HashDocument, HashValue, Message, RoleType, vector_from_bytes, vector_to_bytes};
use serde_json::{Map, Value};

/// Encode the persisted fields of a message plus its keywords and embedding.
pub fn encode_message(
    key: impl Into<String>,
    message: &Message,
    keywords: &[String],
    vector: &[f32],
) -> Result<HashDocument, MemoryError> {
    let mut document = HashDocument::new(key);
    if let Value::Object(fields) = serde_json::to_value(MessageRecord::from(message))? {
        for (field, value) in fields {
            let value = match field.as_str() {
                "start_datetime" => datetime_value(message.start_datetime),
                "end_datetime" => datetime_value(message.end_datetime),
                _ => match value {
                    Value::String(text) => HashValue::Text(text),
                    other => HashValue::Text(other.to_string()),
                },
            };
            document.insert(field, value);
        }
    }
    document.insert(VECTOR_FIELD, HashValue::Bytes(vector_to_bytes(vector)));
    document.insert(
        KEYWORD_FIELD,
        HashValue::Text(keywords.join(KEYWORD_SEPARATOR.to_string().as_str())),
    );
    Ok(document)
}

/// Rebuild a message from a stored hash.
pub fn decode_document(document: &HashDocument) -> Message {
    let defaults = Message::default();
    let role_type = text(document, "role_type");
    Message {
        chat_index: text(document, "chat_index"),
        message_index: text(document, "message_index"),
        user_name: text(document, "user_name"),
        role_name: text(document, "role_name"),
        role_type: if role_type.is_empty() {
            defaults.role_type.clone()
        } else {
            RoleType::from(role_type)
        },
        role_prompt: text(document, "role_prompt"),
        input_query: text(document, "input_query"),
        role_content: text(document, "role_content"),
        step_content: text(document, "step_content"),
        parsed_output: decode_map(document, "parsed_output"),
        parsed_output_list: decode_map_list(document, "parsed_output_list"),
        customed_kargs: decode_map(document, "customed_kargs"),
        db_docs: decode_list(document, "db_docs"),
        code_docs: decode_list(document, "code_docs"),
        search_docs: decode_list(document, "search_docs"),
        phase_name: text(document, "phase_name"),
        chain_name: text(document, "chain_name"),
        start_datetime: decode_datetime(document, "start_datetime")
            .unwrap_or(defaults.start_datetime),
        end_datetime: decode_datetime(document, "end_datetime").unwrap_or(defaults.end_datetime),
        keyword: document_keywords(document),
        ..defaults
    }
}

/// Stored embedding, if present and well formed.
pub fn document_vector(document: &HashDocument) -> Option<Vec<f32>> {
    document
        .get(VECTOR_FIELD)
        .and_then(HashValue::as_bytes)
        .and_then(vector_from_bytes)
}

/// Stored keyword tags.
pub fn document_keywords(document: &HashDocument) -> Vec<String> {
    text(document, KEYWORD_FIELD)
        .split(KEYWORD_SEPARATOR)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

/// Epoch milliseconds.
pub fn datetime_millis(datetime: DateTime<Utc>) -> i64 {
    datetime.timestamp_millis()
}

fn datetime_value(datetime: DateTime<Utc>) -> HashValue {
    HashValue::Number(datetime_millis(datetime) as f64)
}

fn text(document: &HashDocument, field: &str) -> String {
    match document.get(field) {
        Some(HashValue::Text(value)) => value.clone(),
        Some(HashValue::Number(value)) => value.to_string(),
        _ => String::new(),
    }
}

fn decode_datetime(document: &HashDocument, field: &str) -> Option<DateTime<Utc>> {
    let millis = document.get(field)?.as_number()?;
    Utc.timestamp_millis_opt(millis as i64).single()
}

fn decode_map(document: &HashDocument, field: &str) -> Map<String, Value> {
    let raw = text(document, field);
    if raw.is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            warn!("kept undecodable field as raw text (field={field}, id={})", document.id);
            raw_entry(raw)
        }
    }
}

fn decode_map_list(document: &HashDocument, field: &str) -> Vec<Map<String, Value>> {
    let raw = text(document, field);
    if raw.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => map,
                other => raw_entry(other),
            })
            .collect(),
        _ => {
            warn!("kept undecodable field as raw text (field={field}, id={})", document.id);
            vec![raw_entry(raw)]
        }
    }
}

fn decode_list(document: &HashDocument, field: &str) -> Vec<Value> {
    let raw = text(document, field);
    if raw.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(items)) => items,
        Ok(other) => vec![other],
        Err(_) => {
            warn!("kept undecodable field as raw text (field={field}, id={})", document.id);
            vec![Value::String(raw)]
        }
    }
}

fn raw_entry(value: impl Into<Value>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("raw".to_string(), value.into());
    map
}

#[cfg(test)]
mod tests {
    use super::{decode_document, document_keywords, document_vector, encode_message};
    use chrono::{TimeZone, Utc};
    use parley_protocol::{HashValue, Message, RoleType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn encodes_timestamps_as_millis_and_structures_as_json() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let message = Message::new("c", "coder", RoleType::Assistant)
            .with_role_content("{\"not\": \"decoded\"}")
            .with_parsed_output(json!({"code": 1}).as_object().cloned().unwrap())
            .at(at);
        let keywords = vec!["code".to_string(), "m1".to_string()];
        let document =
            encode_message("idx:c:m1", &message, &keywords, &[0.5, 1.0]).expect("encode");

        assert_eq!(
            document.get("end_datetime"),
            Some(&HashValue::Number(at.timestamp_millis() as f64))
        );
        assert_eq!(
            document.get("parsed_output_list"),
            Some(&HashValue::Text("[{\"code\":1}]".to_string()))
        );
        assert_eq!(document_keywords(&document), keywords);
        assert_eq!(document_vector(&document), Some(vec![0.5, 1.0]));
        assert!(document.get("figures").is_none());

        let decoded = decode_document(&document);
        assert_eq!(decoded.role_content, "{\"not\": \"decoded\"}");
        assert_eq!(decoded.parsed_output_list, message.parsed_output_list);
        assert_eq!(decoded.end_datetime, at);
        assert_eq!(decoded.role_type, RoleType::Assistant);
    }

    #[test]
    fn undecodable_structures_are_kept_raw() {
        let mut document = parley_protocol::HashDocument::new("k");
        document.insert("customed_kargs", HashValue::Text("not json".to_string()));
        document.insert("parsed_output_list", HashValue::Text("{".to_string()));
        document.insert("db_docs", HashValue::Text("plain".to_string()));

        let message = decode_document(&document);
        assert_eq!(message.customed_kargs.get("raw"), Some(&json!("not json")));
        assert_eq!(message.parsed_output_list[0].get("raw"), Some(&json!("{")));
        assert_eq!(message.db_docs, vec![json!("plain")]);
    }
}
