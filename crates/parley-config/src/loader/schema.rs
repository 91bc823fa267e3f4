//! Schema validation helpers for Parley JSON5 configuration.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    let allowed = [
        "$schema",
        "backend",
        "namespace",
        "file",
        "search",
        "embedding",
        "retrieval",
        "summary",
    ];
    ensure_allowed_keys(map, &allowed, layer, "")?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("backend") {
        validate_backend(value, layer, "backend")?;
    }
    if let Some(value) = map.get("namespace") {
        validate_namespace(value, layer, "namespace")?;
    }
    if let Some(value) = map.get("file") {
        validate_file(value, layer, "file")?;
    }
    if let Some(value) = map.get("search") {
        validate_search(value, layer, "search")?;
    }
    if let Some(value) = map.get("embedding") {
        validate_embedding(value, layer, "embedding")?;
    }
    if let Some(value) = map.get("retrieval") {
        validate_retrieval(value, layer, "retrieval")?;
    }
    if let Some(value) = map.get("summary") {
        validate_summary(value, layer, "summary")?;
    }

    Ok(())
}

/// Validate the backend selector.
fn validate_backend(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    match value.as_str() {
        Some("file" | "search") => Ok(()),
        Some(_) => Err(invalid_field(layer, path, "expected \"file\" or \"search\"")),
        None => Err(invalid_field(layer, path, "expected string")),
    }
}

/// Validate the "namespace" block.
fn validate_namespace(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["unique_name", "memory_type"], layer, path)?;

    if let Some(value) = map.get("unique_name") {
        expect_string(value, layer, &join_path(path, "unique_name"))?;
    }
    if let Some(value) = map.get("memory_type") {
        expect_string(value, layer, &join_path(path, "memory_type"))?;
    }
    Ok(())
}

/// Validate the "file" backend block.
fn validate_file(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["root"], layer, path)?;

    if let Some(value) = map.get("root") {
        expect_optional_string(value, layer, &join_path(path, "root"))?;
    }
    Ok(())
}

/// Validate the "search" backend block.
fn validate_search(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["index_prefix", "max_results"], layer, path)?;

    if let Some(value) = map.get("index_prefix") {
        expect_string(value, layer, &join_path(path, "index_prefix"))?;
    }
    if let Some(value) = map.get("max_results") {
        expect_u64(value, layer, &join_path(path, "max_results"))?;
    }
    Ok(())
}

/// Validate the "embedding" block.
fn validate_embedding(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["enabled", "dimensions"], layer, path)?;

    if let Some(value) = map.get("enabled") {
        expect_bool(value, layer, &join_path(path, "enabled"))?;
    }
    if let Some(value) = map.get("dimensions") {
        expect_u64(value, layer, &join_path(path, "dimensions"))?;
    }
    Ok(())
}

/// Validate the "retrieval" block.
fn validate_retrieval(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "top_k",
            "text_score_threshold",
            "embedding_score_threshold",
            "tag_top_k",
            "window_minutes",
        ],
        layer,
        path,
    )?;

    for key in ["top_k", "tag_top_k", "window_minutes"] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    for key in ["text_score_threshold", "embedding_score_threshold"] {
        if let Some(value) = map.get(key) {
            expect_f64(value, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

/// Validate the "summary" block.
fn validate_summary(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["enabled", "split_n", "max_messages", "prompt_template"],
        layer,
        path,
    )?;

    if let Some(value) = map.get("enabled") {
        expect_bool(value, layer, &join_path(path, "enabled"))?;
    }
    if let Some(value) = map.get("split_n") {
        expect_u64(value, layer, &join_path(path, "split_n"))?;
    }
    if let Some(value) = map.get("max_messages") {
        expect_u64(value, layer, &join_path(path, "max_messages"))?;
    }
    if let Some(value) = map.get("prompt_template") {
        expect_optional_string(value, layer, &join_path(path, "prompt_template"))?;
    }
    Ok(())
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

/// Expect a JSON string or return a typed error.
fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.as_str().is_some() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

/// Expect a JSON string or null.
fn expect_optional_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_null() {
        return Ok(());
    }
    expect_string(value, layer, path)
}

/// Expect a JSON boolean or return a typed error.
fn expect_bool(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if matches!(value, Value::Bool(_)) {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected bool"))
    }
}

/// Expect a non-negative JSON integer or return a typed error.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

/// Expect a JSON number or return a typed error.
fn expect_f64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_number() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected number"))
    }
}

/// Reject keys that are not part of the schema.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid_field(layer, &join_path(path, key), "unknown key"));
        }
    }
    Ok(())
}

/// Join nested paths for better error messages.
fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error.
pub(super) fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}
