//! Tests for configuration loading.

use super::*;
use crate::BackendKind;
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;

/// Write JSON5 contents to a path, creating parent directories if needed.
fn write_json5(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

/// Verify that a minimal config parses with defaults.
#[test]
fn parse_minimal_config() {
    let config = MemoryConfig::load_from_str("{}").expect("config");
    assert_eq!(config.backend, BackendKind::File);
    assert_eq!(config.namespace.unique_name, "default");
    assert_eq!(config.namespace.memory_type, "recall");
    assert_eq!(config.search.index_prefix, "parley_message");
    assert_eq!(config.search.max_results, 1000);
    assert_eq!(config.embedding.dimensions, 768);
    assert!(!config.embedding.enabled);
    assert_eq!(config.retrieval.top_k, 5);
    assert_eq!(config.retrieval.text_score_threshold, 0.3);
    assert_eq!(config.retrieval.tag_limit(), Some(5));
    assert_eq!(config.retrieval.window_minutes, 5);
    assert_eq!(config.summary.split_n, 20);
    assert_eq!(config.summary.max_messages, 40);
}

/// Parse a full config with comments and trailing commas.
#[test]
fn parse_full_config() {
    let json5 = r#"{
        // remote store
        backend: "search",
        namespace: { unique_name: "planner", memory_type: "recall" },
        search: { index_prefix: "team", max_results: 50 },
        embedding: { enabled: true, dimensions: 8 },
        retrieval: { top_k: 3, tag_top_k: 0, text_score_threshold: 0.2 },
        summary: { enabled: true, split_n: 4, prompt_template: "Sum: {conversation}" },
    }"#;
    let config = MemoryConfig::load_from_str(json5).expect("config");
    assert_eq!(config.backend, BackendKind::Search);
    assert_eq!(config.search.max_results, 50);
    assert_eq!(config.retrieval.tag_limit(), None);
    assert_eq!(config.summary.split_n, 4);

    let key = config.partition_key("chat-1");
    assert_eq!(key.to_string(), "chat-1/planner/recall");
}

/// Reject unexpected top-level config keys.
#[test]
fn rejects_unknown_top_level_key() {
    let err = MemoryConfig::load_from_str(r#"{ unexpected: true }"#).unwrap_err();
    assert!(format!("{err}").contains("unknown key"));
}

/// Reject unexpected nested keys with their full path.
#[test]
fn rejects_unknown_nested_key() {
    let err = MemoryConfig::load_from_str(r#"{ retrieval: { top_n: 3 } }"#).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("retrieval.top_n"));
    assert!(msg.contains("unknown key"));
}

/// Reject backends other than file and search.
#[test]
fn rejects_unknown_backend() {
    let err = MemoryConfig::load_from_str(r#"{ backend: "sqlite" }"#).unwrap_err();
    assert!(format!("{err}").contains("backend"));
}

/// Reject thresholds outside the unit interval.
#[test]
fn rejects_out_of_range_threshold() {
    let err = MemoryConfig::load_from_str(r#"{ retrieval: { text_score_threshold: 1.5 } }"#)
        .unwrap_err();
    assert!(format!("{err}").contains("retrieval.text_score_threshold"));
}

/// Accept a negative embedding threshold down to -1.
#[test]
fn accepts_negative_embedding_threshold() {
    let config =
        MemoryConfig::load_from_str(r#"{ retrieval: { embedding_score_threshold: -0.5 } }"#)
            .expect("config");
    assert_eq!(config.retrieval.embedding_score_threshold, -0.5);
}

/// Reject a zero split point.
#[test]
fn rejects_zero_split_n() {
    let err = MemoryConfig::load_from_str(r#"{ summary: { split_n: 0 } }"#).unwrap_err();
    assert!(format!("{err}").contains("summary.split_n"));
}

/// Reject prompt templates without the conversation placeholder.
#[test]
fn rejects_template_without_placeholder() {
    let err = MemoryConfig::load_from_str(r#"{ summary: { prompt_template: "Summarize." } }"#)
        .unwrap_err();
    assert!(format!("{err}").contains("summary.prompt_template"));
}

/// Reject empty namespace names.
#[test]
fn rejects_empty_namespace() {
    let err = MemoryConfig::load_from_str(r#"{ namespace: { unique_name: "" } }"#).unwrap_err();
    assert!(format!("{err}").contains("namespace.unique_name"));
}

/// Later layers override earlier ones and missing layers are skipped.
#[test]
fn layered_config_prefers_later_layers() {
    let temp = TempDir::new().expect("tmp");
    let base = temp.path().join("base.json5");
    let overlay = temp.path().join("nested").join("overlay.json5");
    let missing = temp.path().join("missing.json5");
    write_json5(
        &base,
        "{ retrieval: { top_k: 7, window_minutes: 10 }, file: { root: \"/tmp/a\" } }",
    );
    write_json5(&overlay, "{ retrieval: { top_k: 2 }, file: { root: null } }");

    let config = MemoryConfig::load_layered(&[base, missing, overlay]).expect("config");
    assert_eq!(config.retrieval.top_k, 2);
    assert_eq!(config.retrieval.window_minutes, 10);
    assert_eq!(config.file.root, None);
}

/// Layer errors name the layer file.
#[test]
fn layered_config_reports_layer_path() {
    let temp = TempDir::new().expect("tmp");
    let bad = temp.path().join("bad.json5");
    write_json5(&bad, "{ summary: { split: 3 } }");
    let err = MemoryConfig::load_layered(&[bad.clone()]).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("bad.json5"));
    assert!(msg.contains("summary.split"));
}

/// Loading from a path reads JSON5 from disk.
#[test]
fn load_from_path_reads_file() {
    let temp = TempDir::new().expect("tmp");
    let path = temp.path().join("parley.json5");
    write_json5(&path, "{ file: { root: \"/data/parley\" } }");
    let config = MemoryConfig::load_from_path(&path).expect("config");
    assert_eq!(
        config.file.resolved_root(),
        std::path::PathBuf::from("/data/parley")
    );
}
