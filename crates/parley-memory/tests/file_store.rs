//! File backend tests for persistence, views, dedup and retrieval.

use chrono::Duration;
use parley_config::RetrievalConfig;
use parley_memory::{
    DatetimeField, FileMemoryStore, MemoryError, MemoryStore, RetrievalParams, RetrievalRouter,
    TermFrequencyExtractor, ToolTrace,
};
use parley_protocol::{KeywordExtractor, Message, PartitionKey, RoleType};
use parley_test_utils::{
    FixedEmbedder, HashEmbedder, agent_turn, at, init_logging, summary_turn, user_turn,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

fn extractor() -> Arc<dyn KeywordExtractor> {
    Arc::new(TermFrequencyExtractor::new().expect("extractor"))
}

fn store() -> (TempDir, FileMemoryStore) {
    init_logging();
    let temp = tempdir().expect("tempdir");
    let store = FileMemoryStore::new(temp.path(), extractor()).expect("store");
    (temp, store)
}

fn key() -> PartitionKey {
    PartitionKey::new("chat-1", "planner", "recall")
}

fn contents(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.role_content.as_str()).collect()
}

/// An equivalent message appended twice is stored once.
#[tokio::test]
async fn duplicate_append_is_ignored() {
    let (_temp, store) = store();
    let key = key();
    let first = user_turn("chat-1", "hello there", at(10, 0));
    let second = agent_turn("chat-1", "coder", "working on it", at(10, 1));
    let third = agent_turn("chat-1", "coder", "done", at(10, 2));

    assert!(store.append(&key, first).await.expect("append"));
    assert!(store.append(&key, second.clone()).await.expect("append"));
    assert!(store.append(&key, third).await.expect("append"));
    assert!(!store.append(&key, second).await.expect("append duplicate"));

    assert_eq!(store.partition(&key).await.expect("partition").len(), 3);
    assert_eq!(store.load(&key).await.expect("load").len(), 3);
}

#[tokio::test]
async fn extend_counts_only_new_messages() {
    let (_temp, store) = store();
    let key = key();
    let greeting = user_turn("chat-1", "hello there", at(10, 0));
    store.append(&key, greeting.clone()).await.expect("append");

    let batch = vec![
        greeting,
        agent_turn("chat-1", "coder", "working on it", at(10, 1)),
        summary_turn("chat-1", "user asked for help", at(10, 2)),
    ];
    let appended = store.extend(&key, batch.into()).await.expect("extend");

    assert_eq!(appended, 2);
    let views = store.views(&key).await.expect("views");
    assert_eq!(views.recall().len(), 3);
    assert_eq!(views.summary().len(), 1);
}

/// Saved partitions load back with the allow-listed fields intact.
#[tokio::test]
async fn save_and_load_round_trip() {
    let temp = tempdir().expect("tempdir");
    let key = key();
    let mut message = user_turn("chat-1", "plan the release", at(9, 30));
    message.keyword = vec!["dropped".to_string()];
    message
        .figures
        .insert("chart".to_string(), "base64".to_string());
    {
        let store = FileMemoryStore::new(temp.path(), extractor()).expect("store");
        store.append(&key, message.clone()).await.expect("append");
        store.save(&key).await.expect("save");
    }

    let reopened = FileMemoryStore::new(temp.path(), extractor()).expect("store");
    let loaded = reopened.load(&key).await.expect("load");
    assert_eq!(loaded.len(), 1);
    let restored = &loaded.messages()[0];
    assert_eq!(restored.message_index, message.message_index);
    assert_eq!(restored.input_query, "plan the release");
    assert_eq!(restored.end_datetime, message.end_datetime);
    assert!(restored.keyword.is_empty());
    assert!(restored.figures.is_empty());
}

/// A partition without a file loads as empty.
#[tokio::test]
async fn missing_partition_loads_empty() {
    let (_temp, store) = store();
    let loaded = store
        .load(&PartitionKey::new("unknown", "planner", "recall"))
        .await
        .expect("load");
    assert!(loaded.is_empty());
}

/// A corrupt line surfaces as a malformed record with its line number.
#[tokio::test]
async fn corrupt_line_is_reported() {
    let (_temp, store) = store();
    let key = key();
    let path = store.partition_path(&key);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
    std::fs::write(&path, "{}\nnot json\n").expect("write");

    let err = store.reload(&key).await.unwrap_err();
    match err {
        MemoryError::MalformedRecord { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error: {other}"),
    }
}

/// Summaries land in `summary`; everything else in `current`.
#[tokio::test]
async fn views_split_on_summary_role() {
    let (_temp, store) = store();
    let key = key();
    store
        .append(&key, user_turn("chat-1", "first", at(10, 0)))
        .await
        .expect("append");
    store
        .append(&key, summary_turn("chat-1", "so far", at(10, 1)))
        .await
        .expect("append");
    store
        .append(&key, agent_turn("chat-1", "coder", "next", at(10, 2)))
        .await
        .expect("append");

    let views = store.views(&key).await.expect("views");
    assert_eq!(views.recall().len(), 3);
    assert_eq!(contents(views.current().messages()), vec!["first", "next"]);
    assert_eq!(contents(views.summary().messages()), vec!["so far"]);
}

/// Clear wipes memory and the durable file.
#[tokio::test]
async fn clear_removes_partition() {
    let (_temp, store) = store();
    let key = key();
    store
        .append(&key, user_turn("chat-1", "hello", at(10, 0)))
        .await
        .expect("append");
    assert!(store.partition_path(&key).exists());

    store.clear(&key).await.expect("clear");
    assert!(store.partition(&key).await.expect("partition").is_empty());
    assert!(!store.partition_path(&key).exists());
    assert!(store.reload(&key).await.expect("reload").is_empty());
}

/// Text retrieval applies the similarity threshold inclusively.
#[tokio::test]
async fn text_threshold_filters_partial_overlap() {
    let (_temp, store) = store();
    let key = key();
    store
        .append(
            &key,
            agent_turn("chat-1", "coder", "alpha gamma delta", at(10, 0)),
        )
        .await
        .expect("append");

    let strict = store
        .route(
            &key,
            "text",
            RetrievalParams::new()
                .with_text("alpha beta")
                .with_score_threshold(0.3),
        )
        .await
        .expect("route");
    assert!(strict.is_empty());

    let lenient = store
        .route(
            &key,
            "text",
            RetrievalParams::new()
                .with_text("alpha beta")
                .with_score_threshold(0.2),
        )
        .await
        .expect("route");
    assert_eq!(contents(&lenient), vec!["alpha gamma delta"]);
}

/// Text retrieval returns the closest match first.
#[tokio::test]
async fn text_results_are_highest_first() {
    let (_temp, store) = store();
    let key = key();
    for (minute, text) in [
        (0, "database cache"),
        (1, "database index performance"),
        (2, "database index tuning"),
    ] {
        store
            .append(&key, agent_turn("chat-1", "coder", text, at(10, minute)))
            .await
            .expect("append");
    }

    let hits = store
        .route(
            &key,
            "text",
            RetrievalParams::new()
                .with_text("database index performance")
                .with_score_threshold(0.1),
        )
        .await
        .expect("route");
    assert_eq!(
        contents(&hits),
        vec![
            "database index performance",
            "database index tuning",
            "database cache"
        ]
    );
}

/// The datetime window is inclusive and centered on the query instant.
#[tokio::test]
async fn datetime_window_bounds() {
    let (_temp, store) = store();
    let key = key();
    store
        .append(&key, agent_turn("chat-1", "coder", "inside", at(10, 4)))
        .await
        .expect("append");
    store
        .append(&key, agent_turn("chat-1", "coder", "outside", at(10, 6)))
        .await
        .expect("append");
    store
        .append(&key, agent_turn("chat-1", "coder", "edge", at(9, 55)))
        .await
        .expect("append");

    let hits = store
        .route(
            &key,
            "datetime",
            RetrievalParams::new()
                .with_datetime("2024-01-01 10:00:00")
                .with_window_minutes(5),
        )
        .await
        .expect("route");
    assert_eq!(contents(&hits), vec!["inside", "edge"]);
}

#[tokio::test]
async fn oversized_datetime_window_returns_everything() {
    let (_temp, store) = store();
    let key = key();
    store
        .append(&key, agent_turn("chat-1", "coder", "early", at(1, 0)))
        .await
        .expect("append");
    store
        .append(&key, agent_turn("chat-1", "coder", "late", at(23, 0)))
        .await
        .expect("append");

    for minutes in [1_000_000_000_000, i64::MIN] {
        let hits = store
            .route(
                &key,
                "datetime",
                RetrievalParams::new()
                    .with_datetime("2024-01-01 10:00:00")
                    .with_window_minutes(minutes),
            )
            .await
            .expect("route");
        assert_eq!(contents(&hits), vec!["early", "late"]);
    }
}

/// Keys that only differ in characters unsafe for paths keep separate files.
#[tokio::test]
async fn lookalike_partitions_stay_separate() {
    let (temp, store) = store();
    let slash = PartitionKey::new("team/a", "planner", "recall");
    let space = PartitionKey::new("team a", "planner", "recall");
    store
        .append(&slash, user_turn("team/a", "from slash", at(10, 0)))
        .await
        .expect("append");
    store
        .append(&space, user_turn("team a", "from space", at(10, 0)))
        .await
        .expect("append");

    let fresh = FileMemoryStore::new(temp.path(), extractor()).expect("store");
    let underscore = PartitionKey::new("team_a", "planner", "recall");
    assert!(fresh.partition(&underscore).await.expect("partition").is_empty());
    assert_eq!(
        contents(fresh.partition(&slash).await.expect("partition").messages()),
        vec!["from slash"]
    );
    assert_eq!(
        contents(fresh.partition(&space).await.expect("partition").messages()),
        vec!["from space"]
    );
}

/// Datetime retrieval can filter on start time.
#[tokio::test]
async fn datetime_window_on_start_field() {
    let (_temp, store) = store();
    let key = key();
    let mut message = agent_turn("chat-1", "coder", "long step", at(11, 0));
    message.start_datetime = at(10, 0);
    store.append(&key, message).await.expect("append");

    let by_end = store
        .route(
            &key,
            "datetime",
            RetrievalParams::new().with_datetime("2024-01-01T10:01:00Z"),
        )
        .await
        .expect("route");
    assert!(by_end.is_empty());

    let by_start = store
        .route(
            &key,
            "datetime",
            RetrievalParams::new()
                .with_datetime("2024-01-01T10:01:00Z")
                .with_datetime_field(DatetimeField::Start),
        )
        .await
        .expect("route");
    assert_eq!(contents(&by_start), vec!["long step"]);
}

/// Unknown retrieval types fail with the valid list.
#[tokio::test]
async fn unknown_retrieval_type_is_rejected() {
    let (_temp, store) = store();
    let err = store
        .route(&key(), "fulltext", RetrievalParams::new().with_text("x"))
        .await
        .unwrap_err();
    match err {
        MemoryError::UnsupportedRetrievalType { requested, valid } => {
            assert_eq!(requested, "fulltext");
            assert_eq!(valid, "embedding, text, datetime");
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Missing query inputs return an empty result instead of an error.
#[tokio::test]
async fn empty_params_yield_nothing() {
    let (_temp, store) = store();
    let key = key();
    store
        .append(&key, user_turn("chat-1", "hello", at(10, 0)))
        .await
        .expect("append");
    for kind in ["text", "datetime", "embedding"] {
        let hits = store
            .route(&key, kind, RetrievalParams::new())
            .await
            .expect("route");
        assert!(hits.is_empty(), "{kind} returned results");
    }
}

/// Embedding retrieval without an embedder reports the degraded mode.
#[tokio::test]
async fn embedding_without_embedder_is_unavailable() {
    let (_temp, store) = store();
    assert!(!store.vector_search_available());
    let err = store
        .route(&key(), "embedding", RetrievalParams::new().with_text("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::VectorSearchUnavailable(_)));
}

/// Embedding retrieval ranks by cosine similarity and honours the threshold.
#[tokio::test]
async fn embedding_retrieval_ranks_by_similarity() {
    init_logging();
    let temp = tempdir().expect("tempdir");
    let embedder = FixedEmbedder::new(vec![0.0, 0.0, 1.0])
        .with_vector("rust borrow checker", vec![1.0, 0.0, 0.0])
        .with_vector("rust lifetimes", vec![0.8, 0.6, 0.0])
        .with_vector("cooking pasta", vec![0.0, 1.0, 0.0])
        .with_vector("ownership in rust", vec![1.0, 0.0, 0.0]);
    let store = FileMemoryStore::new(temp.path(), extractor())
        .expect("store")
        .with_embedder(Arc::new(embedder), 3);
    let key = key();
    for (minute, text) in ["cooking pasta", "rust lifetimes", "rust borrow checker"]
        .into_iter()
        .enumerate()
    {
        store
            .append(&key, agent_turn("chat-1", "coder", text, at(10, minute as u32)))
            .await
            .expect("append");
    }
    assert_eq!(store.indexed_len(&key), 3);

    let hits = store
        .route(
            &key,
            "embedding",
            RetrievalParams::new()
                .with_text("ownership in rust")
                .with_score_threshold(0.5),
        )
        .await
        .expect("route");
    assert_eq!(contents(&hits), vec!["rust borrow checker", "rust lifetimes"]);
}

/// Reload rebuilds the vector index from disk.
#[tokio::test]
async fn reload_rebuilds_vector_index() {
    init_logging();
    let temp = tempdir().expect("tempdir");
    let key = key();
    {
        let store = FileMemoryStore::new(temp.path(), extractor()).expect("store");
        store
            .append(&key, user_turn("chat-1", "vector search", at(10, 0)))
            .await
            .expect("append");
        store
            .append(&key, Message::new("chat-1", "coder", RoleType::Assistant).at(at(10, 1)))
            .await
            .expect("append");
    }
    let store = FileMemoryStore::new(temp.path(), extractor())
        .expect("store")
        .with_embedder(Arc::new(HashEmbedder::new(16)), 16);
    let recall = store.reload(&key).await.expect("reload");
    assert_eq!(recall.len(), 2);
    assert_eq!(store.indexed_len(&key), 1);
}

/// Tool traces append four ordered messages.
#[tokio::test]
async fn tool_trace_appends_four_messages() {
    let (_temp, store) = store();
    let key = key();
    let trace = ToolTrace {
        tool_key: "search".to_string(),
        tool_def: "{\"name\":\"search\"}".to_string(),
        tool_param: "{\"q\":\"rust\"}".to_string(),
        tool_response: "3 results".to_string(),
        tool_summary: "found three results".to_string(),
        ..ToolTrace::new("node1", "alice")
    };
    let appended = store.append_tool_trace(&key, &trace).await.expect("trace");
    assert_eq!(appended, 4);

    let recall = store.partition(&key).await.expect("partition");
    let roles: Vec<_> = recall.iter().map(|m| m.role_name.as_str()).collect();
    assert_eq!(
        roles,
        vec![
            "tool_selector",
            "tool_filler",
            "function_caller",
            "function_summary"
        ]
    );
    assert_eq!(recall.messages()[2].role_type, RoleType::Observation);
}

/// Retrieval defaults come from the configured retrieval block.
#[tokio::test]
async fn retrieval_defaults_apply() {
    init_logging();
    let temp = tempdir().expect("tempdir");
    let store = FileMemoryStore::new(temp.path(), extractor())
        .expect("store")
        .with_retrieval(RetrievalConfig {
            top_k: 1,
            text_score_threshold: 0.0,
            ..RetrievalConfig::default()
        });
    let key = key();
    for minute in 0..3 {
        store
            .append(
                &key,
                agent_turn("chat-1", "coder", "shared topic", at(10, 0) + Duration::minutes(minute)),
            )
            .await
            .expect("append");
    }
    let hits = store
        .route(&key, "text", RetrievalParams::new().with_text("shared topic"))
        .await
        .expect("route");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].end_datetime, at(10, 0));
}
