//! Retrieval request types and dispatch-key parsing.
//!
//! Callers hand the router a loose [`RetrievalParams`]; it is validated and turned
//! into exactly one typed query before any strategy runs.

use crate::error::MemoryError;
use crate::window::parse_datetime;
use chrono::{DateTime, Utc};
use parley_config::RetrievalConfig;
use parley_protocol::Message;
use std::fmt;
use std::str::FromStr;

/// Retrieval strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalType {
    /// Nearest neighbours by embedding similarity.
    Embedding,
    /// Keyword overlap ranking.
    Text,
    /// Time window selection, optionally ranked by keywords.
    Datetime,
}

impl RetrievalType {
    /// Every supported strategy, in dispatch order.
    pub const ALL: [RetrievalType; 3] = [
        RetrievalType::Embedding,
        RetrievalType::Text,
        RetrievalType::Datetime,
    ];

    /// Dispatch key.
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalType::Embedding => "embedding",
            RetrievalType::Text => "text",
            RetrievalType::Datetime => "datetime",
        }
    }

    fn valid_keys() -> String {
        Self::ALL
            .iter()
            .map(RetrievalType::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for RetrievalType {
    type Err = MemoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| MemoryError::UnsupportedRetrievalType {
                requested: value.to_string(),
                valid: Self::valid_keys(),
            })
    }
}

impl fmt::Display for RetrievalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp a datetime query filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatetimeField {
    /// `start_datetime`.
    Start,
    /// `end_datetime`.
    #[default]
    End,
}

impl DatetimeField {
    /// Stored field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatetimeField::Start => "start_datetime",
            DatetimeField::End => "end_datetime",
        }
    }

    /// Read the selected timestamp from a message.
    pub fn of(&self, message: &Message) -> DateTime<Utc> {
        match self {
            DatetimeField::Start => message.start_datetime,
            DatetimeField::End => message.end_datetime,
        }
    }
}

/// Ranking and truncation knobs shared by keyword-based strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Maximum number of messages returned.
    pub top_k: usize,
    /// Minimum similarity a candidate needs to be kept.
    pub score_threshold: f32,
    /// Keywords extracted per text; `None` keeps all of them.
    pub tag_top_k: Option<usize>,
}

impl MatchOptions {
    /// Options taken from retrieval defaults.
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            score_threshold: config.text_score_threshold,
            tag_top_k: config.tag_limit(),
        }
    }
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// Keyword retrieval over a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct TextQuery {
    pub text: String,
    pub options: MatchOptions,
}

/// Nearest-neighbour retrieval over a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingQuery {
    pub text: String,
    pub top_k: usize,
    /// Minimum cosine similarity.
    pub score_threshold: f32,
}

/// Time-window retrieval, optionally ranked by a query text.
#[derive(Debug, Clone, PartialEq)]
pub struct DatetimeQuery {
    pub datetime: DateTime<Utc>,
    pub window_minutes: i64,
    pub field: DatetimeField,
    pub text: Option<String>,
    pub options: MatchOptions,
}

/// Loose router input; unset values fall back to the store's retrieval defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalParams {
    pub text: Option<String>,
    pub datetime: Option<String>,
    pub window_minutes: Option<i64>,
    pub top_k: Option<usize>,
    pub score_threshold: Option<f32>,
    /// `Some(0)` keeps every keyword.
    pub tag_top_k: Option<usize>,
    pub datetime_field: DatetimeField,
}

impl RetrievalParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    pub fn with_window_minutes(mut self, minutes: i64) -> Self {
        self.window_minutes = Some(minutes);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    pub fn with_tag_top_k(mut self, tag_top_k: usize) -> Self {
        self.tag_top_k = Some(tag_top_k);
        self
    }

    pub fn with_datetime_field(mut self, field: DatetimeField) -> Self {
        self.datetime_field = field;
        self
    }

    fn match_options(&self, defaults: &RetrievalConfig) -> MatchOptions {
        let tag_top_k = match self.tag_top_k {
            Some(0) => None,
            Some(limit) => Some(limit),
            None => defaults.tag_limit(),
        };
        MatchOptions {
            top_k: self.top_k.unwrap_or(defaults.top_k),
            score_threshold: self
                .score_threshold
                .unwrap_or(defaults.text_score_threshold),
            tag_top_k,
        }
    }
}

/// Validated retrieval request, one variant per strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalRequest {
    Embedding(EmbeddingQuery),
    Text(TextQuery),
    Datetime(DatetimeQuery),
}

impl RetrievalRequest {
    /// Convert loose parameters into a typed request.
    ///
    /// Returns `Ok(None)` when the strategy has nothing to search for (no text for
    /// embedding or text retrieval, no datetime for datetime retrieval).
    pub fn from_params(
        kind: RetrievalType,
        params: RetrievalParams,
        defaults: &RetrievalConfig,
    ) -> Result<Option<Self>, MemoryError> {
        let request = match kind {
            RetrievalType::Embedding => params.text.clone().map(|text| {
                RetrievalRequest::Embedding(EmbeddingQuery {
                    text,
                    top_k: params.top_k.unwrap_or(defaults.top_k),
                    score_threshold: params
                        .score_threshold
                        .unwrap_or(defaults.embedding_score_threshold),
                })
            }),
            RetrievalType::Text => {
                let options = params.match_options(defaults);
                params
                    .text
                    .map(|text| RetrievalRequest::Text(TextQuery { text, options }))
            }
            RetrievalType::Datetime => match params.datetime.as_deref() {
                None => None,
                Some(raw) => Some(RetrievalRequest::Datetime(DatetimeQuery {
                    datetime: parse_datetime(raw)?,
                    window_minutes: params.window_minutes.unwrap_or(defaults.window_minutes),
                    field: params.datetime_field,
                    options: params.match_options(defaults),
                    text: params.text,
                })),
            },
        };
        Ok(request)
    }

    /// Strategy this request dispatches to.
    pub fn kind(&self) -> RetrievalType {
        match self {
            RetrievalRequest::Embedding(_) => RetrievalType::Embedding,
            RetrievalRequest::Text(_) => RetrievalType::Text,
            RetrievalRequest::Datetime(_) => RetrievalType::Datetime,
        }
    }
}
