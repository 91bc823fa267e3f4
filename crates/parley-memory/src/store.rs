//! Store and router contracts shared by every backend.

use crate::error::MemoryError;
use crate::retrieval::{
    DatetimeQuery, EmbeddingQuery, RetrievalParams, RetrievalRequest, RetrievalType, TextQuery,
};
use crate::tools::ToolTrace;
use async_trait::async_trait;
use log::debug;
use parley_config::RetrievalConfig;
use parley_protocol::{Memory, Message, PartitionKey, RoleType};

/// The three views of one partition.
///
/// `recall` is the source of truth; `current` and `summary` are derived from it
/// and only change through [`PartitionViews::push`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionViews {
    recall: Memory,
    current: Memory,
    summary: Memory,
}

impl PartitionViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive `current` and `summary` from a loaded history.
    pub fn from_recall(recall: Memory) -> Self {
        let current = Memory::from(recall.filter_by_role_type(&[RoleType::Summary]));
        let summary = Memory::from(recall.select_by_role_type(&[RoleType::Summary]));
        Self {
            recall,
            current,
            summary,
        }
    }

    /// Full history.
    pub fn recall(&self) -> &Memory {
        &self.recall
    }

    /// History without summaries.
    pub fn current(&self) -> &Memory {
        &self.current
    }

    /// Summaries only.
    pub fn summary(&self) -> &Memory {
        &self.summary
    }

    pub fn into_recall(self) -> Memory {
        self.recall
    }

    pub fn len(&self) -> usize {
        self.recall.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recall.is_empty()
    }

    /// Whether an equivalent message is already stored.
    ///
    /// Equivalent means the same `end_datetime` (millisecond precision) and a
    /// non-empty `input_query` or `role_content` already among the stored primary texts.
    pub fn contains_equivalent(&self, message: &Message) -> bool {
        let instant = message.end_datetime.timestamp_millis();
        let same_instant = self
            .recall
            .iter()
            .any(|stored| stored.end_datetime.timestamp_millis() == instant);
        if !same_instant {
            return false;
        }
        let contents = self.recall.contents();
        [&message.input_query, &message.role_content]
            .into_iter()
            .filter(|text| !text.is_empty())
            .any(|text| contents.contains(&text.as_str()))
    }

    /// Route a message into `recall` and exactly one derived view.
    pub fn push(&mut self, message: Message) {
        if message.is_summary() {
            self.summary.push(message.clone());
        } else {
            self.current.push(message.clone());
        }
        self.recall.push(message);
    }

    /// Current messages newer than the latest summary; all of `current` when none exists.
    pub fn pending(&self) -> Vec<Message> {
        let Some(latest) = self
            .summary
            .iter()
            .map(|message| message.end_datetime)
            .max()
        else {
            return self.current.messages().to_vec();
        };
        self.current
            .iter()
            .filter(|message| message.end_datetime > latest)
            .cloned()
            .collect()
    }
}

/// Write-through message store, partitioned by [`PartitionKey`].
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append one message. Returns `false` when an equivalent message was already stored.
    async fn append(&self, key: &PartitionKey, message: Message) -> Result<bool, MemoryError>;

    /// Append messages in order; not atomic as a batch. Returns how many were new.
    async fn extend(&self, key: &PartitionKey, memory: Memory) -> Result<usize, MemoryError> {
        let mut appended = 0;
        for message in memory {
            if self.append(key, message).await? {
                appended += 1;
            }
        }
        debug!("extended partition (key={key}, appended={appended})");
        Ok(appended)
    }

    /// Read durable state into the partition. Absent state loads as empty.
    async fn load(&self, key: &PartitionKey) -> Result<Memory, MemoryError>;

    /// Persist the partition's allow-listed fields.
    async fn save(&self, key: &PartitionKey) -> Result<(), MemoryError>;

    /// Reset the partition to empty, wiping durable state and the retrieval index.
    async fn clear(&self, key: &PartitionKey) -> Result<(), MemoryError>;

    /// Re-initialise from durable state and rebuild the retrieval index.
    async fn reload(&self, key: &PartitionKey) -> Result<Memory, MemoryError>;

    /// All three views of a partition.
    async fn views(&self, key: &PartitionKey) -> Result<PartitionViews, MemoryError>;

    /// Whether embedding retrieval can run.
    fn vector_search_available(&self) -> bool;

    /// The `recall` view.
    async fn partition(&self, key: &PartitionKey) -> Result<Memory, MemoryError> {
        Ok(self.views(key).await?.into_recall())
    }

    /// The `current` view.
    async fn current(&self, key: &PartitionKey) -> Result<Memory, MemoryError> {
        Ok(self.views(key).await?.current().clone())
    }

    /// The `summary` view.
    async fn summary(&self, key: &PartitionKey) -> Result<Memory, MemoryError> {
        Ok(self.views(key).await?.summary().clone())
    }

    /// Record a tool invocation as four messages.
    async fn append_tool_trace(
        &self,
        key: &PartitionKey,
        trace: &ToolTrace,
    ) -> Result<usize, MemoryError> {
        self.extend(key, trace.to_memory(&key.chat_index)).await
    }
}

/// Retrieval strategies plus type-keyed dispatch.
#[async_trait]
pub trait RetrievalRouter: Send + Sync {
    /// Defaults applied to unset [`RetrievalParams`].
    fn retrieval_defaults(&self) -> &RetrievalConfig;

    /// Nearest neighbours by embedding similarity.
    async fn embedding_retrieval(
        &self,
        key: &PartitionKey,
        query: &EmbeddingQuery,
    ) -> Result<Vec<Message>, MemoryError>;

    /// Keyword-overlap ranking over the partition.
    async fn text_retrieval(
        &self,
        key: &PartitionKey,
        query: &TextQuery,
    ) -> Result<Vec<Message>, MemoryError>;

    /// Time-window selection, ranked by keywords when a text is given.
    async fn datetime_retrieval(
        &self,
        key: &PartitionKey,
        query: &DatetimeQuery,
    ) -> Result<Vec<Message>, MemoryError>;

    /// Run a validated request.
    async fn retrieve(
        &self,
        key: &PartitionKey,
        request: &RetrievalRequest,
    ) -> Result<Vec<Message>, MemoryError> {
        debug!("retrieval (key={key}, type={})", request.kind());
        match request {
            RetrievalRequest::Embedding(query) => self.embedding_retrieval(key, query).await,
            RetrievalRequest::Text(query) => self.text_retrieval(key, query).await,
            RetrievalRequest::Datetime(query) => self.datetime_retrieval(key, query).await,
        }
    }

    /// Dispatch on a retrieval type name.
    async fn route(
        &self,
        key: &PartitionKey,
        retrieval_type: &str,
        params: RetrievalParams,
    ) -> Result<Vec<Message>, MemoryError> {
        let kind: RetrievalType = retrieval_type.parse()?;
        match RetrievalRequest::from_params(kind, params, self.retrieval_defaults())? {
            Some(request) => self.retrieve(key, &request).await,
            None => {
                debug!("retrieval skipped, nothing to search (key={key}, type={kind})");
                Ok(Vec::new())
            }
        }
    }
}

/// A store that can also route retrieval requests.
pub trait ConversationMemory: MemoryStore + RetrievalRouter {}

impl<T: MemoryStore + RetrievalRouter + ?Sized> ConversationMemory for T {}

/// Time-window candidates, ranked when a query text is present.
pub(crate) fn select_window(
    candidates: &Memory,
    query: &DatetimeQuery,
    matcher: &crate::similarity::KeywordMatcher,
) -> Vec<Message> {
    let window = crate::window::TimeWindow::around(query.datetime, query.window_minutes);
    let mut selected = window.select(candidates.iter(), query.field);
    match query.text.as_deref() {
        Some(text) => matcher.rank(text, selected, &query.options),
        None => {
            selected.truncate(query.options.top_k);
            selected
        }
    }
}
