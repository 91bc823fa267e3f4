//! Recursive summarization of long histories.
//!
//! Old turns are folded into one synthetic `summary` message. The retained tail
//! always starts on a user turn so an exchange is never split across the boundary.

use crate::error::MemoryError;
use crate::store::MemoryStore;
use chrono::{DateTime, Utc};
use log::{debug, info};
use parley_config::{CONVERSATION_PLACEHOLDER, SummaryConfig};
use parley_protocol::{CompletionService, Message, PartitionKey, RoleType};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Default summarization prompt.
pub const SUMMARY_PROMPT_TEMPLATE: &str = "\
Condense the conversation below into a brief summary for the agents that continue it.
Keep decisions, open questions, facts the user provided, and the outcome of each step.
Do not invent details and do not address the user directly.

#### Conversation
{conversation}

#### Summary
";

/// Role name given to synthetic summaries.
pub const SUMMARY_ROLE_NAME: &str = "summaryer";

/// Parsed-output key left out of transcripts.
const RESERVED_STATUS_KEY: &str = "Action Status";

/// Split into `(head, tail)` where the tail holds at most the last `split_n`
/// messages and, unless empty, starts on a user turn.
pub fn split_at_user_turn(
    mut messages: Vec<Message>,
    split_n: usize,
) -> (Vec<Message>, Vec<Message>) {
    let boundary = messages.len().saturating_sub(split_n);
    let tail = messages.split_off(boundary);
    let mut head = messages;
    let leading = tail
        .iter()
        .position(|message| message.role_type == RoleType::User)
        .unwrap_or(tail.len());
    let mut tail = tail.into_iter();
    head.extend(tail.by_ref().take(leading));
    (head, tail.collect())
}

/// Render messages as a transcript, skipping earlier summaries.
///
/// Each message is its role type on one line followed by one `*key* value` line
/// per parsed output entry; messages are separated by a blank line.
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|message| !message.is_summary())
        .map(|message| {
            let mut lines = vec![message.role_type.to_string()];
            for entry in &message.parsed_output_list {
                for (key, value) in entry {
                    if key == RESERVED_STATUS_KEY {
                        continue;
                    }
                    lines.push(format!("*{key}* {}", render_value(value)));
                }
            }
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Identity stamped on the synthetic summary message.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryContext {
    pub chat_index: String,
    pub message_index: String,
    pub user_name: String,
}

impl SummaryContext {
    /// Context for a chat with a fresh message index.
    pub fn new(chat_index: impl Into<String>) -> Self {
        Self {
            chat_index: chat_index.into(),
            message_index: Uuid::new_v4().to_string(),
            user_name: String::new(),
        }
    }

    pub fn with_message_index(mut self, message_index: impl Into<String>) -> Self {
        self.message_index = message_index.into();
        self
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self
    }
}

/// When and how aggressively to compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryPolicy {
    pub enabled: bool,
    /// Messages kept verbatim after a pass.
    pub split_n: usize,
    /// Pending messages that trigger a policy-driven pass.
    pub max_messages: usize,
}

impl Default for SummaryPolicy {
    fn default() -> Self {
        Self::from(&SummaryConfig::default())
    }
}

impl From<&SummaryConfig> for SummaryPolicy {
    fn from(config: &SummaryConfig) -> Self {
        Self {
            enabled: config.enabled,
            split_n: config.split_n,
            max_messages: config.max_messages,
        }
    }
}

/// Folds old turns into a summary via a completion service.
#[derive(Clone)]
pub struct SummaryCompactor {
    completion: Arc<dyn CompletionService>,
    template: String,
    policy: SummaryPolicy,
}

impl SummaryCompactor {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            completion,
            template: SUMMARY_PROMPT_TEMPLATE.to_string(),
            policy: SummaryPolicy::default(),
        }
    }

    /// Build from config; a configured template replaces the default.
    pub fn from_config(completion: Arc<dyn CompletionService>, config: &SummaryConfig) -> Self {
        let compactor = Self::new(completion).with_policy(SummaryPolicy::from(config));
        match &config.prompt_template {
            Some(template) => compactor.with_template(template.clone()),
            None => compactor,
        }
    }

    /// Prompt template; must contain `{conversation}`.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_policy(mut self, policy: SummaryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &SummaryPolicy {
        &self.policy
    }

    /// Compact a history into `[summary, ..tail]`.
    ///
    /// An empty input returns empty. An empty head yields a summary with empty text
    /// without calling the completion service. The summary is stamped with the
    /// latest end time of the messages it covers, so the tail stays newer than it.
    pub async fn compact(
        &self,
        messages: Vec<Message>,
        context: &SummaryContext,
    ) -> Result<Vec<Message>, MemoryError> {
        if messages.is_empty() {
            return Ok(messages);
        }
        let (head, tail) = split_at_user_turn(messages, self.policy.split_n);
        self.fold(head, tail, context).await
    }

    async fn fold(
        &self,
        head: Vec<Message>,
        tail: Vec<Message>,
        context: &SummaryContext,
    ) -> Result<Vec<Message>, MemoryError> {
        let content = if head.is_empty() {
            debug!("empty summary head (chat_index={})", context.chat_index);
            String::new()
        } else {
            let transcript = render_transcript(&head);
            let prompt = self.template.replace(CONVERSATION_PLACEHOLDER, &transcript);
            self.completion.complete(&prompt).await?
        };
        info!(
            "history compacted (chat_index={}, input={}, summarized={}, retained={})",
            context.chat_index,
            head.len() + tail.len(),
            head.len(),
            tail.len()
        );
        let covered_until = head
            .iter()
            .map(|message| message.end_datetime)
            .max()
            .unwrap_or_else(Utc::now);
        let mut compacted = Vec::with_capacity(tail.len() + 1);
        compacted.push(summary_message(content, context, covered_until));
        compacted.extend(tail);
        Ok(compacted)
    }

    /// Compact the partition's pending messages and store the summary.
    ///
    /// Returns the compacted context, or `None` when the pending messages all fit
    /// in the retained tail. Originals stay in `recall`; the summary lands in
    /// `recall` and `summary`.
    pub async fn compact_partition<S>(
        &self,
        store: &S,
        key: &PartitionKey,
        context: &SummaryContext,
    ) -> Result<Option<Vec<Message>>, MemoryError>
    where
        S: MemoryStore + ?Sized,
    {
        let pending = store.views(key).await?.pending();
        let (head, tail) = split_at_user_turn(pending, self.policy.split_n);
        if head.is_empty() {
            debug!(
                "nothing to compact (key={key}, pending={}, split_n={})",
                tail.len(),
                self.policy.split_n
            );
            return Ok(None);
        }
        let compacted = self.fold(head, tail, context).await?;
        if let Some(summary) = compacted.first() {
            store.append(key, summary.clone()).await?;
        }
        Ok(Some(compacted))
    }

    /// Run [`Self::compact_partition`] only when enabled and more than
    /// `max_messages` are pending.
    pub async fn compact_partition_if_needed<S>(
        &self,
        store: &S,
        key: &PartitionKey,
        context: &SummaryContext,
    ) -> Result<Option<Vec<Message>>, MemoryError>
    where
        S: MemoryStore + ?Sized,
    {
        if !self.policy.enabled {
            return Ok(None);
        }
        let pending = store.views(key).await?.pending().len();
        if pending <= self.policy.max_messages {
            debug!(
                "compaction not needed (key={key}, pending={pending}, max={})",
                self.policy.max_messages
            );
            return Ok(None);
        }
        self.compact_partition(store, key, context).await
    }
}

fn summary_message(
    content: String,
    context: &SummaryContext,
    covered_until: DateTime<Utc>,
) -> Message {
    let mut entry = Map::new();
    entry.insert("summary".to_string(), Value::String(content.clone()));
    Message::new(
        context.chat_index.clone(),
        SUMMARY_ROLE_NAME,
        RoleType::Summary,
    )
    .with_message_index(context.message_index.clone())
    .with_user_name(context.user_name.clone())
    .with_role_content(content.clone())
    .with_step_content(content)
    .with_parsed_output(entry)
    .at(covered_until)
}

#[cfg(test)]
mod tests {
    use super::{render_transcript, split_at_user_turn};
    use parley_protocol::{Message, RoleType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn turn(index: usize, role_type: RoleType) -> Message {
        Message::new("c", "r", role_type).with_message_index(index.to_string())
    }

    #[test]
    fn split_moves_leading_non_user_turns_into_head() {
        let messages: Vec<_> = (0..6)
            .map(|i| {
                let role = if i == 4 { RoleType::User } else { RoleType::Assistant };
                turn(i, role)
            })
            .collect();
        let (head, tail) = split_at_user_turn(messages, 3);
        assert_eq!(head.len(), 4);
        let tail_indexes: Vec<_> = tail.iter().map(|m| m.message_index.as_str()).collect();
        assert_eq!(tail_indexes, vec!["4", "5"]);
    }

    #[test]
    fn split_consumes_tail_without_user_turn() {
        let messages: Vec<_> = (0..4).map(|i| turn(i, RoleType::Assistant)).collect();
        let (head, tail) = split_at_user_turn(messages, 2);
        assert_eq!(head.len(), 4);
        assert!(tail.is_empty());
    }

    #[test]
    fn split_short_history_keeps_everything_in_tail() {
        let messages = vec![turn(0, RoleType::User), turn(1, RoleType::Assistant)];
        let (head, tail) = split_at_user_turn(messages, 20);
        assert!(head.is_empty());
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn transcript_skips_summaries_and_status_key() {
        let user = Message::new("c", "user", RoleType::User).with_parsed_output(
            json!({"content": "find the bug", "Action Status": "continued"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let previous = Message::new("c", "summaryer", RoleType::Summary)
            .with_parsed_output(json!({"summary": "old"}).as_object().cloned().unwrap());
        let agent = Message::new("c", "coder", RoleType::Assistant)
            .with_parsed_output(json!({"code": 42}).as_object().cloned().unwrap());

        let transcript = render_transcript(&[user, previous, agent]);
        assert_eq!(transcript, "user\n*content* find the bug\n\nassistant\n*code* 42");
    }
}
