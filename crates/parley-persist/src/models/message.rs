use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::thread::{Thread, ThreadTarget, DEFAULT_PAGE_LIMIT};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn of(message: &parley_llm::Message) -> Self {
        match message {
            parley_llm::Message::System { .. } => Self::System,
            parley_llm::Message::Human { .. } => Self::User,
            parley_llm::Message::AI { .. } => Self::Assistant,
            parley_llm::Message::Tool { .. } => Self::Tool,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Full message row. `content` is the serialized model message and is
/// treated as opaque by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub role: MessageRole,
    pub content: Value,
    pub extra_reason: bool,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn partial(&self) -> PartialMessage {
        PartialMessage {
            id: self.id,
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Model-context projection of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: Value,
}

impl PartialMessage {
    pub fn to_llm(&self) -> Result<parley_llm::Message> {
        Ok(serde_json::from_value(self.content.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: Value,
    pub extra_reason: bool,
}

impl NewMessage {
    pub fn from_llm(message: &parley_llm::Message, extra_reason: bool) -> Result<Self> {
        Ok(Self {
            role: MessageRole::of(message),
            content: serde_json::to_value(message)?,
            extra_reason,
        })
    }
}

/// Authorization predicate and page window for a thread read.
#[derive(Debug, Clone)]
pub struct MessageQuery {
    /// Thread owner must belong to this tenant
    pub slug: String,
    /// When set, thread owner must be this user
    pub user_id: Option<Uuid>,
    /// Exclusive upper bound on `created_at`
    pub cursor: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl MessageQuery {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            user_id: None,
            cursor: None,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn owned_by(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn before(mut self, cursor: Option<DateTime<Utc>>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Everything the finalize step writes in one transaction.
#[derive(Debug, Clone)]
pub struct TurnCommit {
    pub user_id: Uuid,
    pub slug: String,
    pub target: ThreadTarget,
    /// Edited message: it and everything at or after its timestamp is removed
    pub truncate_from: Option<Uuid>,
    pub messages: Vec<NewMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommittedTurn {
    pub thread: Thread,
    pub created_thread: bool,
    pub messages: Vec<StoredMessage>,
    /// Newest row the thread held right before the insert, after any edit
    /// truncation. `None` for an empty or new thread.
    pub previous_last: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchedThread {
    pub thread: Thread,
    pub messages: Vec<StoredMessage>,
}

/// Millisecond-precision "now", the resolution every backend stores.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Timestamps for a batch appended to a thread whose newest row is `last`.
/// Strictly increasing, all later than `last`, one millisecond apart.
pub fn stamp_batch(last: Option<DateTime<Utc>>, now: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
    let step = Duration::milliseconds(1);
    let base = match last {
        Some(last) if last + step > now => last + step,
        _ => now,
    };
    (0..count)
        .map(|i| base + step * i as i32)
        .collect()
}

/// Page selection shared by backends: the `limit` newest rows strictly
/// older than the cursor, returned oldest first.
pub fn select_page(messages: &[StoredMessage], cursor: Option<DateTime<Utc>>, limit: i64) -> Vec<StoredMessage> {
    let eligible: Vec<&StoredMessage> = messages
        .iter()
        .filter(|m| cursor.map_or(true, |c| m.created_at < c))
        .collect();
    let limit = limit.max(0) as usize;
    let start = eligible.len().saturating_sub(limit);
    eligible[start..].iter().map(|m| (*m).clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_batch_after_future_last() {
        let now = now_millis();
        let last = now + Duration::milliseconds(5);

        let stamps = stamp_batch(Some(last), now, 3);
        assert_eq!(stamps[0], last + Duration::milliseconds(1));
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_stamp_batch_empty_thread() {
        let now = now_millis();
        let stamps = stamp_batch(None, now, 2);
        assert_eq!(stamps, vec![now, now + Duration::milliseconds(1)]);
    }

    #[test]
    fn test_llm_message_round_trip_through_content() {
        let message = parley_llm::Message::ai_with_tools(
            Some(parley_llm::Content::text("looking")),
            vec![parley_llm::ToolCall::new("c1", "list_credentials", "{}")],
        );
        let new = NewMessage::from_llm(&message, true).unwrap();
        assert_eq!(new.role, MessageRole::Assistant);

        let partial = PartialMessage {
            id: Uuid::new_v4(),
            role: new.role,
            content: new.content,
        };
        assert_eq!(partial.to_llm().unwrap(), message);
    }

    #[test]
    fn test_select_page_takes_newest_before_cursor() {
        let thread_id = Uuid::new_v4();
        let base = now_millis();
        let rows: Vec<StoredMessage> = (0..5)
            .map(|i| StoredMessage {
                id: Uuid::new_v4(),
                thread_id,
                role: MessageRole::User,
                content: Value::Null,
                extra_reason: false,
                created_at: base + Duration::milliseconds(i),
            })
            .collect();

        let page = select_page(&rows, Some(rows[4].created_at), 2);
        assert_eq!(page, vec![rows[2].clone(), rows[3].clone()]);
    }
}
