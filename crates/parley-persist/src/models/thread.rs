use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PersistError;

pub const DEFAULT_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Position in a newest-first listing. Threads created in the same
/// millisecond are ordered by id, descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl ThreadCursor {
    /// Cursor for the page that follows `thread`.
    pub fn after(thread: &Thread) -> Self {
        Self {
            created_at: thread.created_at,
            id: thread.id,
        }
    }

    /// Whether `thread` sorts strictly after the cursor position.
    pub fn admits(&self, thread: &Thread) -> bool {
        thread.created_at < self.created_at || (thread.created_at == self.created_at && thread.id < self.id)
    }
}

/// `<RFC 3339 millis>_<uuid>`, safe in a query string.
impl fmt::Display for ThreadCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.id
        )
    }
}

impl FromStr for ThreadCursor {
    type Err = PersistError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || PersistError::Validation(format!("invalid thread cursor '{}'", raw));
        let (at, id) = raw.rsplit_once('_').ok_or_else(invalid)?;
        Ok(Self {
            created_at: DateTime::parse_from_rfc3339(at)
                .map_err(|_| invalid())?
                .with_timezone(&Utc),
            id: Uuid::parse_str(id).map_err(|_| invalid())?,
        })
    }
}

/// Newest-first thread listing for one user.
#[derive(Debug, Clone)]
pub struct ThreadQuery {
    /// Exclusive position; only threads sorting after it are returned
    pub cursor: Option<ThreadCursor>,
    pub limit: i64,
    /// Case-insensitive title substring
    pub search: Option<String>,
}

impl Default for ThreadQuery {
    fn default() -> Self {
        Self {
            cursor: None,
            limit: DEFAULT_PAGE_LIMIT,
            search: None,
        }
    }
}

/// Where a committed turn lands.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadTarget {
    Existing(Uuid),
    New { title: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(created_at: DateTime<Utc>, id: Uuid) -> Thread {
        Thread {
            id,
            user_id: Uuid::new_v4(),
            title: None,
            created_at,
        }
    }

    #[test]
    fn test_cursor_text_form() {
        let cursor = ThreadCursor {
            created_at: DateTime::from_timestamp_millis(1_760_000_000_123).unwrap(),
            id: Uuid::new_v4(),
        };
        let text = cursor.to_string();
        assert!(text.starts_with("2025-10-09T08:53:20.123Z_"));
        assert_eq!(text.parse::<ThreadCursor>().unwrap(), cursor);

        assert!("2025-10-09T08:53:20.123Z".parse::<ThreadCursor>().is_err());
        assert!("yesterday_00000000-0000-0000-0000-000000000000".parse::<ThreadCursor>().is_err());
    }

    #[test]
    fn test_cursor_breaks_millisecond_ties_by_id() {
        let at = DateTime::from_timestamp_millis(1_760_000_000_000).unwrap();
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        let cursor = ThreadCursor::after(&thread(at, high));

        assert!(cursor.admits(&thread(at, low)));
        assert!(!cursor.admits(&thread(at, high)));
        assert!(cursor.admits(&thread(at - chrono::Duration::milliseconds(1), Uuid::from_u128(9))));
        assert!(!cursor.admits(&thread(at + chrono::Duration::milliseconds(1), low)));
    }
}
