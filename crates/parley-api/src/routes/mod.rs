pub mod credentials;
pub mod health;
pub mod threads;

use chrono::{DateTime, SecondsFormat, Utc};
use parley_persist::models::thread::DEFAULT_PAGE_LIMIT;

/// Largest page a client may ask for.
pub const MAX_PAGE_LIMIT: i64 = 100;

pub(crate) fn page_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

/// Cursors go out as RFC 3339 with millisecond precision and a `Z` suffix so
/// they survive a query string unescaped.
pub(crate) fn format_cursor(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
