use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    pub slug: String,
    pub display_name: String,
    pub message_limit: i64,
    pub used_messages: i64,
}

impl Tenant {
    pub fn new(slug: impl Into<String>, display_name: impl Into<String>, message_limit: i64) -> Self {
        Self {
            slug: slug.into(),
            display_name: display_name.into(),
            message_limit,
            used_messages: 0,
        }
    }

    pub fn usage(&self) -> Usage {
        Usage {
            limit: self.message_limit,
            used: self.used_messages,
        }
    }
}

/// Cached `{limit, used}` pair for a tenant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub limit: i64,
    pub used: i64,
}

impl Usage {
    /// Admission rule: a turn is accepted only while `used + 1 < limit`.
    pub fn admits_turn(&self) -> bool {
        self.used + 1 < self.limit
    }
}
