use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PersistError, Result};
use crate::models::{
    CredentialOwner, CredentialRecord, MessageRole, OauthProvider, OauthScope, StoredMessage,
    Tenant, Thread, Usage, User,
};

pub fn to_bson_datetime(dt: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(dt.timestamp_millis())
}

pub fn from_bson_datetime(dt: bson::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default()
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| PersistError::Internal(format!("stored id '{}' is not a uuid: {}", raw, e)))
}

/// `_id` is the tenant slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTenant {
    #[serde(rename = "_id")]
    pub slug: String,
    pub display_name: String,
    pub message_limit: i64,
    pub used_messages: i64,
}

impl From<MongoTenant> for Tenant {
    fn from(t: MongoTenant) -> Self {
        Self {
            slug: t.slug,
            display_name: t.display_name,
            message_limit: t.message_limit,
            used_messages: t.used_messages,
        }
    }
}

impl MongoTenant {
    pub fn usage(&self) -> Usage {
        Usage {
            limit: self.message_limit,
            used: self.used_messages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub slug: String,
    pub email: String,
    /// Backs the case-insensitive `(slug, email)` unique index
    pub email_lower: String,
    pub display_name: String,
    pub pfp_url: Option<String>,
    pub is_admin: bool,
}

impl TryFrom<MongoUser> for User {
    type Error = PersistError;

    fn try_from(u: MongoUser) -> Result<Self> {
        Ok(Self {
            id: parse_id(&u.id)?,
            slug: u.slug,
            email: u.email,
            display_name: u.display_name,
            pfp_url: u.pfp_url,
            is_admin: u.is_admin,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGrant {
    pub user_id: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCredential {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub owner_slug: String,
    pub owner_email: String,
    pub provider: OauthProvider,
    pub scope: Vec<OauthScope>,
    pub scope_key: String,
    pub access_token: String,
    pub access_token_expires_at: Option<bson::DateTime>,
    pub refresh_token: Option<String>,
    pub refresh_token_expires_at: Option<bson::DateTime>,
    pub is_global: bool,
    #[serde(default)]
    pub shared_with: Vec<MongoGrant>,
    pub created_at: bson::DateTime,
}

impl TryFrom<MongoCredential> for CredentialRecord {
    type Error = PersistError;

    fn try_from(c: MongoCredential) -> Result<Self> {
        Ok(Self {
            id: parse_id(&c.id)?,
            provider: c.provider,
            scope: c.scope,
            access_token: c.access_token,
            access_token_expires_at: c.access_token_expires_at.map(from_bson_datetime),
            owner: CredentialOwner {
                id: parse_id(&c.user_id)?,
                email: c.owner_email,
            },
            is_global: c.is_global,
            created_at: from_bson_datetime(c.created_at),
        })
    }
}

/// Threads carry the owner's tenant so reads can authorize without a join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoThread {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub slug: String,
    pub title: Option<String>,
    pub created_at: bson::DateTime,
    /// Bumped by every turn commit so concurrent commits on one thread
    /// write-conflict instead of both stamping from the same last row.
    #[serde(default)]
    pub revision: i64,
}

impl MongoThread {
    pub fn from_thread(thread: &Thread, slug: &str) -> Self {
        Self {
            id: thread.id.to_string(),
            user_id: thread.user_id.to_string(),
            slug: slug.to_string(),
            title: thread.title.clone(),
            created_at: to_bson_datetime(thread.created_at),
            revision: 0,
        }
    }
}

impl TryFrom<MongoThread> for Thread {
    type Error = PersistError;

    fn try_from(t: MongoThread) -> Result<Self> {
        Ok(Self {
            id: parse_id(&t.id)?,
            user_id: parse_id(&t.user_id)?,
            title: t.title,
            created_at: from_bson_datetime(t.created_at),
        })
    }
}

/// Messages repeat the thread owner and tenant for the same reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    pub slug: String,
    pub role: MessageRole,
    pub content: serde_json::Value,
    pub extra_reason: bool,
    pub created_at: bson::DateTime,
}

impl MongoMessage {
    pub fn from_stored(message: &StoredMessage, user_id: Uuid, slug: &str) -> Self {
        Self {
            id: message.id.to_string(),
            thread_id: message.thread_id.to_string(),
            user_id: user_id.to_string(),
            slug: slug.to_string(),
            role: message.role,
            content: message.content.clone(),
            extra_reason: message.extra_reason,
            created_at: to_bson_datetime(message.created_at),
        }
    }
}

impl TryFrom<MongoMessage> for StoredMessage {
    type Error = PersistError;

    fn try_from(m: MongoMessage) -> Result<Self> {
        Ok(Self {
            id: parse_id(&m.id)?,
            thread_id: parse_id(&m.thread_id)?,
            role: m.role,
            content: m.content,
            extra_reason: m.extra_reason,
            created_at: from_bson_datetime(m.created_at),
        })
    }
}
