use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{get_json, set_json, thread_key, CacheClient};
use crate::error::{PersistError, Result};
use crate::models::thread::DEFAULT_PAGE_LIMIT;
use crate::models::{MessageQuery, PartialMessage, StoredMessage};
use crate::trait_client::PersistenceClient;

pub const DEFAULT_THREAD_TTL: Duration = Duration::from_secs(5 * 60);

/// Cached partial projection of a thread, tagged with the predicate it was
/// read under so a hit can be re-authorized.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedThread {
    slug: String,
    owner_id: Option<Uuid>,
    messages: Vec<PartialMessage>,
}

impl CachedThread {
    fn visible_to(&self, request: &HistoryRequest) -> bool {
        self.slug == request.slug
            && match request.user_id {
                Some(uid) => self.owner_id == Some(uid),
                None => true,
            }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub slug: String,
    pub user_id: Option<Uuid>,
    pub cursor: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    /// Skip populating the cache after a durable read
    pub bypass_cache: bool,
}

impl HistoryRequest {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            user_id: None,
            cursor: None,
            limit: None,
            bypass_cache: false,
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

    pub fn limit(mut self, limit: Option<i64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1)
    }

    fn query(&self) -> MessageQuery {
        let mut query = MessageQuery::new(self.slug.clone())
            .before(self.cursor)
            .limit(self.effective_limit());
        query.user_id = self.user_id;
        query
    }
}

/// Loads thread history for model context (partial) or display (full).
#[derive(Clone)]
pub struct HistoryResolver {
    store: Arc<dyn PersistenceClient>,
    cache: Arc<dyn CacheClient>,
    ttl: Duration,
}

impl HistoryResolver {
    pub fn new(store: Arc<dyn PersistenceClient>, cache: Arc<dyn CacheClient>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// `[{id, role, content}]`; served from cache when no cursor is given.
    pub async fn load_partial(&self, thread_id: Uuid, request: &HistoryRequest) -> Result<Vec<PartialMessage>> {
        if request.cursor.is_none() {
            if let Some(cached) = self.cached(thread_id).await {
                if cached.visible_to(request) {
                    let limit = request.effective_limit() as usize;
                    let skip = cached.messages.len().saturating_sub(limit);
                    return Ok(cached.messages.into_iter().skip(skip).collect());
                }
            }
        }

        let rows = self.read(thread_id, request).await?;
        let partials: Vec<PartialMessage> = rows.iter().map(StoredMessage::partial).collect();
        self.populate(thread_id, request, &partials).await;
        Ok(partials)
    }

    /// `[{id, role, content, extra_reason, created_at}]`, always from the store.
    pub async fn load_full(&self, thread_id: Uuid, request: &HistoryRequest) -> Result<Vec<StoredMessage>> {
        let rows = self.read(thread_id, request).await?;
        let partials: Vec<PartialMessage> = rows.iter().map(StoredMessage::partial).collect();
        self.populate(thread_id, request, &partials).await;
        Ok(rows)
    }

    /// Overwrite the cached thread with authoritative post-commit content.
    pub async fn refresh(&self, thread_id: Uuid, slug: &str, owner_id: Uuid, messages: Vec<PartialMessage>) {
        let entry = CachedThread {
            slug: slug.to_string(),
            owner_id: Some(owner_id),
            messages,
        };
        let key = thread_key(thread_id);
        if let Err(e) = set_json(self.cache.as_ref(), &key, &entry, Some(self.ttl)).await {
            tracing::warn!(key = %key, error = %e, "thread cache refresh failed");
        }
    }

    pub async fn invalidate(&self, thread_ids: &[Uuid]) {
        let keys: Vec<String> = thread_ids.iter().map(|id| thread_key(*id)).collect();
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.cache.del(&keys).await {
            tracing::warn!(error = %e, "thread cache invalidation failed");
        }
    }

    async fn read(&self, thread_id: Uuid, request: &HistoryRequest) -> Result<Vec<StoredMessage>> {
        let rows = self
            .store
            .get_thread_messages(thread_id, &request.query())
            .await?;
        if rows.is_empty() {
            return Err(PersistError::not_found(format!("thread {}", thread_id)));
        }
        Ok(rows)
    }

    async fn cached(&self, thread_id: Uuid) -> Option<CachedThread> {
        let key = thread_key(thread_id);
        match get_json::<CachedThread>(self.cache.as_ref(), &key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "thread cache read failed");
                None
            }
        }
    }

    async fn populate(&self, thread_id: Uuid, request: &HistoryRequest, partials: &[PartialMessage]) {
        if request.bypass_cache || request.cursor.is_some() || request.limit.is_some() {
            return;
        }
        let entry = CachedThread {
            slug: request.slug.clone(),
            owner_id: request.user_id,
            messages: partials.to_vec(),
        };
        let key = thread_key(thread_id);
        if let Err(e) = set_json(self.cache.as_ref(), &key, &entry, Some(self.ttl)).await {
            tracing::warn!(key = %key, error = %e, "thread cache write failed");
        }
    }
}
