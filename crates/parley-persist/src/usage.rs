use std::sync::Arc;
use std::time::Duration;

use crate::cache::{get_json, set_json, usage_key, CacheClient};
use crate::error::{PersistError, Result};
use crate::models::Usage;
use crate::trait_client::PersistenceClient;

pub const DEFAULT_USAGE_TTL: Duration = Duration::from_secs(60 * 60);

/// Per-tenant message quota.
///
/// `check` and `commit` are separate steps: two turns admitted
/// at the same time can both commit, bounded by the store-level constraint.
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn PersistenceClient>,
    cache: Arc<dyn CacheClient>,
    ttl: Duration,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn PersistenceClient>, cache: Arc<dyn CacheClient>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// Admission. Fails with `QuotaExceeded` when `used + 1 >= limit`.
    pub async fn check(&self, slug: &str) -> Result<Usage> {
        let key = usage_key(slug);

        let cached = match get_json::<Usage>(self.cache.as_ref(), &key).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "usage cache read failed");
                None
            }
        };

        let usage = match cached {
            Some(usage) => usage,
            None => {
                let usage = self
                    .store
                    .get_usage(slug)
                    .await?
                    .ok_or_else(|| PersistError::Internal(format!("no message count for tenant {}", slug)))?;
                self.store_in_cache(&key, &usage).await;
                usage
            }
        };

        if !usage.admits_turn() {
            tracing::info!(slug, used = usage.used, limit = usage.limit, "message limit reached");
            return Err(PersistError::QuotaExceeded {
                limit: usage.limit,
                used: usage.used,
            });
        }
        Ok(usage)
    }

    /// Atomic increment after a committed turn. On failure the cached pair is
    /// dropped so the next admission re-reads the store.
    pub async fn commit(&self, slug: &str) -> Result<Usage> {
        match self.store.increment_usage(slug).await {
            Ok(usage) => {
                self.store_in_cache(&usage_key(slug), &usage).await;
                Ok(usage)
            }
            Err(e) => {
                tracing::error!(slug, error = %e, "usage increment failed");
                self.invalidate(slug).await;
                Err(e)
            }
        }
    }

    /// Drop the cached pair, returning what was there.
    pub async fn invalidate(&self, slug: &str) -> Option<Usage> {
        let key = usage_key(slug);
        match self.cache.getdel(&key).await {
            Ok(Some(stale)) => {
                let stale = serde_json::from_value::<Usage>(stale).ok();
                tracing::debug!(slug, ?stale, "dropped cached usage");
                stale
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "usage cache invalidation failed");
                None
            }
        }
    }

    async fn store_in_cache(&self, key: &str, usage: &Usage) {
        if let Err(e) = set_json(self.cache.as_ref(), key, usage, Some(self.ttl)).await {
            tracing::warn!(key = %key, error = %e, "usage cache write failed");
        }
    }
}
