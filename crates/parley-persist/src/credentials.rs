use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::cache::{credentials_key, credentials_prefix, get_json, set_json, CacheClient};
use crate::error::Result;
use crate::models::{ActiveUser, CredentialProjection, CredentialRecord, CredentialSummary};
use crate::trait_client::PersistenceClient;

pub const DEFAULT_CREDENTIALS_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Resolves which third-party credentials a caller may act through.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn PersistenceClient>,
    cache: Arc<dyn CacheClient>,
    ttl: Duration,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn PersistenceClient>, cache: Arc<dyn CacheClient>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// Cache-first. A store failure is an error, never an empty list.
    pub async fn resolve(&self, user: &ActiveUser) -> Result<Vec<CredentialProjection>> {
        let key = credentials_key(&user.slug, user.id);

        match get_json::<Vec<CredentialProjection>>(self.cache.as_ref(), &key).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "credential cache read failed"),
        }

        let records = self.store.find_credentials(user).await?;
        let projections: Vec<CredentialProjection> =
            records.iter().map(CredentialRecord::projection).collect();

        if let Err(e) = set_json(self.cache.as_ref(), &key, &projections, Some(self.ttl)).await {
            tracing::warn!(key = %key, error = %e, "credential cache write failed");
        }

        tracing::debug!(user_id = %user.id, count = projections.len(), "resolved credentials");
        Ok(projections)
    }

    /// Token-free listing under the same authorization rules.
    pub async fn list_for_display(&self, user: &ActiveUser) -> Result<Vec<CredentialSummary>> {
        let records = self.store.find_credentials(user).await?;
        Ok(records.iter().map(CredentialRecord::summary).collect())
    }

    /// Purge cached credential sets: the given users, or the whole tenant.
    pub async fn invalidate(&self, slug: &str, user_ids: Option<&[Uuid]>) -> Result<usize> {
        let keys = match user_ids {
            Some(ids) => ids.iter().map(|id| credentials_key(slug, *id)).collect(),
            None => self.cache.keys(&credentials_prefix(slug)).await?,
        };
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.cache.del(&keys).await?;
        tracing::debug!(slug, removed, "invalidated cached credentials");
        Ok(removed)
    }
}
