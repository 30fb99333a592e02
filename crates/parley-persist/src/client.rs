use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::cache::CacheClient;
use crate::credentials::{CredentialResolver, DEFAULT_CREDENTIALS_TTL};
use crate::error::{PersistError, Result};
use crate::history::{HistoryResolver, DEFAULT_THREAD_TTL};
use crate::models::{ActiveUser, BranchedThread, CredentialRecord, NewCredential, Thread, ThreadQuery};
use crate::trait_client::PersistenceClient;
use crate::usage::{UsageLedger, DEFAULT_USAGE_TTL};

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub credentials: Duration,
    pub threads: Duration,
    pub usage: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            credentials: DEFAULT_CREDENTIALS_TTL,
            threads: DEFAULT_THREAD_TTL,
            usage: DEFAULT_USAGE_TTL,
        }
    }
}

/// Store plus cache, with the services that keep the two coherent.
///
/// Writes that change what a cached key would return go through here so the
/// matching entries are invalidated.
#[derive(Clone)]
pub struct PersistClient {
    store: Arc<dyn PersistenceClient>,
    cache: Arc<dyn CacheClient>,
    history: HistoryResolver,
    credentials: CredentialResolver,
    usage: UsageLedger,
}

impl PersistClient {
    pub fn new(store: Arc<dyn PersistenceClient>, cache: Arc<dyn CacheClient>, ttls: CacheTtls) -> Self {
        Self {
            history: HistoryResolver::new(Arc::clone(&store), Arc::clone(&cache), ttls.threads),
            credentials: CredentialResolver::new(Arc::clone(&store), Arc::clone(&cache), ttls.credentials),
            usage: UsageLedger::new(Arc::clone(&store), Arc::clone(&cache), ttls.usage),
            store,
            cache,
        }
    }

    pub fn store(&self) -> &Arc<dyn PersistenceClient> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn CacheClient> {
        &self.cache
    }

    pub fn history(&self) -> &HistoryResolver {
        &self.history
    }

    pub fn credentials(&self) -> &CredentialResolver {
        &self.credentials
    }

    pub fn usage(&self) -> &UsageLedger {
        &self.usage
    }

    pub async fn list_threads(&self, user: &ActiveUser, query: &ThreadQuery) -> Result<Vec<Thread>> {
        self.store.list_threads(user.id, query).await
    }

    pub async fn rename_thread(&self, user: &ActiveUser, thread_id: Uuid, title: &str) -> Result<Thread> {
        let title = title.trim();
        if !parley_types::validation::is_valid_thread_title(title) {
            return Err(PersistError::Validation(format!(
                "title must be {}..={} characters",
                parley_types::validation::THREAD_TITLE_MIN,
                parley_types::validation::THREAD_TITLE_MAX
            )));
        }
        self.store
            .rename_thread(thread_id, user.id, title)
            .await?
            .ok_or_else(|| PersistError::not_found(format!("thread {}", thread_id)))
    }

    pub async fn delete_threads(&self, user: &ActiveUser, thread_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let deleted = self.store.delete_threads(thread_ids, user.id).await?;
        self.history.invalidate(&deleted).await;
        tracing::info!(user_id = %user.id, count = deleted.len(), "deleted threads");
        Ok(deleted)
    }

    pub async fn branch_off(&self, user: &ActiveUser, message_id: Uuid) -> Result<BranchedThread> {
        let branched = self
            .store
            .branch_off(message_id, user)
            .await?
            .ok_or_else(|| PersistError::not_found(format!("message {}", message_id)))?;
        tracing::info!(
            source_message = %message_id,
            thread_id = %branched.thread.id,
            copied = branched.messages.len(),
            "branched thread"
        );
        Ok(branched)
    }

    /// Credential writes invalidate the whole tenant: grantees and admins
    /// cache the same row under their own keys.
    pub async fn upsert_credential(&self, owner: &ActiveUser, credential: NewCredential) -> Result<CredentialRecord> {
        if credential.user_id != owner.id {
            return Err(PersistError::Validation("credential must belong to the caller".to_string()));
        }
        let record = self.store.upsert_credential(credential).await?;
        self.credentials.invalidate(&owner.slug, None).await?;
        Ok(record)
    }

    pub async fn delete_credential(&self, user: &ActiveUser, credential_id: Uuid) -> Result<()> {
        if !self.store.delete_credential(credential_id, user).await? {
            return Err(PersistError::not_found(format!("credential {}", credential_id)));
        }
        self.credentials.invalidate(&user.slug, None).await?;
        Ok(())
    }

    pub async fn grant_credential(
        &self,
        user: &ActiveUser,
        credential_id: Uuid,
        grantee_id: Uuid,
        is_admin: bool,
    ) -> Result<()> {
        if !self
            .store
            .grant_credential(credential_id, grantee_id, is_admin, user)
            .await?
        {
            return Err(PersistError::not_found(format!("credential {}", credential_id)));
        }
        self.credentials
            .invalidate(&user.slug, Some(&[grantee_id]))
            .await?;
        Ok(())
    }
}
