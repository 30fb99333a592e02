use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{PersistError, Result};
use crate::models::credential::{normalize_scopes, scope_key};
use crate::models::message::{now_millis, select_page, stamp_batch};
use crate::models::{
    ActiveUser, BranchedThread, CommittedTurn, CredentialOwner, CredentialRecord, MessageQuery,
    NewCredential, StoredMessage, Tenant, Thread, ThreadQuery, ThreadTarget, TurnCommit, Usage,
    User,
};
use crate::trait_client::PersistenceClient;

#[derive(Debug, Clone)]
struct CredentialRow {
    record_id: Uuid,
    user_id: Uuid,
    provider: crate::models::OauthProvider,
    scope: Vec<crate::models::OauthScope>,
    access_token: String,
    access_token_expires_at: Option<DateTime<Utc>>,
    #[allow(dead_code)]
    refresh_token: Option<String>,
    #[allow(dead_code)]
    refresh_token_expires_at: Option<DateTime<Utc>>,
    is_global: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Permission {
    credential_id: Uuid,
    user_id: Uuid,
    is_admin: bool,
}

#[derive(Debug, Default)]
struct Tables {
    tenants: HashMap<String, Tenant>,
    users: HashMap<Uuid, User>,
    credentials: HashMap<Uuid, CredentialRow>,
    permissions: Vec<Permission>,
    threads: HashMap<Uuid, Thread>,
    /// Per thread, ascending by `created_at`
    messages: HashMap<Uuid, Vec<StoredMessage>>,
}

impl Tables {
    fn record(&self, row: &CredentialRow) -> Option<CredentialRecord> {
        let owner = self.users.get(&row.user_id)?;
        Some(CredentialRecord {
            id: row.record_id,
            provider: row.provider,
            scope: row.scope.clone(),
            access_token: row.access_token.clone(),
            access_token_expires_at: row.access_token_expires_at,
            owner: CredentialOwner {
                id: owner.id,
                email: owner.email.clone(),
            },
            is_global: row.is_global,
            created_at: row.created_at,
        })
    }

    fn user_slug(&self, user_id: Uuid) -> Option<&str> {
        self.users.get(&user_id).map(|u| u.slug.as_str())
    }

    /// Thread visible under the tenant/owner predicate.
    fn authorized_thread(&self, thread_id: Uuid, slug: &str, user_id: Option<Uuid>) -> Option<&Thread> {
        let thread = self.threads.get(&thread_id)?;
        let owner_slug = self.user_slug(thread.user_id)?;
        if owner_slug != slug || user_id.map_or(false, |uid| uid != thread.user_id) {
            return None;
        }
        Some(thread)
    }

    fn can_manage_credential(&self, row: &CredentialRow, user: &ActiveUser) -> bool {
        if row.user_id == user.id {
            return true;
        }
        let same_tenant = self.user_slug(row.user_id) == Some(user.slug.as_str());
        if user.is_admin && same_tenant {
            return true;
        }
        self.permissions
            .iter()
            .any(|p| p.credential_id == row.record_id && p.user_id == user.id && p.is_admin)
    }
}

/// In-process store for tests and single-node development.
///
/// One `RwLock` guards all tables, so every operation is trivially atomic.
#[derive(Debug, Default)]
pub struct MemoryPersistenceClient {
    tables: RwLock<Tables>,
}

impl MemoryPersistenceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision or replace a tenant row.
    pub async fn insert_tenant(&self, tenant: Tenant) -> Result<()> {
        if !parley_types::validation::is_valid_tenant_slug(&tenant.slug) {
            return Err(PersistError::Validation(format!("invalid tenant slug '{}'", tenant.slug)));
        }
        if tenant.used_messages > tenant.message_limit {
            return Err(PersistError::ConstraintViolation(
                "used_messages exceeds message_limit".to_string(),
            ));
        }
        let mut tables = self.tables.write().await;
        tables.tenants.insert(tenant.slug.clone(), tenant);
        Ok(())
    }

    /// Provision a user; email is unique per tenant, case-insensitively.
    pub async fn insert_user(&self, user: User) -> Result<()> {
        if !parley_types::validation::is_valid_email(&user.email) {
            return Err(PersistError::Validation(format!("invalid email '{}'", user.email)));
        }
        let mut tables = self.tables.write().await;
        if !tables.tenants.contains_key(&user.slug) {
            return Err(PersistError::not_found(format!("tenant {}", user.slug)));
        }
        let email = user.email.to_lowercase();
        let duplicate = tables
            .users
            .values()
            .any(|u| u.id != user.id && u.slug == user.slug && u.email.to_lowercase() == email);
        if duplicate {
            return Err(PersistError::Conflict(format!("email {} already used in {}", user.email, user.slug)));
        }
        tables.users.insert(user.id, user);
        Ok(())
    }
}

#[async_trait]
impl PersistenceClient for MemoryPersistenceClient {
    async fn get_usage(&self, slug: &str) -> Result<Option<Usage>> {
        let tables = self.tables.read().await;
        Ok(tables.tenants.get(slug).map(Tenant::usage))
    }

    async fn increment_usage(&self, slug: &str) -> Result<Usage> {
        let mut tables = self.tables.write().await;
        let tenant = tables
            .tenants
            .get_mut(slug)
            .ok_or_else(|| PersistError::not_found(format!("tenant {}", slug)))?;

        if tenant.used_messages + 1 > tenant.message_limit {
            return Err(PersistError::ConstraintViolation(format!(
                "used_messages would exceed message_limit for {}",
                slug
            )));
        }
        tenant.used_messages += 1;
        Ok(tenant.usage())
    }

    async fn find_credentials(&self, user: &ActiveUser) -> Result<Vec<CredentialRecord>> {
        let tables = self.tables.read().await;

        let mut rows: Vec<&CredentialRow> = tables
            .credentials
            .values()
            .filter(|row| {
                if user.is_admin {
                    tables.user_slug(row.user_id) == Some(user.slug.as_str())
                } else {
                    row.user_id == user.id
                        || tables
                            .permissions
                            .iter()
                            .any(|p| p.credential_id == row.record_id && p.user_id == user.id)
                }
            })
            .collect();
        rows.sort_by_key(|row| (row.created_at, row.record_id));

        Ok(rows.into_iter().filter_map(|row| tables.record(row)).collect())
    }

    async fn upsert_credential(&self, credential: NewCredential) -> Result<CredentialRecord> {
        credential.validate()?;
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&credential.user_id) {
            return Err(PersistError::not_found(format!("user {}", credential.user_id)));
        }

        let key = scope_key(&credential.scope);
        let existing = tables
            .credentials
            .values()
            .find(|row| {
                row.user_id == credential.user_id
                    && row.provider == credential.provider
                    && scope_key(&row.scope) == key
            })
            .map(|row| (row.record_id, row.created_at));
        let (record_id, created_at) = existing.unwrap_or_else(|| (Uuid::new_v4(), now_millis()));

        let row = CredentialRow {
            record_id,
            user_id: credential.user_id,
            provider: credential.provider,
            scope: normalize_scopes(&credential.scope),
            access_token: credential.access_token,
            access_token_expires_at: credential.access_token_expires_at,
            refresh_token: credential.refresh_token,
            refresh_token_expires_at: credential.refresh_token_expires_at,
            is_global: credential.is_global,
            created_at,
        };
        let record = tables
            .record(&row)
            .ok_or_else(|| PersistError::Internal("credential owner vanished".to_string()))?;
        tables.credentials.insert(record_id, row);
        Ok(record)
    }

    async fn delete_credential(&self, credential_id: Uuid, user: &ActiveUser) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let allowed = tables
            .credentials
            .get(&credential_id)
            .map(|row| tables.can_manage_credential(row, user))
            .unwrap_or(false);
        if !allowed {
            return Ok(false);
        }
        tables.credentials.remove(&credential_id);
        tables.permissions.retain(|p| p.credential_id != credential_id);
        Ok(true)
    }

    async fn grant_credential(
        &self,
        credential_id: Uuid,
        grantee_id: Uuid,
        is_admin: bool,
        granted_by: &ActiveUser,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let allowed = tables
            .credentials
            .get(&credential_id)
            .map(|row| tables.can_manage_credential(row, granted_by))
            .unwrap_or(false);
        if !allowed || tables.user_slug(grantee_id) != Some(granted_by.slug.as_str()) {
            return Ok(false);
        }

        let existing = tables
            .permissions
            .iter()
            .position(|p| p.credential_id == credential_id && p.user_id == grantee_id);
        match existing {
            Some(index) => tables.permissions[index].is_admin = is_admin,
            None => tables.permissions.push(Permission {
                credential_id,
                user_id: grantee_id,
                is_admin,
            }),
        }
        Ok(true)
    }

    async fn list_threads(&self, user_id: Uuid, query: &ThreadQuery) -> Result<Vec<Thread>> {
        let tables = self.tables.read().await;
        let needle = query.search.as_ref().map(|s| s.to_lowercase());

        let mut threads: Vec<Thread> = tables
            .threads
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| query.cursor.map_or(true, |c| c.admits(t)))
            .filter(|t| match &needle {
                Some(needle) => t
                    .title
                    .as_ref()
                    .map_or(false, |title| title.to_lowercase().contains(needle.as_str())),
                None => true,
            })
            .cloned()
            .collect();
        threads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        threads.truncate(query.limit.max(0) as usize);
        Ok(threads)
    }

    async fn rename_thread(&self, thread_id: Uuid, user_id: Uuid, title: &str) -> Result<Option<Thread>> {
        let mut tables = self.tables.write().await;
        match tables.threads.get_mut(&thread_id) {
            Some(thread) if thread.user_id == user_id => {
                thread.title = Some(title.to_string());
                Ok(Some(thread.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_threads(&self, thread_ids: &[Uuid], user_id: Uuid) -> Result<Vec<Uuid>> {
        let mut tables = self.tables.write().await;
        let mut deleted = Vec::new();
        for thread_id in thread_ids {
            let owned = tables
                .threads
                .get(thread_id)
                .map_or(false, |t| t.user_id == user_id);
            if owned {
                tables.threads.remove(thread_id);
                tables.messages.remove(thread_id);
                deleted.push(*thread_id);
            }
        }
        Ok(deleted)
    }

    async fn get_thread_messages(&self, thread_id: Uuid, query: &MessageQuery) -> Result<Vec<StoredMessage>> {
        let tables = self.tables.read().await;
        if tables
            .authorized_thread(thread_id, &query.slug, query.user_id)
            .is_none()
        {
            return Ok(Vec::new());
        }
        let messages = tables
            .messages
            .get(&thread_id)
            .map(|rows| select_page(rows, query.cursor, query.limit))
            .unwrap_or_default();
        Ok(messages)
    }

    async fn commit_turn(&self, commit: TurnCommit) -> Result<CommittedTurn> {
        let mut tables = self.tables.write().await;
        if tables.user_slug(commit.user_id) != Some(commit.slug.as_str()) {
            return Err(PersistError::not_found(format!("user {}", commit.user_id)));
        }

        // Validate everything before mutating so a failure leaves no trace
        let (thread, created_thread) = match &commit.target {
            ThreadTarget::Existing(thread_id) => {
                let thread = tables
                    .authorized_thread(*thread_id, &commit.slug, Some(commit.user_id))
                    .cloned()
                    .ok_or_else(|| PersistError::not_found(format!("thread {}", thread_id)))?;
                (thread, false)
            }
            ThreadTarget::New { title } => {
                if commit.truncate_from.is_some() {
                    return Err(PersistError::Validation(
                        "cannot edit a message in a new thread".to_string(),
                    ));
                }
                let thread = Thread {
                    id: Uuid::new_v4(),
                    user_id: commit.user_id,
                    title: Some(title.clone()),
                    created_at: now_millis(),
                };
                (thread, true)
            }
        };

        let mut rows = tables.messages.get(&thread.id).cloned().unwrap_or_default();
        if let Some(edited_id) = commit.truncate_from {
            let edited_at = rows
                .iter()
                .find(|m| m.id == edited_id)
                .map(|m| m.created_at)
                .ok_or_else(|| PersistError::not_found(format!("message {}", edited_id)))?;
            rows.retain(|m| m.id != edited_id && m.created_at < edited_at);
        }

        let previous_last = rows.last().map(|m| m.id);
        let stamps = stamp_batch(rows.last().map(|m| m.created_at), now_millis(), commit.messages.len());
        let inserted: Vec<StoredMessage> = commit
            .messages
            .into_iter()
            .zip(stamps)
            .map(|(message, created_at)| StoredMessage {
                id: Uuid::new_v4(),
                thread_id: thread.id,
                role: message.role,
                content: message.content,
                extra_reason: message.extra_reason,
                created_at,
            })
            .collect();
        rows.extend(inserted.iter().cloned());

        if created_thread {
            tables.threads.insert(thread.id, thread.clone());
        }
        tables.messages.insert(thread.id, rows);

        Ok(CommittedTurn {
            thread,
            created_thread,
            messages: inserted,
            previous_last,
        })
    }

    async fn branch_off(&self, message_id: Uuid, user: &ActiveUser) -> Result<Option<BranchedThread>> {
        let mut tables = self.tables.write().await;

        let pivot = tables
            .messages
            .values()
            .flat_map(|rows| rows.iter())
            .find(|m| m.id == message_id)
            .cloned();
        let Some(pivot) = pivot else {
            return Ok(None);
        };
        let Some(source) = tables
            .authorized_thread(pivot.thread_id, &user.slug, Some(user.id))
            .cloned()
        else {
            return Ok(None);
        };

        let thread = Thread {
            id: Uuid::new_v4(),
            user_id: user.id,
            title: source.title.clone(),
            created_at: now_millis(),
        };
        let copies: Vec<StoredMessage> = tables
            .messages
            .get(&source.id)
            .map(|rows| {
                rows.iter()
                    .filter(|m| m.id == pivot.id || m.created_at <= pivot.created_at)
                    .map(|m| StoredMessage {
                        id: Uuid::new_v4(),
                        thread_id: thread.id,
                        ..m.clone()
                    })
                    .collect()
            })
            .unwrap_or_default();

        tables.threads.insert(thread.id, thread.clone());
        tables.messages.insert(thread.id, copies.clone());

        Ok(Some(BranchedThread {
            thread,
            messages: copies,
        }))
    }
}
