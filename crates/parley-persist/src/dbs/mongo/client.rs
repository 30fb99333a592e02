use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::error::TRANSIENT_TRANSACTION_ERROR;
use mongodb::options::IndexOptions;
use mongodb::{Client, ClientSession, IndexModel};
use uuid::Uuid;

use super::models::{to_bson_datetime, MongoMessage, MongoThread};
use super::repositories::{
    CredentialRepository, MessageRepository, TenantRepository, ThreadRepository, UserRepository,
};
use crate::error::{PersistError, Result};
use crate::models::message::{now_millis, stamp_batch};
use crate::models::{
    ActiveUser, BranchedThread, CommittedTurn, CredentialRecord, MessageQuery, NewCredential,
    StoredMessage, Tenant, Thread, ThreadQuery, ThreadTarget, TurnCommit, Usage, User,
};
use crate::trait_client::PersistenceClient;

/// Commits racing on one thread conflict on its revision; the loser retries
/// on a fresh snapshot.
const MAX_COMMIT_ATTEMPTS: usize = 3;

fn is_transient(error: &PersistError) -> bool {
    matches!(error, PersistError::Database(e) if e.contains_label(TRANSIENT_TRANSACTION_ERROR))
}

/// MongoDB-backed store. Multi-document writes run in transactions, which
/// needs a replica set (a single-node one is enough).
#[derive(Clone)]
pub struct MongoPersistenceClient {
    client: Client,
    database: String,
    tenants: TenantRepository,
    users: UserRepository,
    credentials: CredentialRepository,
    threads: ThreadRepository,
    messages: MessageRepository,
}

impl MongoPersistenceClient {
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;
        tracing::info!(database = %database, "connected to MongoDB");

        Ok(Self {
            tenants: TenantRepository::new(&client, database),
            users: UserRepository::new(&client, database),
            credentials: CredentialRepository::new(&client, database),
            threads: ThreadRepository::new(&client, database),
            messages: MessageRepository::new(&client, database),
            database: database.to_string(),
            client,
        })
    }

    /// Creates the usage validator and the indexes the queries rely on.
    /// Safe to call on every start.
    pub async fn ensure_schema(&self) -> Result<()> {
        let db = self.client.database(&self.database);
        let validator = doc! { "$expr": { "$lte": ["$used_messages", "$message_limit"] } };

        let existing = db.list_collection_names().await?;
        if existing.iter().any(|name| name == "tenants") {
            db.run_command(doc! { "collMod": "tenants", "validator": validator }).await?;
        } else {
            db.create_collection("tenants").validator(validator).await?;
        }

        let unique = || IndexOptions::builder().unique(true).build();
        db.collection::<mongodb::bson::Document>("users")
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "slug": 1, "email_lower": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;

        let credentials = db.collection::<mongodb::bson::Document>("credentials");
        credentials
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "provider": 1, "scope_key": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        credentials
            .create_index(IndexModel::builder().keys(doc! { "owner_slug": 1 }).build())
            .await?;
        credentials
            .create_index(IndexModel::builder().keys(doc! { "shared_with.user_id": 1 }).build())
            .await?;

        db.collection::<mongodb::bson::Document>("threads")
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1, "created_at": -1 }).build())
            .await?;
        db.collection::<mongodb::bson::Document>("messages")
            .create_index(IndexModel::builder().keys(doc! { "thread_id": 1, "created_at": 1 }).build())
            .await?;

        tracing::info!(database = %self.database, "MongoDB schema ensured");
        Ok(())
    }

    pub async fn insert_tenant(&self, tenant: Tenant) -> Result<()> {
        if !parley_types::validation::is_valid_tenant_slug(&tenant.slug) {
            return Err(PersistError::Validation(format!("invalid tenant slug '{}'", tenant.slug)));
        }
        self.tenants.upsert(tenant).await
    }

    pub async fn insert_user(&self, user: User) -> Result<()> {
        if !parley_types::validation::is_valid_email(&user.email) {
            return Err(PersistError::Validation(format!("invalid email '{}'", user.email)));
        }
        self.users.insert(user).await
    }

    async fn finish<T>(&self, mut session: ClientSession, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                session.commit_transaction().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = session.abort_transaction().await {
                    tracing::warn!(error = %abort, "failed to abort transaction");
                }
                Err(e)
            }
        }
    }

    async fn begin(&self) -> Result<ClientSession> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        Ok(session)
    }

    async fn commit_turn_in(&self, commit: TurnCommit, session: &mut ClientSession) -> Result<CommittedTurn> {
        let owner = self
            .users
            .find(commit.user_id)
            .await?
            .filter(|u| u.slug == commit.slug)
            .ok_or_else(|| PersistError::not_found(format!("user {}", commit.user_id)))?;

        let (thread, created_thread) = match &commit.target {
            ThreadTarget::Existing(thread_id) => {
                let filter = ThreadRepository::authorized(*thread_id, &owner.slug, Some(commit.user_id));
                let thread = self
                    .threads
                    .find_authorized(filter, session)
                    .await?
                    .ok_or_else(|| PersistError::not_found(format!("thread {}", thread_id)))?;
                self.threads.bump_revision(*thread_id, session).await?;
                (Thread::try_from(thread)?, false)
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
                self.threads
                    .insert(&MongoThread::from_thread(&thread, &owner.slug), session)
                    .await?;
                (thread, true)
            }
        };

        if let Some(edited_id) = commit.truncate_from {
            let edited = self
                .messages
                .find_in_thread(thread.id, edited_id, session)
                .await?
                .ok_or_else(|| PersistError::not_found(format!("message {}", edited_id)))?;
            self.messages.truncate_from(thread.id, &edited, session).await?;
        }

        let last = match self.messages.latest(thread.id, session).await? {
            Some(latest) => Some(StoredMessage::try_from(latest)?),
            None => None,
        };
        let stamps = stamp_batch(last.as_ref().map(|m| m.created_at), now_millis(), commit.messages.len());
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

        let rows: Vec<MongoMessage> = inserted
            .iter()
            .map(|m| MongoMessage::from_stored(m, commit.user_id, &owner.slug))
            .collect();
        self.messages.insert_many(&rows, session).await?;

        Ok(CommittedTurn {
            thread,
            created_thread,
            messages: inserted,
            previous_last: last.map(|m| m.id),
        })
    }

    async fn branch_off_in(
        &self,
        message_id: Uuid,
        user: &ActiveUser,
        session: &mut ClientSession,
    ) -> Result<Option<BranchedThread>> {
        let Some(pivot) = self
            .messages
            .find_owned(message_id, &user.slug, user.id, session)
            .await?
        else {
            return Ok(None);
        };
        let source_id = Uuid::parse_str(&pivot.thread_id)
            .map_err(|e| PersistError::Internal(format!("stored thread id: {}", e)))?;
        let filter = ThreadRepository::authorized(source_id, &user.slug, Some(user.id));
        let Some(source) = self.threads.find_authorized(filter, session).await? else {
            return Ok(None);
        };

        let thread = Thread {
            id: Uuid::new_v4(),
            user_id: user.id,
            title: source.title,
            created_at: now_millis(),
        };
        self.threads
            .insert(&MongoThread::from_thread(&thread, &user.slug), session)
            .await?;

        let copies = self
            .messages
            .prefix(&pivot, session)
            .await?
            .into_iter()
            .map(|row| {
                let original = StoredMessage::try_from(row)?;
                Ok(StoredMessage {
                    id: Uuid::new_v4(),
                    thread_id: thread.id,
                    ..original
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let rows: Vec<MongoMessage> = copies
            .iter()
            .map(|m| MongoMessage::from_stored(m, user.id, &user.slug))
            .collect();
        self.messages.insert_many(&rows, session).await?;

        Ok(Some(BranchedThread {
            thread,
            messages: copies,
        }))
    }

    async fn delete_threads_in(
        &self,
        thread_ids: &[Uuid],
        user_id: Uuid,
        session: &mut ClientSession,
    ) -> Result<Vec<Uuid>> {
        let deleted = self.threads.delete_owned(thread_ids, user_id, session).await?;
        if !deleted.is_empty() {
            self.messages.delete_for_threads(&deleted, session).await?;
        }
        deleted
            .iter()
            .map(|id| {
                Uuid::parse_str(id).map_err(|e| PersistError::Internal(format!("stored thread id: {}", e)))
            })
            .collect()
    }
}

#[async_trait]
impl PersistenceClient for MongoPersistenceClient {
    async fn get_usage(&self, slug: &str) -> Result<Option<Usage>> {
        self.tenants.get_usage(slug).await
    }

    async fn increment_usage(&self, slug: &str) -> Result<Usage> {
        self.tenants.increment(slug).await
    }

    async fn find_credentials(&self, user: &ActiveUser) -> Result<Vec<CredentialRecord>> {
        self.credentials
            .find_visible(user)
            .await?
            .into_iter()
            .map(CredentialRecord::try_from)
            .collect()
    }

    async fn upsert_credential(&self, credential: NewCredential) -> Result<CredentialRecord> {
        credential.validate()?;
        let owner = self
            .users
            .find(credential.user_id)
            .await?
            .ok_or_else(|| PersistError::not_found(format!("user {}", credential.user_id)))?;
        let row = self.credentials.upsert(credential, &owner).await?;
        CredentialRecord::try_from(row)
    }

    async fn delete_credential(&self, credential_id: Uuid, user: &ActiveUser) -> Result<bool> {
        self.credentials.delete(credential_id, user).await
    }

    async fn grant_credential(
        &self,
        credential_id: Uuid,
        grantee_id: Uuid,
        is_admin: bool,
        granted_by: &ActiveUser,
    ) -> Result<bool> {
        let same_tenant = self
            .users
            .find(grantee_id)
            .await?
            .map_or(false, |u| u.slug == granted_by.slug);
        if !same_tenant {
            return Ok(false);
        }
        self.credentials
            .grant(credential_id, grantee_id, is_admin, granted_by)
            .await
    }

    async fn list_threads(&self, user_id: Uuid, query: &ThreadQuery) -> Result<Vec<Thread>> {
        self.threads
            .list(user_id, query)
            .await?
            .into_iter()
            .map(Thread::try_from)
            .collect()
    }

    async fn rename_thread(&self, thread_id: Uuid, user_id: Uuid, title: &str) -> Result<Option<Thread>> {
        self.threads
            .rename(thread_id, user_id, title)
            .await?
            .map(Thread::try_from)
            .transpose()
    }

    async fn delete_threads(&self, thread_ids: &[Uuid], user_id: Uuid) -> Result<Vec<Uuid>> {
        let mut session = self.begin().await?;
        let result = self.delete_threads_in(thread_ids, user_id, &mut session).await;
        self.finish(session, result).await
    }

    async fn get_thread_messages(&self, thread_id: Uuid, query: &MessageQuery) -> Result<Vec<StoredMessage>> {
        self.messages
            .page(thread_id, query)
            .await?
            .into_iter()
            .map(StoredMessage::try_from)
            .collect()
    }

    async fn commit_turn(&self, commit: TurnCommit) -> Result<CommittedTurn> {
        let mut attempt = 1;
        loop {
            let mut session = self.begin().await?;
            let result = self.commit_turn_in(commit.clone(), &mut session).await;
            match self.finish(session, result).await {
                Err(e) if is_transient(&e) && attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::debug!(attempt, error = %e, "turn commit conflicted, retrying");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn branch_off(&self, message_id: Uuid, user: &ActiveUser) -> Result<Option<BranchedThread>> {
        let mut session = self.begin().await?;
        let result = self.branch_off_in(message_id, user, &mut session).await;
        self.finish(session, result).await
    }
}
