use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ActiveUser, BranchedThread, CommittedTurn, CredentialRecord, MessageQuery, NewCredential,
    StoredMessage, Thread, ThreadQuery, TurnCommit, Usage,
};

/// Durable store contract.
///
/// Every read and write carries its authorization predicate so that a row the
/// caller may not see is indistinguishable from a row that does not exist.
/// Multi-row writes (`commit_turn`, `branch_off`, `delete_threads`) are atomic.
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    async fn get_usage(&self, slug: &str) -> Result<Option<Usage>>;

    /// Atomic `used = used + 1`, returning the post-increment pair. Fails
    /// with `ConstraintViolation` when it would push `used` past `limit`.
    async fn increment_usage(&self, slug: &str) -> Result<Usage>;

    /// Non-admins: own credentials plus those shared with them.
    /// Admins: every credential of every user in their tenant.
    async fn find_credentials(&self, user: &ActiveUser) -> Result<Vec<CredentialRecord>>;

    async fn upsert_credential(&self, credential: NewCredential) -> Result<CredentialRecord>;

    /// Allowed for the owner, a tenant admin, or an admin-level grantee.
    async fn delete_credential(&self, credential_id: Uuid, user: &ActiveUser) -> Result<bool>;

    /// Share a credential with another user of the same tenant.
    async fn grant_credential(
        &self,
        credential_id: Uuid,
        grantee_id: Uuid,
        is_admin: bool,
        granted_by: &ActiveUser,
    ) -> Result<bool>;

    async fn list_threads(&self, user_id: Uuid, query: &ThreadQuery) -> Result<Vec<Thread>>;

    async fn rename_thread(&self, thread_id: Uuid, user_id: Uuid, title: &str) -> Result<Option<Thread>>;

    /// Deletes the caller's threads among `thread_ids` with their messages and
    /// returns the ids actually removed.
    async fn delete_threads(&self, thread_ids: &[Uuid], user_id: Uuid) -> Result<Vec<Uuid>>;

    /// Ascending page of a thread, empty when the predicate fails.
    async fn get_thread_messages(&self, thread_id: Uuid, query: &MessageQuery) -> Result<Vec<StoredMessage>>;

    /// Edit truncation, thread creation and batch insert in one transaction.
    async fn commit_turn(&self, commit: TurnCommit) -> Result<CommittedTurn>;

    /// Copies the pivot's thread prefix (pivot included) into a new thread
    /// owned by the caller. `None` when the pivot is not the caller's.
    async fn branch_off(&self, message_id: Uuid, user: &ActiveUser) -> Result<Option<BranchedThread>>;
}
