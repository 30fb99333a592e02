pub mod builder;
pub mod cache;
pub mod client;
pub mod credentials;
#[cfg(feature = "mongodb")]
pub mod dbs;
pub mod error;
pub mod history;
pub mod memory;
pub mod models;
pub mod trait_client;
pub mod usage;

pub use builder::PersistClientBuilder;
pub use cache::{CacheClient, MemoryCache};
pub use client::{CacheTtls, PersistClient};
pub use credentials::{CredentialResolver, DEFAULT_CREDENTIALS_TTL};
pub use error::{PersistError, Result};
pub use history::{HistoryRequest, HistoryResolver, DEFAULT_THREAD_TTL};
pub use memory::MemoryPersistenceClient;
pub use models::{
    ActiveUser, BranchedThread, CommittedTurn, CredentialOwner, CredentialProjection,
    CredentialRecord, CredentialSummary, MessageQuery, MessageRole, NewCredential, NewMessage,
    OauthProvider, OauthScope, PartialMessage, StoredMessage, Tenant, Thread, ThreadCursor,
    ThreadQuery, ThreadTarget, TurnCommit, Usage, User,
};
pub use trait_client::PersistenceClient;
pub use usage::{UsageLedger, DEFAULT_USAGE_TTL};

#[cfg(feature = "mongodb")]
pub use dbs::mongo::MongoPersistenceClient;
