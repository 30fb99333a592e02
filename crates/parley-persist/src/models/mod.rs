pub mod tenant;
pub mod user;
pub mod credential;
pub mod thread;
pub mod message;

pub use tenant::{Tenant, Usage};
pub use user::{ActiveUser, User};
pub use credential::{
    CredentialOwner, CredentialProjection, CredentialRecord, CredentialSummary, NewCredential,
    OauthProvider, OauthScope,
};
pub use thread::{Thread, ThreadCursor, ThreadQuery, ThreadTarget};
pub use message::{
    BranchedThread, CommittedTurn, MessageQuery, MessageRole, NewMessage, PartialMessage,
    StoredMessage, TurnCommit,
};
