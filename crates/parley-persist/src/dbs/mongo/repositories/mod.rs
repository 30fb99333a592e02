pub mod credential;
pub mod message;
pub mod tenant;
pub mod thread;
pub mod user;

pub use credential::CredentialRepository;
pub use message::MessageRepository;
pub use tenant::TenantRepository;
pub use thread::ThreadRepository;
pub use user::UserRepository;
