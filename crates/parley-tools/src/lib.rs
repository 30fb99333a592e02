pub mod error;
pub mod executor;
pub mod fanout;
pub mod handler;
pub mod providers;
pub mod registry;
pub mod tools;

pub use error::ToolError;
pub use executor::ToolExecutor;
pub use fanout::{fan_out, CredentialOutcome};
pub use handler::{parse_input, schema_tool, ToolHandler};
pub use providers::{DropboxApi, FileSearchApi, GmailApi, MailSearchApi, ProviderEndpoints};
pub use registry::ToolRegistry;
pub use tools::{DropboxSearchTool, GmailSearchTool, ListCredentialsTool};
