pub mod dropbox_search;
pub mod gmail_search;
pub mod list_credentials;

pub use dropbox_search::DropboxSearchTool;
pub use gmail_search::GmailSearchTool;
pub use list_credentials::ListCredentialsTool;
