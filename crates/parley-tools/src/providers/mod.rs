pub mod dropbox;
pub mod gmail;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ToolError};

pub use dropbox::{DropboxApi, FileSearch, DROPBOX_API_BASE};
pub use gmail::{GmailApi, GMAIL_API_BASE};

/// File search against a storage provider, on behalf of one credential.
#[async_trait]
pub trait FileSearchApi: Send + Sync {
    async fn search_files(&self, access_token: &str, request: &FileSearch) -> Result<Value>;
}

/// Mail search against a mailbox provider, on behalf of one credential.
#[async_trait]
pub trait MailSearchApi: Send + Sync {
    async fn search_mail(&self, access_token: &str, query: &str, max_results: u32) -> Result<Value>;
}

/// Base URLs of the provider APIs; overridable for tests and proxies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    #[serde(default = "default_dropbox")]
    pub dropbox: String,
    #[serde(default = "default_gmail")]
    pub gmail: String,
}

fn default_dropbox() -> String {
    DROPBOX_API_BASE.to_string()
}

fn default_gmail() -> String {
    GMAIL_API_BASE.to_string()
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            dropbox: default_dropbox(),
            gmail: default_gmail(),
        }
    }
}

/// Turn a non-success response into a typed provider error.
async fn check_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ToolError::Provider {
        provider: provider.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn transport(provider: &str) -> impl Fn(reqwest::Error) -> ToolError + '_ {
    move |source| ToolError::Transport {
        provider: provider.to_string(),
        source,
    }
}
