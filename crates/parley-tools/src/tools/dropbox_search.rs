use std::sync::Arc;

use async_trait::async_trait;
use parley_llm::Tool;
use parley_persist::CredentialProjection;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, ToolError};
use crate::fanout::fan_out;
use crate::handler::{parse_input, schema_tool, ToolHandler};
use crate::providers::dropbox::{FileCategory, FileSearch};
use crate::providers::FileSearchApi;

pub const NAME: &str = "dropbox_files_search";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DropboxSearchInput {
    /// The string to search for. May match across multiple fields based on the request arguments.
    pub query: String,
    /// Scopes the search to a path in the user's Dropbox. Searches the entire Dropbox if not specified.
    pub path: Option<String>,
    /// Restricts search to only the extensions specified.
    pub file_extensions: Option<Vec<String>>,
    /// Restricts search to only the categories specified.
    pub file_categories: Option<Vec<FileCategory>>,
}

/// Searches every Dropbox account the caller can use, one call per credential.
pub struct DropboxSearchTool {
    api: Arc<dyn FileSearchApi>,
    credentials: Vec<CredentialProjection>,
}

impl DropboxSearchTool {
    pub fn new(api: Arc<dyn FileSearchApi>, credentials: Vec<CredentialProjection>) -> Self {
        Self { api, credentials }
    }
}

#[async_trait]
impl ToolHandler for DropboxSearchTool {
    fn definition(&self) -> Tool {
        schema_tool::<DropboxSearchInput>(NAME, "Search for files across the connected Dropbox accounts.")
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let input: DropboxSearchInput = parse_input(arguments)?;
        if input.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }
        let search = FileSearch {
            query: input.query,
            path: input.path,
            file_extensions: input.file_extensions,
            file_categories: input.file_categories,
        };

        let outcomes = fan_out(NAME, &self.credentials, |credential| {
            self.api.search_files(&credential.access_token, &search)
        })
        .await;
        Ok(serde_json::to_value(outcomes)?)
    }
}
