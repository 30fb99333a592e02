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
use crate::providers::MailSearchApi;

pub const NAME: &str = "gmail_search";

const DEFAULT_MAX_RESULTS: u32 = 20;
const MAX_RESULTS_CAP: u32 = 100;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GmailSearchInput {
    /// The search query to find relevant emails in Gmail. Supports Gmail search operators.
    pub query: String,
    /// Maximum number of emails per account (default 20, at most 100).
    pub max_results: Option<u32>,
}

/// Searches every Gmail mailbox the caller can use, one call per credential.
pub struct GmailSearchTool {
    api: Arc<dyn MailSearchApi>,
    credentials: Vec<CredentialProjection>,
}

impl GmailSearchTool {
    pub fn new(api: Arc<dyn MailSearchApi>, credentials: Vec<CredentialProjection>) -> Self {
        Self { api, credentials }
    }
}

#[async_trait]
impl ToolHandler for GmailSearchTool {
    fn definition(&self) -> Tool {
        schema_tool::<GmailSearchInput>(NAME, "Search emails across the connected Gmail accounts.")
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let input: GmailSearchInput = parse_input(arguments)?;
        if input.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }
        let max_results = input
            .max_results
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_CAP);

        let query = input.query.as_str();
        let outcomes = fan_out(NAME, &self.credentials, |credential| {
            self.api.search_mail(&credential.access_token, query, max_results)
        })
        .await;
        Ok(serde_json::to_value(outcomes)?)
    }
}
