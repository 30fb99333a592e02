use std::sync::Arc;

use parley_persist::{ActiveUser, CredentialProjection, CredentialResolver, OauthScope};
use uuid::Uuid;

use crate::executor::ToolExecutor;
use crate::providers::{DropboxApi, FileSearchApi, GmailApi, MailSearchApi, ProviderEndpoints};
use crate::tools::{DropboxSearchTool, GmailSearchTool, ListCredentialsTool};

/// Builds the per-turn tool set from the caller's credentials.
///
/// A provider tool is registered only when at least one resolved credential
/// carries its scope, and it only ever sees those credentials.
#[derive(Clone)]
pub struct ToolRegistry {
    credentials: CredentialResolver,
    file_search: Arc<dyn FileSearchApi>,
    mail_search: Arc<dyn MailSearchApi>,
}

impl ToolRegistry {
    pub fn new(credentials: CredentialResolver, endpoints: &ProviderEndpoints) -> Self {
        let http = reqwest::Client::new();
        Self {
            credentials,
            file_search: Arc::new(DropboxApi::new(http.clone()).with_base_url(&endpoints.dropbox)),
            mail_search: Arc::new(GmailApi::new(http).with_base_url(&endpoints.gmail)),
        }
    }

    pub fn with_file_search(mut self, api: Arc<dyn FileSearchApi>) -> Self {
        self.file_search = api;
        self
    }

    pub fn with_mail_search(mut self, api: Arc<dyn MailSearchApi>) -> Self {
        self.mail_search = api;
        self
    }

    pub async fn build_tools(
        &self,
        user: &ActiveUser,
        thread_id: Option<Uuid>,
    ) -> parley_persist::Result<ToolExecutor> {
        let credentials = self.credentials.resolve(user).await?;
        let executor = self.tools_for(credentials);
        tracing::debug!(
            user_id = %user.id,
            thread_id = ?thread_id,
            tools = ?executor.names(),
            "built tool set"
        );
        Ok(executor)
    }

    /// Tool set for an already-resolved credential list.
    pub fn tools_for(&self, credentials: Vec<CredentialProjection>) -> ToolExecutor {
        let with_scope = |scope: OauthScope| -> Vec<CredentialProjection> {
            credentials
                .iter()
                .filter(|c| c.has_scope(scope))
                .cloned()
                .collect()
        };
        let dropbox = with_scope(OauthScope::Dropbox);
        let gmail = with_scope(OauthScope::Gmail);

        let mut executor = ToolExecutor::new();
        executor.register(Arc::new(ListCredentialsTool::new(credentials)));
        if !dropbox.is_empty() {
            executor.register(Arc::new(DropboxSearchTool::new(Arc::clone(&self.file_search), dropbox)));
        }
        if !gmail.is_empty() {
            executor.register(Arc::new(GmailSearchTool::new(Arc::clone(&self.mail_search), gmail)));
        }
        executor
    }
}
