use async_trait::async_trait;
use parley_llm::Tool;
use parley_persist::{CredentialOwner, CredentialProjection, OauthProvider, OauthScope};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ToolError};
use crate::handler::{parse_input, schema_tool, ToolHandler};

pub const NAME: &str = "list_credentials";

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListCredentialsInput {
    /// Limit the search to a set of providers.
    pub providers: Option<Vec<OauthProvider>>,
    /// Limit the search to specific scopes.
    pub scopes: Option<Vec<OauthScope>>,
    /// Limit the search to specific credential owners (based on their email).
    pub emails: Option<Vec<String>>,
}

/// Credential as shown to the model; the token stays server-side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListedCredential<'a> {
    provider: OauthProvider,
    scope: &'a [OauthScope],
    owned_by: &'a CredentialOwner,
}

/// Lists the credentials the caller can act through.
pub struct ListCredentialsTool {
    credentials: Vec<CredentialProjection>,
}

impl ListCredentialsTool {
    pub fn new(credentials: Vec<CredentialProjection>) -> Self {
        Self { credentials }
    }

    fn matches(credential: &CredentialProjection, input: &ListCredentialsInput) -> bool {
        let provider_ok = match &input.providers {
            Some(providers) if !providers.is_empty() => providers.contains(&credential.provider),
            _ => true,
        };
        let scope_ok = match &input.scopes {
            Some(scopes) if !scopes.is_empty() => scopes.iter().any(|s| credential.has_scope(*s)),
            _ => true,
        };
        let owner_ok = match &input.emails {
            Some(emails) if !emails.is_empty() => emails
                .iter()
                .any(|e| e.eq_ignore_ascii_case(&credential.owned_by.email)),
            _ => true,
        };
        provider_ok && scope_ok && owner_ok
    }
}

#[async_trait]
impl ToolHandler for ListCredentialsTool {
    fn definition(&self) -> Tool {
        schema_tool::<ListCredentialsInput>(
            NAME,
            "List and search the user's available credentials. Admins see every credential of their \
             tenant, everyone else sees their own and those shared with them.",
        )
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let input: ListCredentialsInput = parse_input(arguments)?;
        if let Some(bad) = input
            .emails
            .iter()
            .flatten()
            .find(|e| !parley_types::validation::is_valid_email(e))
        {
            return Err(ToolError::InvalidArguments(format!("'{}' is not an email address", bad)));
        }

        let listed: Vec<ListedCredential<'_>> = self
            .credentials
            .iter()
            .filter(|c| Self::matches(c, &input))
            .map(|c| ListedCredential {
                provider: c.provider,
                scope: &c.scope,
                owned_by: &c.owned_by,
            })
            .collect();
        Ok(serde_json::to_value(listed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn credential(provider: OauthProvider, scope: Vec<OauthScope>, email: &str) -> CredentialProjection {
        CredentialProjection {
            provider,
            scope,
            access_token: "secret".to_string(),
            owned_by: CredentialOwner {
                id: Uuid::new_v4(),
                email: email.to_string(),
            },
        }
    }

    fn tool() -> ListCredentialsTool {
        ListCredentialsTool::new(vec![
            credential(OauthProvider::Google, vec![OauthScope::Gmail, OauthScope::Drive], "a@x.test"),
            credential(OauthProvider::Dropbox, vec![OauthScope::Dropbox], "b@x.test"),
        ])
    }

    #[tokio::test]
    async fn test_lists_everything_without_filters() {
        let out = tool().call(json!({})).await.unwrap();
        let listed = out.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].get("accessToken").is_none());
        assert_eq!(listed[0]["ownedBy"]["email"], "a@x.test");
    }

    #[tokio::test]
    async fn test_filters_combine() {
        let out = tool()
            .call(json!({ "scopes": ["gmail", "dropbox"], "emails": ["B@x.test"] }))
            .await
            .unwrap();
        let listed = out.as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["provider"], "dropbox");
    }

    #[tokio::test]
    async fn test_rejects_malformed_email() {
        let err = tool().call(json!({ "emails": ["nope"] })).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_rejects_unknown_provider() {
        let err = tool().call(json!({ "providers": ["myspace"] })).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
