use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OauthProvider {
    Google,
    Microsoft,
    Dropbox,
    Notion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OauthScope {
    Gmail,
    Drive,
    Calendar,
    Outlook,
    OutlookCalendar,
    Onedrive,
    Dropbox,
}

impl OauthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
            Self::Dropbox => "dropbox",
            Self::Notion => "notion",
        }
    }

    /// Scopes a credential of this provider may carry.
    pub fn scopes(&self) -> &'static [OauthScope] {
        match self {
            Self::Google => &[OauthScope::Gmail, OauthScope::Drive, OauthScope::Calendar],
            Self::Microsoft => &[
                OauthScope::Outlook,
                OauthScope::OutlookCalendar,
                OauthScope::Onedrive,
            ],
            Self::Dropbox => &[OauthScope::Dropbox],
            Self::Notion => &[],
        }
    }
}

impl OauthScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Drive => "drive",
            Self::Calendar => "calendar",
            Self::Outlook => "outlook",
            Self::OutlookCalendar => "outlook_calendar",
            Self::Onedrive => "onedrive",
            Self::Dropbox => "dropbox",
        }
    }
}

/// Sorted, de-duplicated scope list. Two credentials with the same key for
/// the same user and provider are the same credential.
pub fn normalize_scopes(scope: &[OauthScope]) -> Vec<OauthScope> {
    let mut scopes = scope.to_vec();
    scopes.sort();
    scopes.dedup();
    scopes
}

pub fn scope_key(scope: &[OauthScope]) -> String {
    normalize_scopes(scope)
        .iter()
        .map(OauthScope::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialOwner {
    pub id: Uuid,
    pub email: String,
}

/// A credential as read back from the store. The refresh token never leaves
/// the storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub provider: OauthProvider,
    pub scope: Vec<OauthScope>,
    pub access_token: String,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub owner: CredentialOwner,
    pub is_global: bool,
    pub created_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn projection(&self) -> CredentialProjection {
        CredentialProjection {
            provider: self.provider,
            scope: self.scope.clone(),
            access_token: self.access_token.clone(),
            owned_by: self.owner.clone(),
        }
    }

    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            id: self.id,
            provider: self.provider,
            scope: self.scope.clone(),
            owned_by: self.owner.clone(),
            access_token_expires_at: self.access_token_expires_at,
            created_at: self.created_at,
        }
    }
}

/// What tools get to see of a credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialProjection {
    pub provider: OauthProvider,
    pub scope: Vec<OauthScope>,
    pub access_token: String,
    pub owned_by: CredentialOwner,
}

impl CredentialProjection {
    pub fn has_scope(&self, scope: OauthScope) -> bool {
        self.scope.contains(&scope)
    }
}

/// Token-free view for listing connected accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub id: Uuid,
    pub provider: OauthProvider,
    pub scope: Vec<OauthScope>,
    pub owned_by: CredentialOwner,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Upsert payload, keyed by `(user_id, provider, scope)`.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub user_id: Uuid,
    pub provider: OauthProvider,
    pub scope: Vec<OauthScope>,
    pub access_token: String,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub is_global: bool,
}

impl NewCredential {
    pub fn new(
        user_id: Uuid,
        provider: OauthProvider,
        scope: Vec<OauthScope>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            provider,
            scope,
            access_token: access_token.into(),
            access_token_expires_at: None,
            refresh_token: None,
            refresh_token_expires_at: None,
            is_global: false,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        self.refresh_token = Some(token.into());
        self.refresh_token_expires_at = expires_at;
        self
    }

    /// Every scope must belong to the provider and at least one is required.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.scope.is_empty() {
            return Err(crate::error::PersistError::Validation(
                "credential needs at least one scope".to_string(),
            ));
        }
        let allowed = self.provider.scopes();
        if let Some(bad) = self.scope.iter().find(|s| !allowed.contains(s)) {
            return Err(crate::error::PersistError::Validation(format!(
                "scope {} is not valid for provider {}",
                bad.as_str(),
                self.provider.as_str()
            )));
        }
        Ok(())
    }
}
