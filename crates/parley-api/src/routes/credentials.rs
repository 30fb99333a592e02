use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use parley_persist::CredentialSummary;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::ApiResult, middleware::auth::AuthUser, state::AppState};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialOwnerResponse {
    pub id: Uuid,
    pub email: String,
}

/// A connected account, without its tokens.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    pub id: Uuid,
    pub provider: String,
    pub scope: Vec<String>,
    pub owned_by: CredentialOwnerResponse,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<CredentialSummary> for CredentialResponse {
    fn from(summary: CredentialSummary) -> Self {
        Self {
            id: summary.id,
            provider: summary.provider.as_str().to_string(),
            scope: summary.scope.iter().map(|s| s.as_str().to_string()).collect(),
            owned_by: CredentialOwnerResponse {
                id: summary.owned_by.id,
                email: summary.owned_by.email,
            },
            access_token_expires_at: summary.access_token_expires_at,
            created_at: summary.created_at,
        }
    }
}

/// Credentials visible to the caller: their own, shared with them, or (for
/// admins) any in the tenant
#[utoipa::path(
    get,
    path = "/credential",
    responses(
        (status = 200, description = "Visible credentials", body = [CredentialResponse])
    ),
    security(("bearer" = [])),
    tag = "credentials"
)]
pub async fn list_credentials(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> ApiResult<Json<Vec<CredentialResponse>>> {
    let credentials = state.persist.credentials().list_for_display(&user).await?;
    Ok(Json(credentials.into_iter().map(CredentialResponse::from).collect()))
}

/// Disconnect an account
#[utoipa::path(
    delete,
    path = "/credential/{credential_id}",
    params(("credential_id" = Uuid, Path, description = "Credential ID")),
    responses(
        (status = 204, description = "Credential deleted"),
        (status = 404, description = "Credential not found")
    ),
    security(("bearer" = [])),
    tag = "credentials"
)]
pub async fn delete_credential(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(credential_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.persist.delete_credential(&user, credential_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
