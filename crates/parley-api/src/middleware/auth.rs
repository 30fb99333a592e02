//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs issued by the identity service. The claims carry the
//! whole `ActiveUser`, so authenticated requests never touch the user table.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use parley_persist::ActiveUser;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub slug: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub is_admin: bool,
    pub exp: i64,
}

impl Claims {
    pub fn for_user(user: &ActiveUser, ttl: Duration) -> Self {
        Self {
            sub: user.id,
            slug: user.slug.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            is_admin: user.is_admin,
            exp: (Utc::now() + ttl).timestamp(),
        }
    }

    pub fn active_user(&self) -> ActiveUser {
        ActiveUser {
            id: self.sub,
            slug: self.slug.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            is_admin: self.is_admin,
        }
    }
}

/// The authenticated caller, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser(pub ActiveUser);

pub fn issue_token(claims: &Claims, secret: &[u8]) -> Result<String, ApiError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret))
        .map_err(|e| ApiError::Internal(format!("jwt encode: {e}")))
}

/// Verify signature and expiry, returning the claims on success.
pub fn verify_token(token: &str, secret: &[u8]) -> Option<Claims> {
    let key = DecodingKey::from_secret(secret);
    let validation = Validation::default();
    decode::<Claims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies it and
/// injects `AuthUser` into request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Invalid authorization scheme".into()))?;

    let claims = verify_token(token, state.config.jwt_secret.as_bytes())
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".into()))?;

    let user = claims.active_user();
    tracing::debug!(user_id = %user.id, slug = %user.slug, "authenticated");
    request.extensions_mut().insert(AuthUser(user));

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> ActiveUser {
        ActiveUser {
            id: Uuid::new_v4(),
            slug: "acme".into(),
            email: "alice@acme.test".into(),
            display_name: "Alice".into(),
            is_admin: false,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let user = user();
        let token = issue_token(&Claims::for_user(&user, Duration::minutes(5)), b"secret").unwrap();

        let claims = verify_token(&token, b"secret").unwrap();
        assert_eq!(claims.active_user(), user);
        assert!(verify_token(&token, b"other-secret").is_none());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token = issue_token(&Claims::for_user(&user(), Duration::minutes(-10)), b"secret").unwrap();
        assert!(verify_token(&token, b"secret").is_none());
    }
}
