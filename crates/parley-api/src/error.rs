use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parley_graph::TurnError;
use parley_persist::PersistError;
use serde_json::json;
use thiserror::Error;

/// Every failure a handler can return. Not-found and not-authorized are the
/// same variant so callers cannot probe for other users' data.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Thread not found")]
    ThreadNotFound,

    #[error("Edited message not found")]
    EditedMessageNotFound,

    #[error("Message limit reached ({used}/{limit})")]
    QuotaExceeded { limit: i64, used: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::BadRequest(_) => "INVALID_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::ThreadNotFound => "THREAD_NOT_FOUND",
            Self::EditedMessageNotFound => "EDITED_MESSAGE_NOT_FOUND",
            Self::QuotaExceeded { .. } => "MESSAGE_LIMIT_REACHED",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::ThreadNotFound | Self::EditedMessageNotFound => StatusCode::NOT_FOUND,
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PersistError> for ApiError {
    fn from(error: PersistError) -> Self {
        match error {
            PersistError::NotFound(_) => Self::NotFound,
            PersistError::Validation(msg) => Self::BadRequest(msg),
            PersistError::QuotaExceeded { limit, used } => Self::QuotaExceeded { limit, used },
            PersistError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<TurnError> for ApiError {
    fn from(error: TurnError) -> Self {
        match error {
            TurnError::QuotaExceeded { limit, used } => Self::QuotaExceeded { limit, used },
            TurnError::ThreadNotFound => Self::ThreadNotFound,
            TurnError::EditedMessageNotFound => Self::EditedMessageNotFound,
            TurnError::InvalidRequest(msg) => Self::BadRequest(msg),
            TurnError::Persist(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": self.code(),
            "message": message,
        }));

        (self.status(), body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
