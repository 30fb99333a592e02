use parley_persist::{CommittedTurn, PersistError};
use thiserror::Error;

/// Rejections before any model call. Nothing has been streamed yet, so these
/// become plain HTTP errors.
#[derive(Error, Debug)]
pub enum TurnError {
    #[error("Message limit reached ({used}/{limit})")]
    QuotaExceeded { limit: i64, used: i64 },

    #[error("Thread not found")]
    ThreadNotFound,

    #[error("Edited message not found")]
    EditedMessageNotFound,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl TurnError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => "MESSAGE_LIMIT_REACHED",
            Self::ThreadNotFound => "THREAD_NOT_FOUND",
            Self::EditedMessageNotFound => "EDITED_MESSAGE_NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Persist(_) => "INTERNAL_ERROR",
        }
    }
}

/// Failures after streaming started, reported as a trailing `error` event.
#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error("model stopped with finish reason {0:?}")]
    FinishReasonNotStop(Option<String>),

    #[error("model failure: {0}")]
    ModelFailure(String),

    #[error("commit failed: {0}")]
    CommitFailed(#[source] PersistError),

    /// The turn is stored but the usage counter was not bumped
    #[error("usage update failed: {source}")]
    UsageUpdateFailed {
        committed: Box<CommittedTurn>,
        #[source]
        source: PersistError,
    },
}

impl FinalizeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::FinishReasonNotStop(_) => "FINISH_REASON_NOT_STOP",
            Self::ModelFailure(_) => "MODEL_FAILURE",
            Self::CommitFailed(_) => "COMMIT_FAILED",
            Self::UsageUpdateFailed { .. } => "USAGE_UPDATE_FAILED",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UsageUpdateFailed { .. } | Self::ModelFailure(_))
    }

    /// The part of the turn that did land, if any.
    pub fn committed(&self) -> Option<&CommittedTurn> {
        match self {
            Self::UsageUpdateFailed { committed, .. } => Some(committed),
            _ => None,
        }
    }
}
