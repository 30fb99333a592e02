use thiserror::Error;

/// Failures talking to a model provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("request to {provider} failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no model providers configured")]
    NoProviders,
}

impl LlmError {
    /// Whether another provider in a fallback chain should be tried.
    ///
    /// Auth and availability statuses (401 and above) plus connection-level
    /// failures qualify; a 400 means the request itself is wrong and would
    /// fail everywhere.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 401,
            Self::Transport { source, .. } => source.is_connect() || source.is_timeout(),
            Self::NoProviders => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Default retry predicate for [`crate::FallbackClient`].
pub fn is_retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<LlmError>()
        .map(LlmError::is_retryable)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> LlmError {
        LlmError::Status {
            provider: "groq".to_string(),
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_status_retryability() {
        assert!(!status(400).is_retryable());
        assert!(status(401).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
    }

    #[test]
    fn test_anyhow_predicate() {
        assert!(is_retryable(&anyhow::Error::new(status(500))));
        assert!(!is_retryable(&anyhow::anyhow!("malformed chunk")));
        assert!(!is_retryable(&anyhow::Error::new(LlmError::NoProviders)));
    }
}
