use thiserror::Error;

use tunerd_core::models::ReasonCode;

/// Serving-time failure taxonomy.
///
/// The attempt-level variants (`ConnectionTimeout`, `Connection`, `Http`,
/// `Transfer`) are classified per candidate and retried across the
/// channel's remaining sources; they are never surfaced individually.
/// Callers only ever see `Unavailable`, `ChannelDisabled`, or
/// `ChannelNotFound`, none of which carry internal detail.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("upstream connect timed out")]
    ConnectionTimeout,

    #[error("upstream connection failed: {0}")]
    Connection(String),

    #[error("upstream returned HTTP {0}")]
    Http(u16),

    #[error("upstream failed mid-transfer: {0}")]
    Transfer(String),

    #[error("channel is disabled")]
    ChannelDisabled,

    #[error("channel not found")]
    ChannelNotFound,

    #[error("service unavailable")]
    Unavailable,
}

impl StreamError {
    /// Classify a reqwest failure into the serving taxonomy.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::ConnectionTimeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http(status.as_u16())
        } else if err.is_body() || err.is_decode() {
            Self::Transfer(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }

    /// Whether failover may try the next candidate after this failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout | Self::Connection(_) | Self::Http(_) | Self::Transfer(_)
        )
    }

    /// Reason code recorded in event log details.
    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        match self {
            Self::ConnectionTimeout => ReasonCode::ConnectionTimeout,
            Self::Connection(_) => ReasonCode::ConnectionError,
            Self::Http(_) => ReasonCode::HttpError,
            Self::Transfer(_) => ReasonCode::StreamError,
            Self::ChannelDisabled | Self::ChannelNotFound | Self::Unavailable => {
                ReasonCode::AllStreamsExhausted
            }
        }
    }
}

pub type StreamResult<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_failures_are_retryable() {
        assert!(StreamError::ConnectionTimeout.is_retryable());
        assert!(StreamError::Connection("refused".to_string()).is_retryable());
        assert!(StreamError::Http(503).is_retryable());
        assert!(StreamError::Transfer("reset".to_string()).is_retryable());
        assert!(!StreamError::Unavailable.is_retryable());
        assert!(!StreamError::ChannelDisabled.is_retryable());
    }

    #[test]
    fn test_terminal_failure_text_is_opaque() {
        let text = StreamError::Unavailable.to_string();
        assert_eq!(text, "service unavailable");
    }
}
