use http::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const CLIENT_TIMEOUT_MESSAGE: &str = "The request timed out. Please try again.";
pub const SERVER_TIMEOUT_MESSAGE: &str =
    "The operation timed out on the server. Please try a shorter question.";
pub const RATE_LIMIT_MESSAGE: &str = "Your daily question limit has been reached.";
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";
pub const MISSING_SESSION_MESSAGE: &str = "No active session found. Please sign in again.";

/// Which side gave up waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOrigin {
    /// Our own deadline fired.
    Client,
    /// The server answered 504.
    Server,
}

impl TimeoutOrigin {
    pub fn message(self) -> &'static str {
        match self {
            TimeoutOrigin::Client => CLIENT_TIMEOUT_MESSAGE,
            TimeoutOrigin::Server => SERVER_TIMEOUT_MESSAGE,
        }
    }
}

impl fmt::Display for TimeoutOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// How a caller should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Trying again locally has a reasonable chance of succeeding.
    Retryable,
    /// Terminal, and the message is specific enough to show as is.
    TerminalWithMessage,
    /// Terminal; show a generic apology instead of the details.
    TerminalGeneric,
}

/// Classified failure of any backend exchange.
///
/// Values are produced by [`crate::classify`]; nothing else builds them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("{origin}")]
    Timeout { origin: TimeoutOrigin },
    #[error("transport aborted: {0}")]
    TransportAborted(String),
    #[error("{message}")]
    ServerTerminal { status: StatusCode, message: String },
    #[error("{0}")]
    Unknown(String),
}

impl ApiError {
    pub fn disposition(&self) -> ErrorDisposition {
        match self {
            ApiError::RateLimited { .. } => ErrorDisposition::TerminalWithMessage,
            ApiError::TransportAborted(_) => ErrorDisposition::Retryable,
            ApiError::ServerTerminal { status, .. }
                if matches!(
                    *status,
                    StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE
                ) =>
            {
                ErrorDisposition::Retryable
            }
            ApiError::Timeout { .. } | ApiError::ServerTerminal { .. } | ApiError::Unknown(_) => {
                ErrorDisposition::TerminalGeneric
            }
        }
    }

    /// Message suitable for a notice or an inline error.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::TransportAborted(_) => GENERIC_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_client_timeout(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout {
                origin: TimeoutOrigin::Client
            }
        )
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            ApiError::Timeout {
                origin: TimeoutOrigin::Server,
            } => Some(StatusCode::GATEWAY_TIMEOUT),
            ApiError::ServerTerminal { status, .. } => Some(*status),
            _ => None,
        }
    }
}
