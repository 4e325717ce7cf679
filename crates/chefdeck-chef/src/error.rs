//! Chef client error types.

use thiserror::Error;

/// Errors that can occur talking to the Chef server.
#[derive(Debug, Error)]
pub enum ChefError {
    /// The node does not exist on the Chef server.
    #[error("node not found: {name}")]
    NotFound {
        /// Node name.
        name: String,
    },

    /// The request did not complete in time.
    #[error("{operation} timed out")]
    Timeout {
        /// Operation that timed out.
        operation: String,
    },

    /// The server answered with an unexpected status.
    #[error("Chef server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },

    /// The request could not be sent or the connection failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The response body was not what the Chef API documents.
    #[error("Invalid Chef response: {0}")]
    InvalidResponse(String),

    /// The server is unreachable or refusing work.
    #[error("Chef server unavailable: {0}")]
    Unavailable(String),

    /// A request could not be signed.
    #[error("Request signing failed: {0}")]
    Signing(String),

    /// Client configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChefError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Unavailable(_) | Self::Http(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound { .. }
            | Self::InvalidResponse(_)
            | Self::Signing(_)
            | Self::Config(_) => false,
        }
    }

    pub(crate) fn from_reqwest(operation: &str, e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout {
                operation: operation.to_owned(),
            }
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Http(format!("{operation}: {e}"))
        }
    }
}

/// Result type for Chef client operations.
pub type ChefResult<T> = Result<T, ChefError>;
