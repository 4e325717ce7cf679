//! Gateway error taxonomy and its JSON rendering.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use chefdeck_auth::AuthError;
use chefdeck_chef::ChefError;
use chefdeck_ledger::LedgerError;

/// Errors returned by the orchestrator and the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No ledger record, or no such node.
    #[error("{message}")]
    NotFound {
        /// Human-readable description.
        message: String,
    },

    /// The caller may not perform the operation.
    #[error("{0}")]
    Unauthorized(String),

    /// The ledger could not be written.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The Chef server failed.
    #[error("chef server error: {message}")]
    ExternalService {
        /// Error description.
        message: String,
        /// Whether retrying may succeed.
        retryable: bool,
    },

    /// A Chef server call did not finish in time.
    #[error("chef server timed out during {operation}")]
    ExternalTimeout {
        /// Operation that timed out.
        operation: String,
    },

    /// The request was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    retryable: bool,
}

impl GatewayError {
    /// Not-found error for a ledger name.
    #[must_use]
    pub fn not_in_state(name: &str) -> Self {
        Self::NotFound {
            message: format!("{name} not found in State"),
        }
    }

    /// Map to an HTTP status code.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            Self::ExternalTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Short machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::Persistence(_) => "persistence",
            Self::ExternalService { .. } => "external_service",
            Self::ExternalTimeout { .. } => "external_timeout",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the caller may retry the same request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExternalTimeout { .. } => true,
            Self::ExternalService { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

impl From<LedgerError> for GatewayError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound { name } => Self::not_in_state(&name),
            LedgerError::Invalid { .. } => Self::BadRequest(e.to_string()),
            LedgerError::Persistence(_) => Self::Persistence(e.to_string()),
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(e: AuthError) -> Self {
        Self::Unauthorized(e.to_string())
    }
}

impl From<ChefError> for GatewayError {
    fn from(e: ChefError) -> Self {
        match e {
            ChefError::Timeout { operation } => Self::ExternalTimeout { operation },
            ChefError::NotFound { name } => Self::NotFound {
                message: format!("{name} not found on the Chef server"),
            },
            other => Self::ExternalService {
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
