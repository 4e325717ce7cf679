//! Authorization error types.

use thiserror::Error;

/// Errors raised when a caller is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No key was presented, or it did not match the stored digest.
    #[error("invalid or missing auth key for {identity:?}")]
    InvalidKey {
        /// Caller identity.
        identity: String,
    },

    /// The caller may not perform the operation on this node.
    #[error("{identity:?} is not authorized to {operation} {node}")]
    Denied {
        /// Caller identity.
        identity: String,
        /// Attempted operation.
        operation: &'static str,
        /// Target node.
        node: String,
    },
}

/// Result type for authorization checks.
pub type AuthResult<T> = Result<T, AuthError>;
