//! Ledger error types.

use thiserror::Error;

use chefdeck_store::StoreError;

/// Errors that can occur with ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No record matches the requested name.
    #[error("{name} not found in state")]
    NotFound {
        /// The requested node name.
        name: String,
    },

    /// A record field was rejected before any mutation.
    #[error("invalid {field}: {message}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        message: String,
    },

    /// Writing the ledger document failed. The in-memory ledger is unchanged.
    #[error("failed to persist ledger: {0}")]
    Persistence(#[from] StoreError),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
