//! Store error types.

/// Errors from document writes.
///
/// Reads never fail: a missing or malformed document degrades to an empty
/// default instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Creating the parent directory, temp file, or lock file failed.
    #[error("I/O error writing {path}: {source}")]
    Io {
        /// Target document path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document could not be serialized.
    #[error("serialization error for {path}: {message}")]
    Serialization {
        /// Target document path.
        path: String,
        /// Serializer message.
        message: String,
    },

    /// The exclusive write lock could not be acquired.
    #[error("failed to lock {path}: {message}")]
    Lock {
        /// Target document path.
        path: String,
        /// Lock failure description.
        message: String,
    },

    /// The temp file could not be renamed over the target.
    #[error("failed to persist {path}: {message}")]
    Persist {
        /// Target document path.
        path: String,
        /// Rename failure description.
        message: String,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
