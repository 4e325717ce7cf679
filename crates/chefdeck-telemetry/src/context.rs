//! Per-request context for correlation and tracing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Context carried through one HTTP request.
///
/// Handlers create one per request, instrument their work with
/// [`span`](Self::span) and call [`finish`](Self::finish) once the response
/// status is known.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: Uuid,
    /// Operation being performed (e.g. `delete_node`).
    pub operation: String,
    /// Acting identity, if the caller named one.
    pub identity: Option<String>,
    /// Target node or project, if any.
    pub target: Option<String>,
    /// When the request started.
    pub started_at: DateTime<Utc>,
}

impl RequestContext {
    /// Create a context for `operation`.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            operation: operation.into(),
            identity: None,
            target: None,
            started_at: Utc::now(),
        }
    }

    /// Set the acting identity. Blank identities are ignored.
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        let identity = identity.into();
        if !identity.trim().is_empty() {
            self.identity = Some(identity);
        }
        self
    }

    /// Set the target.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        // started_at is set at creation, so this is never negative.
        #[allow(clippy::arithmetic_side_effects)]
        let elapsed = Utc::now() - self.started_at;
        elapsed
    }

    /// Elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        self.elapsed().num_milliseconds()
    }

    /// Tracing span carrying this context's fields.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.short_id(),
            operation = %self.operation,
            identity = self.identity.as_deref(),
            target = self.target.as_deref(),
        )
    }

    /// First eight characters of the request id.
    #[must_use]
    pub fn short_id(&self) -> String {
        let mut id = self.request_id.simple().to_string();
        id.truncate(8);
        id
    }

    /// Log request completion with its status and elapsed time.
    pub fn finish(&self, status: u16) {
        let _guard = self.span().entered();
        if status >= 500 {
            tracing::error!(status, elapsed_ms = self.elapsed_ms(), "Request failed");
        } else if status >= 400 {
            tracing::warn!(status, elapsed_ms = self.elapsed_ms(), "Request rejected");
        } else {
            tracing::info!(status, elapsed_ms = self.elapsed_ms(), "Request completed");
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new("unknown")
    }
}
