//! Chefdeck Telemetry - logging and request tracing for chefdeck.
//!
//! This crate provides:
//! - Logging setup with pretty, compact and JSON formats
//! - Daily-rotated file output
//! - A per-request context whose span tags every log line of a request
//!
//! # Example
//!
//! ```rust,no_run
//! use chefdeck_telemetry::{LogConfig, LogFormat, RequestContext, setup_logging};
//!
//! # fn main() -> Result<(), chefdeck_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("chefdeck_gateway=debug");
//! setup_logging(&config)?;
//!
//! let ctx = RequestContext::new("delete_node").with_identity("alice");
//! let span = ctx.span();
//! let _guard = span.enter();
//! tracing::info!("Processing request");
//! ctx.finish(200);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::RequestContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LOG_FILE_PREFIX, LogConfig, LogFormat, LogTarget, setup_logging};
