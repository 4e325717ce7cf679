//! Convenient re-exports for chefdeck-telemetry.

pub use crate::{LogConfig, LogFormat, LogTarget, RequestContext, setup_logging};
