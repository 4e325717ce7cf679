//! Chefdeck Store - JSON document persistence.
//!
//! A stateless read/write facade over small JSON documents on disk: the node
//! ledger, the authorization document, and the project settings document.
//!
//! # Reading
//!
//! Reads never fail. A missing file, an unreadable file, or malformed JSON
//! degrades to an empty default and the discarded error is logged. Two
//! parsing modes are available and callers pick one explicitly:
//!
//! - [`read_value`] - free-form mode. Returns a [`serde_json::Value`] with
//!   string-keyed maps, for documents looked up by arbitrary keys.
//! - [`read_document`] - typed mode. Deserializes into a concrete type whose
//!   fields bind the document keys, falling back to `T::default()`.
//!
//! # Writing
//!
//! [`write_value`] and [`write_document`] serialize to pretty-printed JSON,
//! write a temp file next to the target and rename it into place while
//! holding an exclusive advisory lock on `<file>.lock`. Concurrent readers
//! see either the old document or the new one, never a partial file.
//!
//! A missing path or a `null` document is a silent no-op.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! let path = Path::new("config/state.json");
//! let doc = chefdeck_store::read_value(Some(path));
//! chefdeck_store::write_value(Some(path), &doc)?;
//! # Ok::<(), chefdeck_store::StoreError>(())
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod document;
mod error;
mod lock;

pub use document::{MAX_DOCUMENT_SIZE, read_document, read_value, write_document, write_value};
pub use error::{StoreError, StoreResult};
