//! Chefdeck Ledger - the local record of registered nodes.
//!
//! The ledger tracks which nodes this service has been asked to register,
//! who registered them, and who touched them since. It is the sole writer of
//! its JSON document (via `chefdeck-store`).
//!
//! # Invariants
//!
//! - Exactly one record per case-insensitive name. The stored name keeps the
//!   casing of the first insertion.
//! - `created` and `creator` are never overwritten.
//! - `last_modified` is newest-first and holds at most
//!   [`MAX_AUDIT_ENTRIES`] entries.
//! - The document on disk is sorted case-insensitively by name with no
//!   duplicates.
//!
//! # Example
//!
//! ```rust
//! use chefdeck_ledger::Ledger;
//!
//! let ledger = Ledger::in_memory();
//! ledger.upsert("Web01", "alice", None)?;
//! let record = ledger.upsert("web01", "bob", Some("webadmin"))?;
//!
//! assert_eq!(record.name, "Web01");
//! assert_eq!(record.creator, "alice");
//! assert_eq!(record.last_modified.len(), 1);
//! # Ok::<(), chefdeck_ledger::LedgerError>(())
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod ledger;
mod record;

pub use error::{LedgerError, LedgerResult};
pub use ledger::Ledger;
pub use record::{MAX_AUDIT_ENTRIES, NodeRecord, audit_entry, name_key, same_name};
