//! Prelude module - commonly used types for convenient import.
//!
//! Use `use chefdeck_ledger::prelude::*;` to import all essential types.

pub use crate::{Ledger, LedgerError, LedgerResult, NodeRecord};
