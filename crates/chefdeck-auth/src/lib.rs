//! Chefdeck Auth - caller resolution and node authorization.
//!
//! This crate provides:
//! - [`AuthSource`] - the identity → roles/key document, re-read per request
//! - [`AuthContext`] - the resolved caller for one request
//! - [`Authorizer`] - admin, creator, and role checks against the ledger
//!   and a node's run-list
//! - [`hash_key`] / [`verify_key`] - SHA-512 key digests
//!
//! Resolution never fails: an unknown caller, or an authorization document
//! that cannot be read, yields a context with no roles.
//!
//! # Delete authorization
//!
//! A delete is allowed when the caller is an admin, **or** created the
//! ledger record, **or** holds a role that appears in the node's current
//! run-list. An empty run-list is governed by [`EmptyRunListPolicy`].

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod authorizer;
mod context;
mod error;
mod key;

pub use authorizer::{Authorizer, Decision, EmptyRunListPolicy};
pub use context::{ADMIN_ROLE, AuthContext, AuthDocument, AuthRecord, AuthSource};
pub use error::{AuthError, AuthResult};
pub use key::{hash_key, verify_key};
