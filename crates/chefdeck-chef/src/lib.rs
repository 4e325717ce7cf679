//! Chefdeck Chef - access to the Chef server.
//!
//! This crate provides:
//! - [`ChefClient`] - the operations chefdeck needs from Chef
//! - [`HttpChefClient`] - the REST implementation
//! - [`RequestSigner`] - Chef API request signing with a client key
//! - [`MemoryChefClient`] - an in-memory server with failure injection
//!
//! Search results are partial-search projections with the fields listed in
//! [`SEARCH_FILTER`].

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod client;
mod error;
mod http;
mod memory;
mod signing;

pub use client::{ChefClient, MATCH_ALL, SEARCH_FILTER, project, run_list_of, sort_names};
pub use error::{ChefError, ChefResult};
pub use http::{HttpChefClient, HttpChefConfig};
pub use memory::MemoryChefClient;
pub use signing::{RequestSigner, SIGN_DESCRIPTION};
