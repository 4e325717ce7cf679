//! Convenient re-exports for chefdeck-chef.
//!
//! ```
//! use chefdeck_chef::prelude::*;
//! ```

pub use crate::{ChefClient, ChefError, ChefResult, HttpChefClient, MemoryChefClient};
