//! Client-side synchronization for an e-commerce admin REST API.
//!
//! Reads are served from an in-memory [`cache::QueryCache`] and revalidated
//! in the background once stale; writes are applied to the cache
//! optimistically and rolled back if the server refuses them.

pub mod cache;
pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod logging;
pub mod remote;
pub mod sync;

pub use error::{Error, Result};
