//! Synchronization layer: cache-first reads, optimistic writes.
//!
//! Callers talk to [`SyncController`] (or a typed [`EntityClient`]); the
//! controller decides when to serve from the cache, when to hit the server,
//! and how a write is reflected locally before and after the server answers.

mod controller;
mod entity_client;
mod mutation;
mod options;
mod result;

pub use controller::SyncController;
pub use entity_client::EntityClient;
pub use mutation::{Mutation, MutationKind};
pub use options::{RefetchOnMount, SyncOptions};
pub use result::QueryResult;
