//! Remote resource client: one HTTP call per CRUD operation, no caching, no retries.

mod api_types;
mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use api_types::{unwrap_data, ApiEnvelope, Encoding, FileUpload, Payload};
pub use client::{HttpResourceClient, RemoteResource};
