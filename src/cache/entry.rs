//! Cache entries, their status, and change notifications.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::key::QueryKey;
use crate::error::Error;

/// Where an entry is in its lifecycle.
///
/// `Fetching → Fresh → Stale → Fetching → ...`, with `Error` reachable from
/// `Fetching` and left again on the next successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
  Fresh,
  Stale,
  Fetching,
  Error,
}

/// One cached query result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  pub key: QueryKey,
  /// Raw server data (the unwrapped `data` of the response envelope)
  pub data: Option<Value>,
  pub status: CacheStatus,
  pub last_fetched_at: Option<DateTime<Utc>>,
  pub error: Option<Error>,
  /// Data carries local edits the server has not confirmed yet. Such an
  /// entry reads as fresh whatever its age, until the next write or
  /// invalidation.
  pub optimistic: bool,
}

impl CacheEntry {
  /// A freshly referenced entry: fetching, nothing to show yet.
  pub fn new(key: QueryKey) -> Self {
    Self {
      key,
      data: None,
      status: CacheStatus::Fetching,
      last_fetched_at: None,
      error: None,
      optimistic: false,
    }
  }

  pub fn is_fresh(&self) -> bool {
    self.status == CacheStatus::Fresh
  }

  pub fn is_stale(&self) -> bool {
    self.status == CacheStatus::Stale
  }

  pub fn is_fetching(&self) -> bool {
    self.status == CacheStatus::Fetching
  }

  pub fn is_error(&self) -> bool {
    self.status == CacheStatus::Error
  }

  pub fn has_data(&self) -> bool {
    self.data.is_some()
  }
}

/// What happened to a key, delivered to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
  /// New data from the server
  Written(CacheEntry),
  /// Local (optimistic) change to the data
  Patched(CacheEntry),
  /// Marked stale
  Invalidated(CacheEntry),
  /// A fetch failed
  Failed(CacheEntry),
  /// An entry was put back to an earlier snapshot
  Restored(Option<CacheEntry>),
  /// The entry was dropped from the cache
  Removed(QueryKey),
}

impl CacheEvent {
  /// The entry as it stands after the event, if it still exists.
  pub fn entry(&self) -> Option<&CacheEntry> {
    match self {
      Self::Written(e) | Self::Patched(e) | Self::Invalidated(e) | Self::Failed(e) => Some(e),
      Self::Restored(e) => e.as_ref(),
      Self::Removed(_) => None,
    }
  }
}
