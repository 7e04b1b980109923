use chrono::{DateTime, Utc};

use crate::cache::{CacheEntry, CacheStatus, QueryKey};
use crate::error::Error;

/// What a read hands back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
  pub key: QueryKey,
  /// Projected data, possibly stale
  pub data: Option<T>,
  pub status: CacheStatus,
  pub error: Option<Error>,
  /// A background refetch is running for this key
  pub revalidating: bool,
  pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> QueryResult<T> {
  /// Nothing to show yet.
  pub fn is_loading(&self) -> bool {
    self.data.is_none() && self.status == CacheStatus::Fetching
  }

  pub fn is_error(&self) -> bool {
    self.status == CacheStatus::Error || self.error.is_some()
  }

  pub fn is_stale(&self) -> bool {
    self.status == CacheStatus::Stale
  }

  pub fn is_fresh(&self) -> bool {
    self.status == CacheStatus::Fresh
  }

  /// Transform the data, keeping status and error.
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryResult<U> {
    self.filter_map(|data| Some(f(data)))
  }

  /// Transform the data, dropping it when `f` returns `None`.
  pub fn filter_map<U>(self, f: impl FnOnce(T) -> Option<U>) -> QueryResult<U> {
    QueryResult {
      key: self.key,
      data: self.data.and_then(f),
      status: self.status,
      error: self.error,
      revalidating: self.revalidating,
      fetched_at: self.fetched_at,
    }
  }
}

impl<T> QueryResult<T> {
  pub(crate) fn pending(key: QueryKey) -> Self {
    Self {
      key,
      data: None,
      status: CacheStatus::Fetching,
      error: None,
      revalidating: false,
      fetched_at: None,
    }
  }

  pub(crate) fn failed(key: QueryKey, error: Error) -> Self {
    Self {
      key,
      data: None,
      status: CacheStatus::Error,
      error: Some(error),
      revalidating: false,
      fetched_at: None,
    }
  }
}

impl QueryResult<serde_json::Value> {
  pub(crate) fn from_entry(entry: CacheEntry, revalidating: bool) -> Self {
    Self {
      key: entry.key,
      data: entry.data,
      status: entry.status,
      error: entry.error,
      revalidating,
      fetched_at: entry.last_fetched_at,
    }
  }
}
