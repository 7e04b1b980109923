use chrono::Duration;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::cache::CacheOptions;

/// When a read of cached data also refetches it.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefetchOnMount {
  /// Every read refetches in the background, even fresh data
  Always,
  /// Only stale (or failed) data is refetched
  #[default]
  IfStale,
}

/// Caller-facing knobs of the synchronization layer.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncOptions {
  /// How long fetched data stays fresh
  pub stale_time_ms: u64,
  /// Per-resource stale times
  pub resource_stale_time_ms: BTreeMap<String, u64>,
  /// How long an unwatched entry is kept
  pub gc_time_ms: u64,
  pub refetch_on_mount: RefetchOnMount,
  pub refetch_on_window_focus: bool,
  /// Extra attempts for a failed read (mutations never retry)
  pub retry_count: usize,
  /// First retry delay; later ones back off exponentially
  pub retry_delay_ms: u64,
}

impl Default for SyncOptions {
  fn default() -> Self {
    Self {
      stale_time_ms: 600_000,
      resource_stale_time_ms: BTreeMap::new(),
      gc_time_ms: 3_600_000,
      refetch_on_mount: RefetchOnMount::IfStale,
      refetch_on_window_focus: false,
      retry_count: 0,
      retry_delay_ms: 1_000,
    }
  }
}

fn millis(ms: u64) -> Duration {
  Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

impl SyncOptions {
  pub fn cache_options(&self) -> CacheOptions {
    CacheOptions {
      stale_time: millis(self.stale_time_ms),
      gc_time: millis(self.gc_time_ms),
      stale_time_overrides: self
        .resource_stale_time_ms
        .iter()
        .map(|(resource, ms)| (resource.clone(), millis(*ms)))
        .collect(),
    }
  }

  pub fn retry_delay(&self) -> std::time::Duration {
    std::time::Duration::from_millis(self.retry_delay_ms)
  }
}
