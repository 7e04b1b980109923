//! Time source for freshness and garbage-collection decisions.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of "now" for the cache.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// A clock that only moves when told to.
///
/// Starts at the Unix epoch so that offsets in tests read as plain
/// milliseconds (`advance_ms(700_000)` is "t=700000").
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new() -> Self {
    Self::starting_at(DateTime::<Utc>::UNIX_EPOCH)
  }

  pub fn starting_at(start: DateTime<Utc>) -> Self {
    Self {
      now: Mutex::new(start),
    }
  }

  pub fn advance(&self, by: Duration) {
    let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
    *now += by;
  }

  pub fn advance_ms(&self, ms: i64) {
    self.advance(Duration::milliseconds(ms));
  }

  pub fn set(&self, to: DateTime<Utc>) {
    *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
  }
}

impl Default for ManualClock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap_or_else(|e| e.into_inner())
  }
}
