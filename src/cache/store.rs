//! In-memory query cache.
//!
//! Every operation takes the lock, does its work, and releases it before any
//! subscriber callback runs, so operations are atomic with respect to each
//! other and callbacks are free to read the cache again.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

use super::entry::{CacheEntry, CacheEvent, CacheStatus};
use super::key::{KeyFilter, QueryKey};
use crate::clock::{Clock, SystemClock};
use crate::error::Error;

/// Subscriber callback.
pub type Callback = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Freshness and eviction windows.
#[derive(Debug, Clone)]
pub struct CacheOptions {
  /// How long after a fetch data counts as fresh
  pub stale_time: Duration,
  /// How long an entry without subscribers is kept
  pub gc_time: Duration,
  /// Per-resource stale times, keyed by resource name
  pub stale_time_overrides: HashMap<String, Duration>,
}

impl Default for CacheOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::minutes(10),
      gc_time: Duration::hours(1),
      stale_time_overrides: HashMap::new(),
    }
  }
}

/// Proof that a fetch was started; its result is applied only if it is still
/// the latest fetch for the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
  pub key: QueryKey,
  generation: u64,
}

struct Slot {
  entry: CacheEntry,
  generation: u64,
  /// Status before the current fetch began; `None` if the fetch created the entry
  status_before_fetch: Option<CacheStatus>,
  /// Invalidated while a fetch was in flight: its result arrives already stale
  stale_on_arrival: bool,
  /// When the last subscriber left (or the entry was created without one)
  idle_since: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
  slots: HashMap<QueryKey, Slot>,
  subscribers: HashMap<QueryKey, HashMap<u64, Callback>>,
  next_subscriber_id: u64,
  /// Shared by all keys so a recreated entry never reuses a generation
  next_generation: u64,
}

impl Inner {
  fn bump_generation(&mut self) -> u64 {
    self.next_generation += 1;
    self.next_generation
  }

  fn has_subscribers(&self, key: &QueryKey) -> bool {
    self.subscribers.get(key).is_some_and(|s| !s.is_empty())
  }

  fn slot_mut(&mut self, key: &QueryKey, now: DateTime<Utc>) -> &mut Slot {
    let idle_since = if self.has_subscribers(key) {
      None
    } else {
      Some(now)
    };
    self.slots.entry(key.clone()).or_insert_with(|| Slot {
      entry: CacheEntry::new(key.clone()),
      generation: 0,
      status_before_fetch: None,
      stale_on_arrival: false,
      idle_since,
    })
  }

  fn callbacks(&self, key: &QueryKey) -> Vec<Callback> {
    self
      .subscribers
      .get(key)
      .map(|subs| subs.values().cloned().collect())
      .unwrap_or_default()
  }
}

/// Store of cache entries with change notification.
pub struct QueryCache {
  inner: Mutex<Inner>,
  clock: Arc<dyn Clock>,
  options: CacheOptions,
}

impl QueryCache {
  pub fn new(options: CacheOptions) -> Self {
    Self::with_clock(options, Arc::new(SystemClock))
  }

  pub fn with_clock(options: CacheOptions, clock: Arc<dyn Clock>) -> Self {
    Self {
      inner: Mutex::new(Inner::default()),
      clock,
      options,
    }
  }

  pub fn options(&self) -> &CacheOptions {
    &self.options
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  /// Stale time that applies to a key's resource.
  pub fn stale_time_for(&self, key: &QueryKey) -> Duration {
    self
      .options
      .stale_time_overrides
      .get(&key.resource)
      .copied()
      .unwrap_or(self.options.stale_time)
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn notify(&self, callbacks: Vec<Callback>, event: CacheEvent) {
    for callback in callbacks {
      callback(&event);
    }
  }

  /// Entry as the outside world sees it: fresh entries past their stale time
  /// report `Stale`, unless they hold an unconfirmed optimistic edit.
  fn resolve(&self, entry: &CacheEntry, now: DateTime<Utc>) -> CacheEntry {
    let mut entry = entry.clone();
    if entry.status == CacheStatus::Fresh && !entry.optimistic {
      let expired = entry
        .last_fetched_at
        .map(|at| now - at > self.stale_time_for(&entry.key))
        .unwrap_or(true);
      if expired {
        entry.status = CacheStatus::Stale;
      }
    }
    entry
  }

  /// Current entry for a key. No side effects.
  pub fn read(&self, key: &QueryKey) -> Option<CacheEntry> {
    let now = self.clock.now();
    let inner = self.lock();
    inner.slots.get(key).map(|slot| self.resolve(&slot.entry, now))
  }

  /// Store server data for a key, superseding any fetch in flight.
  pub fn write(&self, key: &QueryKey, data: Value) {
    let now = self.clock.now();
    let (callbacks, entry) = {
      let mut inner = self.lock();
      let generation = inner.bump_generation();
      let slot = inner.slot_mut(key, now);
      slot.generation = generation;
      slot.status_before_fetch = None;
      slot.stale_on_arrival = false;
      slot.entry.data = Some(data);
      slot.entry.status = CacheStatus::Fresh;
      slot.entry.last_fetched_at = Some(now);
      slot.entry.error = None;
      slot.entry.optimistic = false;
      let entry = slot.entry.clone();
      (inner.callbacks(key), entry)
    };
    self.notify(callbacks, CacheEvent::Written(entry));
  }

  /// Apply a local change to a key's data.
  ///
  /// Returns `false` (and does nothing) when the key has no data.
  pub fn patch(&self, key: &QueryKey, f: impl FnOnce(Value) -> Value) -> bool {
    let (callbacks, entry) = {
      let mut inner = self.lock();
      let Some(slot) = inner.slots.get_mut(key) else {
        return false;
      };
      let Some(data) = slot.entry.data.take() else {
        return false;
      };
      slot.entry.data = Some(f(data));
      slot.entry.status = CacheStatus::Fresh;
      slot.entry.optimistic = true;
      let entry = slot.entry.clone();
      (inner.callbacks(key), entry)
    };
    self.notify(callbacks, CacheEvent::Patched(entry));
    true
  }

  /// Mark every matching entry stale. Nothing is refetched here.
  pub fn invalidate(&self, filter: &KeyFilter) -> Vec<QueryKey> {
    let mut events = Vec::new();
    {
      let mut inner = self.lock();
      let keys: Vec<QueryKey> = inner
        .slots
        .keys()
        .filter(|key| filter.matches(key))
        .cloned()
        .collect();
      for key in keys {
        let Some(slot) = inner.slots.get_mut(&key) else {
          continue;
        };
        if slot.entry.status == CacheStatus::Fetching {
          slot.stale_on_arrival = true;
        } else {
          slot.entry.status = CacheStatus::Stale;
        }
        slot.entry.optimistic = false;
        let entry = slot.entry.clone();
        events.push((inner.callbacks(&key), entry));
      }
    }

    let keys = events.iter().map(|(_, e)| e.key.clone()).collect();
    for (callbacks, entry) in events {
      debug!("Invalidated {}", entry.key);
      self.notify(callbacks, CacheEvent::Invalidated(entry));
    }
    keys
  }

  /// Listen for changes to a key until the returned subscription is dropped.
  pub fn subscribe<F>(self: &Arc<Self>, key: &QueryKey, callback: F) -> Subscription
  where
    F: Fn(&CacheEvent) + Send + Sync + 'static,
  {
    let mut inner = self.lock();
    let id = inner.next_subscriber_id;
    inner.next_subscriber_id += 1;
    inner
      .subscribers
      .entry(key.clone())
      .or_default()
      .insert(id, Arc::new(callback));
    if let Some(slot) = inner.slots.get_mut(key) {
      slot.idle_since = None;
    }

    Subscription {
      cache: Arc::downgrade(self),
      key: key.clone(),
      id: Some(id),
    }
  }

  fn unsubscribe(&self, key: &QueryKey, id: u64) {
    let now = self.clock.now();
    let mut inner = self.lock();
    let now_empty = match inner.subscribers.get_mut(key) {
      Some(subs) => {
        subs.remove(&id);
        subs.is_empty()
      }
      None => false,
    };
    if now_empty {
      inner.subscribers.remove(key);
      if let Some(slot) = inner.slots.get_mut(key) {
        slot.idle_since = Some(now);
      }
    }
  }

  pub fn subscriber_count(&self, key: &QueryKey) -> usize {
    self.lock().subscribers.get(key).map_or(0, HashMap::len)
  }

  /// Start a fetch for a key, creating the entry on first reference.
  ///
  /// Any fetch already in flight for the key is superseded.
  pub fn begin_fetch(&self, key: &QueryKey) -> FetchTicket {
    let now = self.clock.now();
    let mut inner = self.lock();
    let existed = inner.slots.contains_key(key);
    let generation = inner.bump_generation();
    let slot = inner.slot_mut(key, now);
    if slot.entry.status != CacheStatus::Fetching {
      slot.status_before_fetch = existed.then_some(slot.entry.status);
    }
    slot.generation = generation;
    slot.stale_on_arrival = false;
    slot.entry.status = CacheStatus::Fetching;

    FetchTicket {
      key: key.clone(),
      generation: slot.generation,
    }
  }

  /// Whether a ticket still belongs to the latest fetch of its key.
  pub fn is_current(&self, ticket: &FetchTicket) -> bool {
    self
      .lock()
      .slots
      .get(&ticket.key)
      .is_some_and(|slot| slot.generation == ticket.generation)
  }

  /// Apply a fetch result. Returns `false` if the fetch was superseded or
  /// cancelled, in which case the cache is left untouched.
  pub fn complete_fetch(&self, ticket: &FetchTicket, data: Value) -> bool {
    let now = self.clock.now();
    let (callbacks, entry) = {
      let mut inner = self.lock();
      let Some(slot) = inner.slots.get_mut(&ticket.key) else {
        debug!("Discarding fetch result for evicted {}", ticket.key);
        return false;
      };
      if slot.generation != ticket.generation {
        debug!("Discarding superseded fetch result for {}", ticket.key);
        return false;
      }
      slot.entry.data = Some(data);
      slot.entry.status = if slot.stale_on_arrival {
        CacheStatus::Stale
      } else {
        CacheStatus::Fresh
      };
      slot.entry.last_fetched_at = Some(now);
      slot.entry.error = None;
      slot.entry.optimistic = false;
      slot.stale_on_arrival = false;
      slot.status_before_fetch = None;
      let entry = slot.entry.clone();
      (inner.callbacks(&ticket.key), entry)
    };
    self.notify(callbacks, CacheEvent::Written(entry));
    true
  }

  /// Record a failed fetch, keeping whatever data the entry already had.
  pub fn fail_fetch(&self, ticket: &FetchTicket, error: Error) -> bool {
    let (callbacks, entry) = {
      let mut inner = self.lock();
      let Some(slot) = inner.slots.get_mut(&ticket.key) else {
        return false;
      };
      if slot.generation != ticket.generation {
        debug!("Discarding superseded fetch error for {}", ticket.key);
        return false;
      }
      slot.entry.status = CacheStatus::Error;
      slot.entry.error = Some(error);
      slot.entry.optimistic = false;
      slot.stale_on_arrival = false;
      slot.status_before_fetch = None;
      let entry = slot.entry.clone();
      (inner.callbacks(&ticket.key), entry)
    };
    self.notify(callbacks, CacheEvent::Failed(entry));
    true
  }

  /// Abandon any fetch in flight for a key; its result will be discarded.
  ///
  /// The entry goes back to the status it had before the fetch. An entry
  /// that only existed because of the fetch is removed.
  pub fn cancel_fetches(&self, key: &QueryKey) {
    self.cancel(key, None);
  }

  /// Abandon one fetch. A no-op if a newer fetch has already superseded it.
  pub fn abandon_fetch(&self, ticket: &FetchTicket) {
    self.cancel(&ticket.key, Some(ticket.generation));
  }

  fn cancel(&self, key: &QueryKey, generation: Option<u64>) {
    let removed = {
      let mut inner = self.lock();
      let next = inner.bump_generation();
      let Some(slot) = inner.slots.get_mut(key) else {
        return;
      };
      if slot.entry.status != CacheStatus::Fetching {
        return;
      }
      if generation.is_some_and(|g| g != slot.generation) {
        return;
      }
      slot.generation = next;
      slot.stale_on_arrival = false;
      match slot.status_before_fetch.take() {
        Some(status) => {
          slot.entry.status = status;
          None
        }
        None if slot.entry.data.is_none() => {
          inner.slots.remove(key);
          Some(inner.callbacks(key))
        }
        None => {
          slot.entry.status = CacheStatus::Stale;
          None
        }
      }
    };
    debug!("Cancelled in-flight fetch for {}", key);
    if let Some(callbacks) = removed {
      self.notify(callbacks, CacheEvent::Removed(key.clone()));
    }
  }

  /// Verbatim copy of an entry, for later [`restore`](Self::restore).
  pub fn snapshot(&self, key: &QueryKey) -> Option<CacheEntry> {
    self.lock().slots.get(key).map(|slot| slot.entry.clone())
  }

  /// Put an entry back exactly as captured. Restoring `None` removes it.
  pub fn restore(&self, key: &QueryKey, snapshot: Option<CacheEntry>) {
    let now = self.clock.now();
    let callbacks = {
      let mut inner = self.lock();
      match &snapshot {
        Some(entry) => {
          let slot = inner.slot_mut(key, now);
          slot.entry = entry.clone();
          slot.stale_on_arrival = false;
        }
        None => {
          inner.slots.remove(key);
        }
      }
      inner.callbacks(key)
    };
    self.notify(callbacks, CacheEvent::Restored(snapshot));
  }

  /// Keys currently cached that match a filter.
  pub fn keys_matching(&self, filter: &KeyFilter) -> Vec<QueryKey> {
    let mut keys: Vec<QueryKey> = self
      .lock()
      .slots
      .keys()
      .filter(|key| filter.matches(key))
      .cloned()
      .collect();
    keys.sort();
    keys
  }

  /// Keys with at least one subscriber whose data is no longer fresh.
  pub fn stale_subscribed_keys(&self) -> Vec<QueryKey> {
    let now = self.clock.now();
    let inner = self.lock();
    let mut keys: Vec<QueryKey> = inner
      .slots
      .iter()
      .filter(|(key, _)| inner.has_subscribers(key))
      .filter(|(_, slot)| {
        matches!(
          self.resolve(&slot.entry, now).status,
          CacheStatus::Stale | CacheStatus::Error
        )
      })
      .map(|(key, _)| key.clone())
      .collect();
    keys.sort();
    keys
  }

  /// Drop entries that have had no subscribers for longer than the GC window.
  pub fn collect_garbage(&self) -> usize {
    let now = self.clock.now();
    let gc_time = self.options.gc_time;
    let removed: Vec<(QueryKey, Vec<Callback>)> = {
      let mut inner = self.lock();
      let expired: Vec<QueryKey> = inner
        .slots
        .iter()
        .filter(|(key, slot)| {
          !inner.has_subscribers(key) && slot.idle_since.is_some_and(|since| now - since > gc_time)
        })
        .map(|(key, _)| key.clone())
        .collect();
      expired
        .into_iter()
        .map(|key| {
          inner.slots.remove(&key);
          let callbacks = inner.callbacks(&key);
          (key, callbacks)
        })
        .collect()
    };

    let count = removed.len();
    for (key, callbacks) in removed {
      debug!("Evicted {}", key);
      self.notify(callbacks, CacheEvent::Removed(key));
    }
    count
  }

  pub fn keys(&self) -> Vec<QueryKey> {
    let mut keys: Vec<QueryKey> = self.lock().slots.keys().cloned().collect();
    keys.sort();
    keys
  }

  pub fn len(&self) -> usize {
    self.lock().slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drop every entry. Subscriptions stay registered.
  pub fn clear(&self) {
    let removed: Vec<(QueryKey, Vec<Callback>)> = {
      let mut inner = self.lock();
      let keys: Vec<QueryKey> = inner.slots.drain().map(|(key, _)| key).collect();
      keys
        .into_iter()
        .map(|key| {
          let callbacks = inner.callbacks(&key);
          (key, callbacks)
        })
        .collect()
    };
    for (key, callbacks) in removed {
      self.notify(callbacks, CacheEvent::Removed(key));
    }
  }
}

impl std::fmt::Debug for QueryCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryCache")
      .field("entries", &self.len())
      .field("options", &self.options)
      .finish_non_exhaustive()
  }
}

/// Handle that keeps a subscriber registered.
///
/// Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
  cache: Weak<QueryCache>,
  key: QueryKey,
  id: Option<u64>,
}

impl Subscription {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn unsubscribe(mut self) {
    self.detach();
  }

  fn detach(&mut self) {
    if let (Some(id), Some(cache)) = (self.id.take(), self.cache.upgrade()) {
      cache.unsubscribe(&self.key, id);
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.detach();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use serde_json::json;
  use std::sync::Mutex as StdMutex;

  fn cache_with_clock() -> (Arc<QueryCache>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let cache = Arc::new(QueryCache::with_clock(CacheOptions::default(), clock.clone()));
    (cache, clock)
  }

  fn rows() -> Value {
    json!([{ "id": 1, "name": "A" }, { "id": 2, "name": "B" }])
  }

  #[test]
  fn test_read_missing_is_none() {
    let (cache, _) = cache_with_clock();
    assert!(cache.read(&QueryKey::all("product")).is_none());
  }

  #[test]
  fn test_write_then_read_is_fresh() {
    let (cache, clock) = cache_with_clock();
    let key = QueryKey::all("product");

    cache.write(&key, rows());

    let entry = cache.read(&key).unwrap();
    assert_eq!(entry.status, CacheStatus::Fresh);
    assert_eq!(entry.data, Some(rows()));
    assert_eq!(entry.last_fetched_at, Some(clock.now()));
  }

  #[test]
  fn test_entry_goes_stale_after_stale_time() {
    let (cache, clock) = cache_with_clock();
    let key = QueryKey::all("product");
    cache.write(&key, rows());

    clock.advance_ms(600_000);
    assert!(cache.read(&key).unwrap().is_fresh());

    clock.advance_ms(1);
    let entry = cache.read(&key).unwrap();
    assert!(entry.is_stale());
    assert_eq!(entry.data, Some(rows()));
  }

  #[test]
  fn test_stale_time_override_per_resource() {
    let clock = Arc::new(ManualClock::new());
    let mut options = CacheOptions::default();
    options
      .stale_time_overrides
      .insert("order".to_string(), Duration::seconds(30));
    let cache = QueryCache::with_clock(options, clock.clone());

    cache.write(&QueryKey::all("order"), json!([]));
    cache.write(&QueryKey::all("product"), json!([]));
    clock.advance_ms(31_000);

    assert!(cache.read(&QueryKey::all("order")).unwrap().is_stale());
    assert!(cache.read(&QueryKey::all("product")).unwrap().is_fresh());
  }

  #[test]
  fn test_patch_applies_and_marks_fresh() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("product");
    cache.write(&key, rows());
    cache.invalidate(&KeyFilter::Exact(key.clone()));

    let applied = cache.patch(&key, |_| json!([{ "id": 1, "name": "A" }]));

    assert!(applied);
    let entry = cache.read(&key).unwrap();
    assert!(entry.is_fresh());
    assert_eq!(entry.data, Some(json!([{ "id": 1, "name": "A" }])));
  }

  #[test]
  fn test_patched_entry_stays_fresh_past_stale_time() {
    let (cache, clock) = cache_with_clock();
    let key = QueryKey::all("product");
    cache.write(&key, rows());
    clock.advance_ms(700_000);
    assert!(cache.read(&key).unwrap().is_stale());

    cache.patch(&key, |_| json!([{ "id": 1, "name": "A" }]));
    let entry = cache.read(&key).unwrap();
    assert!(entry.is_fresh());
    assert!(entry.optimistic);
    assert_eq!(entry.last_fetched_at, Some(DateTime::<Utc>::UNIX_EPOCH));

    clock.advance_ms(700_000);
    assert!(cache.read(&key).unwrap().is_fresh());

    cache.invalidate(&KeyFilter::Exact(key.clone()));
    let entry = cache.read(&key).unwrap();
    assert!(entry.is_stale());
    assert!(!entry.optimistic);
  }

  #[test]
  fn test_restoring_pre_patch_snapshot_drops_optimistic_hold() {
    let (cache, clock) = cache_with_clock();
    let key = QueryKey::all("product");
    cache.write(&key, rows());
    clock.advance_ms(700_000);
    let before = cache.snapshot(&key);

    cache.patch(&key, |_| json!([]));
    cache.restore(&key, before);

    assert!(cache.read(&key).unwrap().is_stale());
  }

  #[test]
  fn test_patch_absent_is_noop() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("product");

    assert!(!cache.patch(&key, |_| json!([])));
    assert!(cache.read(&key).is_none());
  }

  #[test]
  fn test_cache_coherence_over_sequence() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("brand");

    cache.write(&key, json!([1]));
    cache.patch(&key, |_| json!([1, 2]));
    assert_eq!(cache.read(&key).unwrap().data, Some(json!([1, 2])));

    cache.invalidate(&KeyFilter::Resource("brand".into()));
    let entry = cache.read(&key).unwrap();
    assert!(entry.is_stale());
    assert_eq!(entry.data, Some(json!([1, 2])));

    cache.write(&key, json!([3]));
    let entry = cache.read(&key).unwrap();
    assert!(entry.is_fresh());
    assert_eq!(entry.data, Some(json!([3])));
  }

  #[test]
  fn test_invalidate_respects_filter() {
    let (cache, _) = cache_with_clock();
    let list = QueryKey::all("order");
    let detail = QueryKey::detail("order", "9");
    let other = QueryKey::all("user");
    for key in [&list, &detail, &other] {
      cache.write(key, json!([]));
    }

    let touched = cache.invalidate(&KeyFilter::Lists("order".into()));

    assert_eq!(touched, vec![list.clone()]);
    assert!(cache.read(&list).unwrap().is_stale());
    assert!(cache.read(&detail).unwrap().is_fresh());
    assert!(cache.read(&other).unwrap().is_fresh());
  }

  #[test]
  fn test_subscribers_see_every_change() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("color");
    let seen = Arc::new(StdMutex::new(Vec::new()));

    let sink = seen.clone();
    let sub = cache.subscribe(&key, move |event| {
      let kind = match event {
        CacheEvent::Written(_) => "written",
        CacheEvent::Patched(_) => "patched",
        CacheEvent::Invalidated(_) => "invalidated",
        _ => "other",
      };
      sink.lock().unwrap().push(kind);
    });
    assert_eq!(cache.subscriber_count(&key), 1);

    cache.write(&key, json!([]));
    cache.patch(&key, |v| v);
    cache.invalidate(&KeyFilter::Exact(key.clone()));
    cache.write(&QueryKey::all("brand"), json!([]));

    assert_eq!(*seen.lock().unwrap(), vec!["written", "patched", "invalidated"]);

    sub.unsubscribe();
    assert_eq!(cache.subscriber_count(&key), 0);
    cache.write(&key, json!([]));
    assert_eq!(seen.lock().unwrap().len(), 3);
  }

  #[test]
  fn test_callback_can_read_cache() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("color");
    let observed = Arc::new(StdMutex::new(None));

    let reader = cache.clone();
    let sink = observed.clone();
    let read_key = key.clone();
    let _sub = cache.subscribe(&key, move |_| {
      *sink.lock().unwrap() = reader.read(&read_key).and_then(|e| e.data);
    });

    cache.write(&key, json!(["red"]));
    assert_eq!(*observed.lock().unwrap(), Some(json!(["red"])));
  }

  #[test]
  fn test_gc_evicts_only_idle_entries() {
    let (cache, clock) = cache_with_clock();
    let idle = QueryKey::all("occasion");
    let watched = QueryKey::all("recipient");
    cache.write(&idle, json!([]));
    cache.write(&watched, json!([]));
    let _sub = cache.subscribe(&watched, |_| {});

    clock.advance(Duration::minutes(59));
    assert_eq!(cache.collect_garbage(), 0);

    clock.advance(Duration::minutes(2));
    assert_eq!(cache.collect_garbage(), 1);
    assert!(cache.read(&idle).is_none());
    assert!(cache.read(&watched).is_some());
  }

  #[test]
  fn test_gc_window_restarts_when_last_subscriber_leaves() {
    let (cache, clock) = cache_with_clock();
    let key = QueryKey::all("packaging");
    cache.write(&key, json!([]));
    let sub = cache.subscribe(&key, |_| {});

    clock.advance(Duration::hours(2));
    drop(sub);
    assert_eq!(cache.collect_garbage(), 0);

    clock.advance(Duration::minutes(61));
    assert_eq!(cache.collect_garbage(), 1);
  }

  #[test]
  fn test_superseded_fetch_does_not_write() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("product");

    let first = cache.begin_fetch(&key);
    let second = cache.begin_fetch(&key);

    assert!(cache.complete_fetch(&second, json!(["new"])));
    assert!(!cache.complete_fetch(&first, json!(["old"])));
    assert_eq!(cache.read(&key).unwrap().data, Some(json!(["new"])));
  }

  #[test]
  fn test_cancelled_fetch_does_not_write() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("product");
    cache.write(&key, json!(["kept"]));
    cache.invalidate(&KeyFilter::Exact(key.clone()));

    let ticket = cache.begin_fetch(&key);
    cache.cancel_fetches(&key);

    assert!(!cache.is_current(&ticket));
    assert!(!cache.complete_fetch(&ticket, json!(["late"])));
    let entry = cache.read(&key).unwrap();
    assert!(entry.is_stale());
    assert_eq!(entry.data, Some(json!(["kept"])));
  }

  #[test]
  fn test_abandoning_superseded_ticket_is_noop() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("product");

    let old = cache.begin_fetch(&key);
    let current = cache.begin_fetch(&key);
    cache.abandon_fetch(&old);

    assert!(cache.is_current(&current));
    assert!(cache.read(&key).unwrap().is_fetching());
  }

  #[test]
  fn test_recreated_entry_rejects_old_ticket() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("product");

    let cancelled = cache.begin_fetch(&key);
    cache.cancel_fetches(&key);
    let current = cache.begin_fetch(&key);

    assert!(!cache.complete_fetch(&cancelled, json!(["old"])));
    assert!(cache.complete_fetch(&current, json!(["new"])));
    assert_eq!(cache.read(&key).unwrap().data, Some(json!(["new"])));
  }

  #[test]
  fn test_cancelling_first_fetch_removes_entry() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("product");

    cache.begin_fetch(&key);
    cache.cancel_fetches(&key);

    assert!(cache.read(&key).is_none());
  }

  #[test]
  fn test_failed_fetch_keeps_data() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("user");
    cache.write(&key, json!(["alice"]));

    let ticket = cache.begin_fetch(&key);
    let error = Error::Transport("offline".into());
    assert!(cache.fail_fetch(&ticket, error.clone()));

    let entry = cache.read(&key).unwrap();
    assert!(entry.is_error());
    assert_eq!(entry.error, Some(error));
    assert_eq!(entry.data, Some(json!(["alice"])));

    let retry = cache.begin_fetch(&key);
    cache.complete_fetch(&retry, json!(["alice", "bob"]));
    let entry = cache.read(&key).unwrap();
    assert!(entry.is_fresh());
    assert!(entry.error.is_none());
  }

  #[test]
  fn test_invalidate_during_fetch_lands_stale() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("order");

    let ticket = cache.begin_fetch(&key);
    cache.invalidate(&KeyFilter::Resource("order".into()));
    assert!(cache.complete_fetch(&ticket, json!([])));

    assert!(cache.read(&key).unwrap().is_stale());
  }

  #[test]
  fn test_restore_is_exact() {
    let (cache, clock) = cache_with_clock();
    let key = QueryKey::all("product");
    cache.write(&key, rows());
    clock.advance_ms(5_000);
    cache.invalidate(&KeyFilter::Exact(key.clone()));
    let before = cache.snapshot(&key);

    cache.patch(&key, |_| json!([]));
    cache.restore(&key, before.clone());

    assert_eq!(cache.snapshot(&key), before);
  }

  #[test]
  fn test_restore_none_removes() {
    let (cache, _) = cache_with_clock();
    let key = QueryKey::all("product");
    cache.write(&key, rows());

    cache.restore(&key, None);
    assert!(cache.read(&key).is_none());
  }
}
