//! Synchronization controller: the one entry point callers use.
//!
//! Reads go cache-first with stale-while-revalidate; mutations go through a
//! single path that patches optimistically, calls the server, then either
//! invalidates or rolls back.

use backon::{ExponentialBuilder, Retryable};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::mutation::{Mutation, MutationKind, OptimisticRollback, PendingMutation};
use super::options::{RefetchOnMount, SyncOptions};
use super::result::QueryResult;
use crate::cache::{CacheEvent, CacheStatus, FetchTicket, KeyFilter, QueryCache, QueryKey, Subscription};
use crate::entity::ResourceInfo;
use crate::error::{Error, Result};
use crate::remote::{unwrap_data, RemoteResource};

/// Orchestrates the query cache and the remote client.
///
/// Cheap to clone; clones share the same cache and client.
#[derive(Clone)]
pub struct SyncController {
  cache: Arc<QueryCache>,
  remote: Arc<dyn RemoteResource>,
  options: Arc<SyncOptions>,
}

/// Abandons a foreground fetch if the read awaiting it is dropped.
struct FetchGuard<'a> {
  cache: &'a QueryCache,
  ticket: FetchTicket,
  armed: bool,
}

impl FetchGuard<'_> {
  fn disarm(mut self) -> FetchTicket {
    self.armed = false;
    self.ticket.clone()
  }
}

impl Drop for FetchGuard<'_> {
  fn drop(&mut self) {
    if self.armed {
      debug!("Read of {} dropped before its fetch resolved", self.ticket.key);
      self.cache.abandon_fetch(&self.ticket);
    }
  }
}

impl SyncController {
  pub fn new(cache: Arc<QueryCache>, remote: Arc<dyn RemoteResource>, options: SyncOptions) -> Self {
    Self {
      cache,
      remote,
      options: Arc::new(options),
    }
  }

  /// Controller with its own cache, built from the options.
  pub fn with_remote(remote: Arc<dyn RemoteResource>, options: SyncOptions) -> Self {
    let cache = Arc::new(QueryCache::new(options.cache_options()));
    Self::new(cache, remote, options)
  }

  pub fn cache(&self) -> &Arc<QueryCache> {
    &self.cache
  }

  pub fn options(&self) -> &SyncOptions {
    &self.options
  }

  // ==========================================================================
  // Read path
  // ==========================================================================

  /// Read a key, fetching when there is nothing usable cached.
  ///
  /// - No data yet: fetch now and wait for it, or wait for the fetch another
  ///   reader already started.
  /// - Stale or failed data: return it immediately, refetch in the background.
  /// - Fresh data: return it (and refetch in the background only with
  ///   `refetch_on_mount: always`).
  pub async fn query(&self, key: &QueryKey) -> QueryResult<Value> {
    loop {
      match self.cache.read(key) {
        Some(entry) if entry.has_data() => {
          let wants_refetch = match entry.status {
            CacheStatus::Fresh => self.options.refetch_on_mount == RefetchOnMount::Always,
            CacheStatus::Stale | CacheStatus::Error => true,
            CacheStatus::Fetching => false,
          };
          if wants_refetch {
            self.spawn_refetch(key);
          } else {
            debug!("Cache hit for {}", key);
          }
          let revalidating = wants_refetch || entry.is_fetching();
          return QueryResult::from_entry(entry, revalidating);
        }
        Some(entry) if entry.is_fetching() => {
          debug!("Joining in-flight fetch of {}", key);
          if let Some(result) = self.join_fetch(key).await {
            return result;
          }
          // The fetch was abandoned; look again
        }
        _ => {
          debug!("Cache miss for {}", key);
          return self.fetch_now(key).await;
        }
      }
    }
  }

  /// Wait until the fetch in flight for a key settles. `None` if the entry
  /// disappeared meanwhile.
  async fn join_fetch(&self, key: &QueryKey) -> Option<QueryResult<Value>> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = self.cache.subscribe(key, move |_| {
      let _ = tx.send(());
    });
    loop {
      match self.cache.read(key) {
        Some(entry) if !entry.is_fetching() => return Some(QueryResult::from_entry(entry, false)),
        Some(_) => {}
        None => return None,
      }
      rx.recv().await?;
    }
  }

  /// Read a key and project its data.
  pub async fn query_with<T>(&self, key: &QueryKey, project: impl FnOnce(&Value) -> T) -> QueryResult<T> {
    self.query(key).await.map(|data| project(&data))
  }

  /// Fetch a key now, whatever its state, and wait for the result.
  pub async fn refetch(&self, key: &QueryKey) -> QueryResult<Value> {
    self.fetch_now(key).await
  }

  /// Abandon any fetch in flight for a key. Its result will not be cached.
  pub fn cancel(&self, key: &QueryKey) {
    self.cache.cancel_fetches(key);
  }

  /// Mark entries stale; they refetch on their next read.
  pub fn invalidate(&self, filter: &KeyFilter) -> Vec<QueryKey> {
    self.cache.invalidate(filter)
  }

  pub fn subscribe<F>(&self, key: &QueryKey, callback: F) -> Subscription
  where
    F: Fn(&CacheEvent) + Send + Sync + 'static,
  {
    self.cache.subscribe(key, callback)
  }

  /// The window regained focus: refetch whatever is watched and stale.
  ///
  /// Returns how many refetches were started.
  pub fn on_window_focus(&self) -> usize {
    if !self.options.refetch_on_window_focus {
      return 0;
    }
    let keys = self.cache.stale_subscribed_keys();
    for key in &keys {
      self.spawn_refetch(key);
    }
    keys.len()
  }

  /// Periodically evict unwatched entries. Stops once the cache is dropped.
  pub fn spawn_gc(&self, every: Duration) -> JoinHandle<()> {
    let cache = Arc::downgrade(&self.cache);
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(every);
      loop {
        interval.tick().await;
        let Some(cache) = cache.upgrade() else {
          break;
        };
        let evicted = cache.collect_garbage();
        if evicted > 0 {
          debug!("Evicted {} idle cache entries", evicted);
        }
      }
    })
  }

  async fn fetch_now(&self, key: &QueryKey) -> QueryResult<Value> {
    let guard = FetchGuard {
      cache: &self.cache,
      ticket: self.cache.begin_fetch(key),
      armed: true,
    };
    let result = self.fetch_remote(key).await;
    let ticket = guard.disarm();

    let applied = self.settle(&ticket, &result);
    match (self.cache.read(key), result) {
      (Some(entry), _) if applied || entry.has_data() => QueryResult::from_entry(entry, false),
      (_, Err(error)) => QueryResult::failed(key.clone(), error),
      (_, Ok(_)) => QueryResult::pending(key.clone()),
    }
  }

  /// Start a refetch without waiting for it. Returns `false` if one is
  /// already running for the key.
  fn spawn_refetch(&self, key: &QueryKey) -> bool {
    if self.cache.read(key).is_some_and(|entry| entry.is_fetching()) {
      return false;
    }
    let ticket = self.cache.begin_fetch(key);
    debug!("Revalidating {} in the background", key);

    let this = self.clone();
    tokio::spawn(async move {
      let result = this.fetch_remote(&ticket.key).await;
      this.settle(&ticket, &result);
    });
    true
  }

  /// Record a fetch outcome in the cache, unless the fetch was superseded.
  fn settle(&self, ticket: &FetchTicket, result: &Result<Value>) -> bool {
    match result {
      Ok(data) => self.cache.complete_fetch(ticket, data.clone()),
      Err(error) => {
        warn!("Fetching {} failed: {}", ticket.key, error);
        self.cache.fail_fetch(ticket, error.clone())
      }
    }
  }

  /// One read against the server, retried on transient failures.
  async fn fetch_remote(&self, key: &QueryKey) -> Result<Value> {
    let attempt = || async {
      let body = match key.detail_id() {
        Some(id) => self.remote.get(&key.resource, id).await?,
        None => self.remote.list(&key.resource, &key.query_pairs()).await?,
      };
      unwrap_data(body, &key.description())
    };

    attempt
      .retry(
        ExponentialBuilder::default()
          .with_min_delay(self.options.retry_delay())
          .with_max_times(self.options.retry_count),
      )
      .when(Error::is_retryable)
      .notify(|e, after| {
        warn!(
          "Fetching {} failed, retrying after {:.2}s: {}",
          key,
          after.as_secs_f64(),
          e
        )
      })
      .await
  }

  // ==========================================================================
  // Mutation path
  // ==========================================================================

  /// The mutation for `kind` on a resource, targeting every cached list of
  /// it and, for updates and deletes, the entity's detail entry.
  pub fn prepare(&self, info: &ResourceInfo, kind: MutationKind) -> Mutation {
    let lists = KeyFilter::Lists(info.name.to_string());
    let mut targets = self.cache.keys_matching(&lists);
    if let Some(id) = kind.id() {
      targets.push(QueryKey::detail(info.name, id));
    }
    Mutation::for_info(info, kind).targets(targets).related(lists)
  }

  /// Run a mutation to completion.
  ///
  /// The work runs on its own task: dropping the returned future does not
  /// cancel the server call, nor the rollback or invalidation after it.
  pub async fn mutate(&self, mutation: Mutation) -> Result<Value> {
    let this = self.clone();
    let task = tokio::spawn(async move { this.run_mutation(mutation).await });
    match task.await {
      Ok(result) => result,
      Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
      Err(e) => Err(Error::Transport(format!("mutation task did not finish: {}", e))),
    }
  }

  async fn run_mutation(&self, mutation: Mutation) -> Result<Value> {
    let pending = PendingMutation::begin(&self.cache, &mutation);

    let resource = mutation.resource.as_str();
    let result = match &mutation.kind {
      MutationKind::Create { payload } => {
        self
          .remote
          .create(resource, mutation.encoding, payload)
          .await
      }
      MutationKind::Update { id, payload } => {
        self
          .remote
          .update(resource, id, mutation.encoding, payload)
          .await
      }
      MutationKind::Delete { id } => self.remote.remove(resource, id).await,
    };

    match result {
      Ok(body) => {
        pending.commit();
        let mut invalidated = 0;
        for filter in mutation.invalidations() {
          invalidated += self.cache.invalidate(&filter).len();
        }
        info!(
          "{} {}{} confirmed; invalidated {} cache entries",
          mutation.kind.verb(),
          resource,
          mutation
            .kind
            .id()
            .map(|id| format!(" {}", id))
            .unwrap_or_default(),
          invalidated
        );
        Ok(body)
      }
      Err(cause) => {
        let signal = OptimisticRollback {
          verb: mutation.kind.verb(),
          resource: mutation.resource.clone(),
          keys: pending.keys(),
          cause,
        };
        if signal.keys.is_empty() {
          warn!("{} {} failed: {}", signal.verb, signal.resource, signal.cause);
        } else {
          warn!("{}", signal);
        }
        pending.rollback(&self.cache);
        Err(signal.cause)
      }
    }
  }
}

impl std::fmt::Debug for SyncController {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SyncController")
      .field("cache", &self.cache)
      .field("options", &self.options)
      .finish_non_exhaustive()
  }
}
