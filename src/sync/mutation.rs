//! Mutations and their optimistic bookkeeping.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheEntry, KeyFilter, QueryCache, QueryKey};
use crate::entity::{merge_row, remove_row, Resource, ResourceInfo};
use crate::error::Error;
use crate::remote::{Encoding, Payload};

/// The write a mutation performs.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
  Create { payload: Payload },
  Update { id: String, payload: Payload },
  Delete { id: String },
}

impl MutationKind {
  pub fn verb(&self) -> &'static str {
    match self {
      Self::Create { .. } => "create",
      Self::Update { .. } => "update",
      Self::Delete { .. } => "delete",
    }
  }

  pub fn id(&self) -> Option<&str> {
    match self {
      Self::Create { .. } => None,
      Self::Update { id, .. } | Self::Delete { id } => Some(id.as_str()),
    }
  }
}

/// A write against one resource, plus the cache keys it affects.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
  pub resource: String,
  pub encoding: Encoding,
  /// Identifier field consulted when rows carry no `id`
  pub secondary_id: Option<String>,
  pub kind: MutationKind,
  /// Keys patched optimistically, then invalidated on success
  pub target_keys: Vec<QueryKey>,
  /// Further entries invalidated on success
  pub related: Vec<KeyFilter>,
}

impl Mutation {
  pub fn new(resource: impl Into<String>, kind: MutationKind) -> Self {
    Self {
      resource: resource.into(),
      encoding: Encoding::Json,
      secondary_id: None,
      kind,
      target_keys: Vec::new(),
      related: Vec::new(),
    }
  }

  /// A mutation on the described resource, with its encoding and
  /// identifier fields filled in.
  pub fn for_info(info: &ResourceInfo, kind: MutationKind) -> Self {
    Self {
      encoding: info.encoding,
      secondary_id: info.secondary_id.map(String::from),
      ..Self::new(info.name, kind)
    }
  }

  pub fn of<R: Resource>(kind: MutationKind) -> Self {
    Self::for_info(&ResourceInfo::of::<R>(), kind)
  }

  pub fn create(resource: impl Into<String>, payload: Payload) -> Self {
    Self::new(resource, MutationKind::Create { payload })
  }

  pub fn update(resource: impl Into<String>, id: impl Into<String>, payload: Payload) -> Self {
    Self::new(
      resource,
      MutationKind::Update {
        id: id.into(),
        payload,
      },
    )
  }

  pub fn delete(resource: impl Into<String>, id: impl Into<String>) -> Self {
    Self::new(resource, MutationKind::Delete { id: id.into() })
  }

  pub fn encoding(mut self, encoding: Encoding) -> Self {
    self.encoding = encoding;
    self
  }

  pub fn secondary_id(mut self, field: impl Into<String>) -> Self {
    self.secondary_id = Some(field.into());
    self
  }

  pub fn target(mut self, key: QueryKey) -> Self {
    if !self.target_keys.contains(&key) {
      self.target_keys.push(key);
    }
    self
  }

  pub fn targets(self, keys: impl IntoIterator<Item = QueryKey>) -> Self {
    keys.into_iter().fold(self, Self::target)
  }

  pub fn related(mut self, filter: impl Into<KeyFilter>) -> Self {
    self.related.push(filter.into());
    self
  }

  /// Local edit matching this mutation. Creates have none: the server
  /// assigns the identifier.
  pub(crate) fn optimistic_patch(&self) -> Option<Patch> {
    let secondary = self.secondary_id.clone();
    match &self.kind {
      MutationKind::Create { .. } => None,
      MutationKind::Delete { id } => {
        let id = id.clone();
        Some(Arc::new(move |data| remove_row(data, &id, secondary.as_deref())))
      }
      MutationKind::Update { id, payload } => {
        let id = id.clone();
        let fields = payload.fields.clone();
        Some(Arc::new(move |data| {
          merge_row(data, &id, secondary.as_deref(), &fields)
        }))
      }
    }
  }

  /// Everything to invalidate once the server has confirmed the write.
  pub(crate) fn invalidations(&self) -> Vec<KeyFilter> {
    self
      .target_keys
      .iter()
      .cloned()
      .map(KeyFilter::Exact)
      .chain(self.related.iter().cloned())
      .collect()
  }
}

pub(crate) type Patch = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Snapshots taken for one in-flight mutation.
///
/// Only keys the patch actually changed are captured, so restoring them
/// touches nothing else.
pub(crate) struct PendingMutation {
  snapshot: Vec<(QueryKey, Option<CacheEntry>)>,
}

impl PendingMutation {
  /// Snapshot each target key and apply the optimistic patch to it.
  ///
  /// In-flight fetches of the targets are cancelled first so a response
  /// requested before the mutation cannot land on top of the patch.
  pub fn begin(cache: &QueryCache, mutation: &Mutation) -> Self {
    let Some(patch) = mutation.optimistic_patch() else {
      return Self {
        snapshot: Vec::new(),
      };
    };

    let mut snapshot = Vec::new();
    for key in &mutation.target_keys {
      if !cache.read(key).is_some_and(|entry| entry.has_data()) {
        continue;
      }
      cache.cancel_fetches(key);
      let before = cache.snapshot(key);
      let patch = Arc::clone(&patch);
      if cache.patch(key, move |data| patch(data)) {
        debug!("Optimistic {} applied to {}", mutation.kind.verb(), key);
        snapshot.push((key.clone(), before));
      }
    }
    Self { snapshot }
  }

  pub fn keys(&self) -> Vec<QueryKey> {
    self.snapshot.iter().map(|(key, _)| key.clone()).collect()
  }

  /// Server confirmed: the snapshots are no longer needed.
  pub fn commit(self) {}

  /// Server refused: put every patched entry back exactly as it was.
  pub fn rollback(self, cache: &QueryCache) {
    for (key, before) in self.snapshot.into_iter().rev() {
      cache.restore(&key, before);
    }
  }
}

/// Raised internally when a mutation fails after patching the cache.
///
/// Never returned to callers; they get the underlying cause once the
/// snapshots are restored.
#[derive(Debug, Error)]
#[error("rolling back optimistic {verb} of {resource} on {} key(s): {cause}", .keys.len())]
pub(crate) struct OptimisticRollback {
  pub verb: &'static str,
  pub resource: String,
  pub keys: Vec<QueryKey>,
  pub cause: Error,
}
