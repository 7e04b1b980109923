//! Query keys and invalidation filters.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Param name reserved for detail keys.
pub const DETAIL_PARAM: &str = "id";

/// A scalar query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyParam {
  Bool(bool),
  Int(i64),
  Str(String),
}

impl KeyParam {
  /// Value as it appears in a query string.
  pub fn to_query_value(&self) -> String {
    match self {
      Self::Bool(b) => b.to_string(),
      Self::Int(i) => i.to_string(),
      Self::Str(s) => s.clone(),
    }
  }

  /// Parse a command-line style value, preferring the narrowest scalar.
  pub fn parse(raw: &str) -> Self {
    if let Ok(b) = raw.parse::<bool>() {
      return Self::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
      return Self::Int(i);
    }
    Self::Str(raw.to_string())
  }
}

impl fmt::Display for KeyParam {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_query_value())
  }
}

impl From<&str> for KeyParam {
  fn from(s: &str) -> Self {
    Self::Str(s.to_string())
  }
}

impl From<String> for KeyParam {
  fn from(s: String) -> Self {
    Self::Str(s)
  }
}

impl From<i64> for KeyParam {
  fn from(i: i64) -> Self {
    Self::Int(i)
  }
}

impl From<bool> for KeyParam {
  fn from(b: bool) -> Self {
    Self::Bool(b)
  }
}

pub type Params = BTreeMap<String, KeyParam>;

/// Address of one cache entry: a resource name plus its parameters.
///
/// Params live in an ordered map, so two keys built from the same pairs in a
/// different order are equal and hash the same.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
  pub resource: String,
  pub params: Params,
}

impl QueryKey {
  pub fn new(resource: impl Into<String>, params: Params) -> Self {
    Self {
      resource: resource.into(),
      params,
    }
  }

  /// Unfiltered list of a resource.
  pub fn all(resource: impl Into<String>) -> Self {
    Self::new(resource, Params::new())
  }

  /// Filtered or paginated list of a resource.
  pub fn list<K, V>(resource: impl Into<String>, params: impl IntoIterator<Item = (K, V)>) -> Self
  where
    K: Into<String>,
    V: Into<KeyParam>,
  {
    let params = params
      .into_iter()
      .map(|(k, v)| (k.into(), v.into()))
      .collect();
    Self::new(resource, params)
  }

  /// Single entity of a resource.
  pub fn detail(resource: impl Into<String>, id: impl Into<String>) -> Self {
    let mut params = Params::new();
    params.insert(DETAIL_PARAM.to_string(), KeyParam::Str(id.into()));
    Self::new(resource, params)
  }

  /// Identifier if this is a detail key.
  pub fn detail_id(&self) -> Option<&str> {
    match (self.params.len(), self.params.get(DETAIL_PARAM)) {
      (1, Some(KeyParam::Str(id))) => Some(id),
      _ => None,
    }
  }

  pub fn is_detail(&self) -> bool {
    self.detail_id().is_some()
  }

  /// Stable, fixed-length hash of the key (SHA-256, hex).
  pub fn cache_hash(&self) -> String {
    let mut input = self.resource.clone();
    for (name, value) in &self.params {
      input.push('\u{1f}');
      input.push_str(name);
      input.push('=');
      input.push_str(&value.to_query_value());
    }

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human readable form for logs.
  pub fn description(&self) -> String {
    if let Some(id) = self.detail_id() {
      return format!("{} {}", self.resource, id);
    }
    if self.params.is_empty() {
      return format!("all {}", self.resource);
    }
    let params: Vec<String> = self
      .params
      .iter()
      .map(|(k, v)| format!("{}={}", k, v))
      .collect();
    format!("{} where {}", self.resource, params.join(", "))
  }

  /// Params as (name, value) pairs for a query string.
  pub fn query_pairs(&self) -> Vec<(String, String)> {
    self
      .params
      .iter()
      .map(|(k, v)| (k.clone(), v.to_query_value()))
      .collect()
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.description())
  }
}

/// Which entries an invalidation touches.
///
/// Breadth is always chosen by the caller; there is no implicit prefix
/// matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
  /// Exactly this key.
  Exact(QueryKey),
  /// Every key of the resource, lists and details alike.
  Resource(String),
  /// Keys of the resource whose params contain all of the given pairs.
  Matching { resource: String, params: Params },
  /// List keys of the resource (everything except detail keys).
  Lists(String),
}

impl KeyFilter {
  pub fn matches(&self, key: &QueryKey) -> bool {
    match self {
      Self::Exact(exact) => exact == key,
      Self::Resource(resource) => &key.resource == resource,
      Self::Matching { resource, params } => {
        &key.resource == resource
          && params
            .iter()
            .all(|(name, value)| key.params.get(name) == Some(value))
      }
      Self::Lists(resource) => &key.resource == resource && !key.is_detail(),
    }
  }
}

impl From<QueryKey> for KeyFilter {
  fn from(key: QueryKey) -> Self {
    Self::Exact(key)
  }
}
