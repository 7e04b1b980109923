//! Normalized entity rows, and the local edits applied to cached raw data.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

use super::Resource;

/// Normalized row identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RowId {
  /// From the `id` field or the resource's secondary identifier field
  Key(String),
  /// Position in the list, when the row carries no identifier
  Index(usize),
}

impl fmt::Display for RowId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Key(key) => f.write_str(key),
      Self::Index(i) => write!(f, "#{}", i),
    }
  }
}

/// One display row: identifier plus projected fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRow<T> {
  pub id: RowId,
  #[serde(flatten)]
  pub fields: T,
}

fn scalar_id(value: Option<&Value>) -> Option<String> {
  match value? {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// Identifier of a raw row: `id`, else the secondary field.
pub fn identifier(raw: &Value, secondary: Option<&str>) -> Option<String> {
  scalar_id(raw.get("id")).or_else(|| secondary.and_then(|field| scalar_id(raw.get(field))))
}

fn row_id(raw: &Value, secondary: Option<&str>, index: usize) -> RowId {
  identifier(raw, secondary)
    .map(RowId::Key)
    .unwrap_or(RowId::Index(index))
}

fn project_raw<R: Resource>(raw: &Value) -> R::Row {
  let parsed: R = serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
    warn!("{}: unreadable row, using defaults: {}", R::NAME, e);
    R::default()
  });
  parsed.project()
}

/// Project cached raw data into display rows.
///
/// A list yields one row per element, an object yields a single row, anything
/// else yields nothing. Rows repeating an identifier already seen are dropped.
pub fn project_rows<R: Resource>(data: &Value) -> Vec<EntityRow<R::Row>> {
  let items: Vec<&Value> = match data {
    Value::Array(items) => items.iter().collect(),
    Value::Object(_) => vec![data],
    _ => Vec::new(),
  };

  let mut seen = HashSet::new();
  let mut rows = Vec::with_capacity(items.len());
  for (index, raw) in items.into_iter().enumerate() {
    let id = row_id(raw, R::SECONDARY_ID, index);
    if !seen.insert(id.clone()) {
      warn!("{}: dropping row with duplicate id {}", R::NAME, id);
      continue;
    }
    rows.push(EntityRow {
      id,
      fields: project_raw::<R>(raw),
    });
  }
  rows
}

/// Project a detail payload into a single row.
pub fn project_one<R: Resource>(data: &Value) -> Option<EntityRow<R::Row>> {
  match data {
    Value::Object(_) => Some(EntityRow {
      id: row_id(data, R::SECONDARY_ID, 0),
      fields: project_raw::<R>(data),
    }),
    _ => None,
  }
}

fn matches_id(raw: &Value, id: &str, secondary: Option<&str>) -> bool {
  identifier(raw, secondary).as_deref() == Some(id)
}

/// Remove the row with the given identifier.
///
/// A detail object that matches becomes `null`.
pub fn remove_row(data: Value, id: &str, secondary: Option<&str>) -> Value {
  match data {
    Value::Array(items) => Value::Array(
      items
        .into_iter()
        .filter(|raw| !matches_id(raw, id, secondary))
        .collect(),
    ),
    Value::Object(_) if matches_id(&data, id, secondary) => Value::Null,
    other => other,
  }
}

/// Merge fields into the row with the given identifier.
pub fn merge_row(data: Value, id: &str, secondary: Option<&str>, fields: &Map<String, Value>) -> Value {
  fn merge(mut raw: Value, fields: &Map<String, Value>) -> Value {
    if let Value::Object(target) = &mut raw {
      for (name, value) in fields {
        target.insert(name.clone(), value.clone());
      }
    }
    raw
  }

  match data {
    Value::Array(items) => Value::Array(
      items
        .into_iter()
        .map(|raw| {
          if matches_id(&raw, id, secondary) {
            merge(raw, fields)
          } else {
            raw
          }
        })
        .collect(),
    ),
    Value::Object(_) if matches_id(&data, id, secondary) => merge(data, fields),
    other => other,
  }
}
