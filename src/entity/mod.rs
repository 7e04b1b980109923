//! Entity definitions: how each resource's raw payload becomes display rows.

pub mod lenient;
pub mod resources;
mod rows;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

use crate::remote::Encoding;

pub use rows::{identifier, merge_row, project_one, project_rows, remove_row, EntityRow, RowId};

/// A REST resource and its projection.
///
/// The implementing type is the raw server shape. It must deserialize from
/// partial payloads (every field defaulted) so a malformed row still renders.
pub trait Resource: DeserializeOwned + Default + Send + Sync + 'static {
  /// Display fields of one row
  type Row: Clone + Debug + PartialEq + Serialize + Send + Sync + 'static;

  /// Resource name, used both in the URL path and as the cache key's resource
  const NAME: &'static str;

  /// Identifier field consulted when `id` is absent
  const SECONDARY_ID: Option<&'static str> = Some("_id");

  /// Body encoding for create/update
  const ENCODING: Encoding = Encoding::Json;

  /// Raw shape → display row. Must be pure.
  fn project(self) -> Self::Row;
}

/// Runtime description of a resource, for callers that pick one by name.
#[derive(Debug, Clone, Copy)]
pub struct ResourceInfo {
  pub name: &'static str,
  pub secondary_id: Option<&'static str>,
  pub encoding: Encoding,
  /// Projects cached raw data into a JSON array of rows
  pub project_json: fn(&Value) -> Value,
}

impl ResourceInfo {
  pub const fn of<R: Resource>() -> Self {
    Self {
      name: R::NAME,
      secondary_id: R::SECONDARY_ID,
      encoding: R::ENCODING,
      project_json: project_json::<R>,
    }
  }
}

fn project_json<R: Resource>(data: &Value) -> Value {
  serde_json::to_value(project_rows::<R>(data)).unwrap_or(Value::Array(Vec::new()))
}

/// Every resource the admin API exposes.
pub const RESOURCES: &[ResourceInfo] = &[
  ResourceInfo::of::<resources::Product>(),
  ResourceInfo::of::<resources::Category>(),
  ResourceInfo::of::<resources::SubCategory>(),
  ResourceInfo::of::<resources::CategoryType>(),
  ResourceInfo::of::<resources::Brand>(),
  ResourceInfo::of::<resources::Occasion>(),
  ResourceInfo::of::<resources::Recipient>(),
  ResourceInfo::of::<resources::Packaging>(),
  ResourceInfo::of::<resources::Color>(),
  ResourceInfo::of::<resources::Order>(),
  ResourceInfo::of::<resources::User>(),
];

/// Look up a resource by name (case-insensitive).
pub fn resource_info(name: &str) -> Option<&'static ResourceInfo> {
  RESOURCES.iter().find(|r| r.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::collections::HashSet;

  #[test]
  fn test_resource_names_are_unique() {
    let names: HashSet<&str> = RESOURCES.iter().map(|r| r.name).collect();
    assert_eq!(names.len(), RESOURCES.len());
    assert_eq!(RESOURCES.len(), 11);
  }

  #[test]
  fn test_lookup_by_name() {
    assert_eq!(resource_info("subcategory").unwrap().name, "subCategory");
    assert_eq!(resource_info("order").unwrap().encoding, Encoding::Json);
    assert_eq!(resource_info("product").unwrap().encoding, Encoding::Multipart);
    assert!(resource_info("invoice").is_none());
  }

  #[test]
  fn test_project_json() {
    let info = resource_info("color").unwrap();
    let rows = (info.project_json)(&json!([{ "id": 1, "name": "Red", "colorCode": "f00" }]));
    assert_eq!(rows, json!([{ "id": "1", "name": "Red", "hex": "#f00" }]));
  }
}
