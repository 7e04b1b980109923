//! Forgiving field readers for raw server payloads.
//!
//! The admin API is loose about types: prices arrive as numbers or numeric
//! strings, references arrive populated or as bare ids, and any of them may be
//! null. These readers turn all of that into plain defaults instead of errors.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Number, numeric string, or anything else as `0.0`.
pub fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  Ok(match value {
    Value::Number(n) => n.as_f64().unwrap_or_default(),
    Value::String(s) => s.trim().parse().unwrap_or_default(),
    Value::Bool(b) => f64::from(u8::from(b)),
    _ => 0.0,
  })
}

/// Integer, numeric string, or anything else as `0`.
pub fn integer<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  Ok(match value {
    Value::Number(n) => n
      .as_i64()
      .or_else(|| n.as_f64().map(|f| f as i64))
      .unwrap_or_default(),
    Value::String(s) => s.trim().parse().unwrap_or_default(),
    _ => 0,
  })
}

/// String, number rendered as text, or anything else as `""`.
pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  Ok(match value {
    Value::String(s) => s,
    Value::Number(n) => n.to_string(),
    Value::Bool(b) => b.to_string(),
    _ => String::new(),
  })
}

/// Boolean, `"true"`/`"false"`, 0/1, or anything else as `false`.
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  Ok(match value {
    Value::Bool(b) => b,
    Value::String(s) => s.eq_ignore_ascii_case("true") || s == "1",
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    _ => false,
  })
}

/// Array, or anything else as an empty list.
pub fn list<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  Ok(match value {
    Value::Array(items) => items,
    _ => Vec::new(),
  })
}

/// Display label of a reference field.
///
/// References can be:
/// - A bare id or name string
/// - A populated object with `name`, `title` or `email`
/// - null
pub fn label(value: &Value) -> String {
  if let Some(s) = value.as_str() {
    return s.to_string();
  }
  if let Some(obj) = value.as_object() {
    for field in ["name", "title", "email"] {
      if let Some(s) = obj.get(field).and_then(Value::as_str) {
        return s.to_string();
      }
    }
  }
  String::new()
}

/// URL of an image field: plain string, or object with `url`/`secure_url`.
pub fn image_url(value: &Value) -> String {
  if let Some(s) = value.as_str() {
    return s.to_string();
  }
  ["url", "secure_url"]
    .iter()
    .find_map(|field| value.get(*field).and_then(Value::as_str))
    .map(String::from)
    .unwrap_or_default()
}
