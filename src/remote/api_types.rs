//! Wire types for the admin REST API.
//!
//! Responses come wrapped as `{ success, message, data }`; requests carry a
//! [`Payload`] that is sent either as JSON or as a multipart form.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, Result};

/// How a resource's create/update bodies are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
  #[default]
  Json,
  /// `multipart/form-data`, for resources that upload files
  Multipart,
}

/// Standard response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
  #[serde(default)]
  pub success: Option<bool>,
  #[serde(default)]
  pub message: Option<String>,
  pub data: Option<Value>,
}

/// Pull `data` out of a list/detail response body.
pub fn unwrap_data(body: Value, context: &str) -> Result<Value> {
  if !body.is_object() {
    return Err(Error::Decode(format!(
      "{}: expected a response object, got {}",
      context,
      json_kind(&body)
    )));
  }
  let envelope: ApiEnvelope = serde_json::from_value(body)?;

  if envelope.success == Some(false) {
    warn!(
      "{}: server reported failure: {}",
      context,
      envelope.message.as_deref().unwrap_or("(no message)")
    );
  }

  envelope
    .data
    .ok_or_else(|| Error::Decode(format!("{}: response has no data field", context)))
}

fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

/// A file part of a multipart payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
  pub field: String,
  pub file_name: String,
  pub content_type: Option<String>,
  pub bytes: Vec<u8>,
}

/// Body of a create or update request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
  pub fields: Map<String, Value>,
  pub files: Vec<FileUpload>,
}

impl Payload {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build from a JSON object.
  pub fn from_json(value: Value) -> Result<Self> {
    match value {
      Value::Object(fields) => Ok(Self {
        fields,
        files: Vec::new(),
      }),
      other => Err(Error::Decode(format!(
        "payload must be an object, got {}",
        json_kind(&other)
      ))),
    }
  }

  pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.fields.insert(name.into(), value.into());
    self
  }

  pub fn file(mut self, upload: FileUpload) -> Self {
    self.files.push(upload);
    self
  }

  /// Fields as a JSON object, as merged into cached rows.
  pub fn fields_value(&self) -> Value {
    Value::Object(self.fields.clone())
  }

  /// Multipart form: scalar text as-is, structured values JSON-encoded.
  pub fn to_form(&self) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for (name, value) in &self.fields {
      let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
      };
      form = form.text(name.clone(), text);
    }
    for upload in &self.files {
      let mut part =
        reqwest::multipart::Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone());
      if let Some(mime) = &upload.content_type {
        part = part
          .mime_str(mime)
          .map_err(|e| Error::Decode(format!("invalid content type {}: {}", mime, e)))?;
      }
      form = form.part(upload.field.clone(), part);
    }
    Ok(form)
  }
}
