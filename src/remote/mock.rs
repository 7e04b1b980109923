//! In-memory stand-in for the admin API, for tests.
//!
//! Tables hold raw rows per resource. Calls can be made to fail, or held until
//! the test releases them, so tests decide in which order requests resolve.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

use super::api_types::{Encoding, Payload};
use super::client::RemoteResource;
use crate::error::{Error, Result};

#[derive(Default)]
struct State {
  tables: HashMap<String, Vec<Value>>,
  failures: Vec<(&'static str, Error)>,
  gates: Vec<(&'static str, oneshot::Receiver<()>)>,
  calls: Vec<String>,
  next_id: i64,
}

#[derive(Default)]
pub struct MockRemote {
  state: Mutex<State>,
}

impl MockRemote {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_rows(resource: &str, rows: Value) -> Self {
    let mock = Self::new();
    mock.set_rows(resource, rows);
    mock
  }

  pub fn set_rows(&self, resource: &str, rows: Value) {
    let rows = match rows {
      Value::Array(rows) => rows,
      other => vec![other],
    };
    let mut state = self.state.lock().unwrap();
    state.next_id = state.next_id.max(rows.len() as i64 + 100);
    state.tables.insert(resource.to_string(), rows);
  }

  pub fn rows(&self, resource: &str) -> Value {
    let state = self.state.lock().unwrap();
    Value::Array(state.tables.get(resource).cloned().unwrap_or_default())
  }

  /// Make the next `method` call fail with `error`.
  pub fn fail_next(&self, method: &'static str, error: Error) {
    self.state.lock().unwrap().failures.push((method, error));
  }

  /// Hold the next `method` call until the returned sender fires (or drops).
  pub fn gate_next(&self, method: &'static str) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    self.state.lock().unwrap().gates.push((method, rx));
    tx
  }

  pub fn calls(&self) -> Vec<String> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn call_count(&self, method: &str) -> usize {
    self
      .calls()
      .iter()
      .filter(|c| c.split_whitespace().next() == Some(method))
      .count()
  }

  /// Record the call, wait on its gate if any, then report an injected failure.
  async fn enter(&self, method: &'static str, describe: String) -> Result<()> {
    let gate = {
      let mut state = self.state.lock().unwrap();
      state.calls.push(format!("{} {}", method, describe));
      state
        .gates
        .iter()
        .position(|(m, _)| *m == method)
        .map(|i| state.gates.remove(i).1)
    };
    if let Some(gate) = gate {
      let _ = gate.await;
    }

    let mut state = self.state.lock().unwrap();
    match state.failures.iter().position(|(m, _)| *m == method) {
      Some(i) => Err(state.failures.remove(i).1),
      None => Ok(()),
    }
  }

  fn envelope(data: Value) -> Value {
    json!({ "success": true, "message": "ok", "data": data })
  }
}

fn row_id(row: &Value) -> Option<String> {
  match row.get("id").or_else(|| row.get("_id"))? {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

#[async_trait]
impl RemoteResource for MockRemote {
  async fn list(&self, resource: &str, query: &[(String, String)]) -> Result<Value> {
    self.enter("list", format!("{} {:?}", resource, query)).await?;
    Ok(Self::envelope(self.rows(resource)))
  }

  async fn get(&self, resource: &str, id: &str) -> Result<Value> {
    self.enter("get", format!("{} {}", resource, id)).await?;
    let state = self.state.lock().unwrap();
    state
      .tables
      .get(resource)
      .and_then(|rows| rows.iter().find(|r| row_id(r).as_deref() == Some(id)))
      .cloned()
      .map(Self::envelope)
      .ok_or_else(|| Error::Http {
        status_code: 404,
        body: format!("{} {} not found", resource, id),
      })
  }

  async fn create(&self, resource: &str, _encoding: Encoding, payload: &Payload) -> Result<Value> {
    self.enter("create", resource.to_string()).await?;
    let mut state = self.state.lock().unwrap();
    state.next_id += 1;
    let mut row = payload.fields.clone();
    row.insert("id".into(), json!(state.next_id));
    let row = Value::Object(row);
    state
      .tables
      .entry(resource.to_string())
      .or_default()
      .push(row.clone());
    Ok(Self::envelope(row))
  }

  /// Upserts: an update that lands after a delete brings the row back.
  async fn update(
    &self,
    resource: &str,
    id: &str,
    _encoding: Encoding,
    payload: &Payload,
  ) -> Result<Value> {
    self.enter("update", format!("{} {}", resource, id)).await?;
    let mut state = self.state.lock().unwrap();
    let rows = state.tables.entry(resource.to_string()).or_default();
    let index = match rows.iter().position(|r| row_id(r).as_deref() == Some(id)) {
      Some(index) => index,
      None => {
        let id_value = id.parse::<i64>().map(Value::from).unwrap_or_else(|_| json!(id));
        rows.push(json!({ "id": id_value }));
        rows.len() - 1
      }
    };
    let row = &mut rows[index];
    if let Value::Object(fields) = row {
      for (name, value) in &payload.fields {
        fields.insert(name.clone(), value.clone());
      }
    }
    Ok(Self::envelope(row.clone()))
  }

  async fn remove(&self, resource: &str, id: &str) -> Result<Value> {
    self.enter("remove", format!("{} {}", resource, id)).await?;
    let mut state = self.state.lock().unwrap();
    if let Some(rows) = state.tables.get_mut(resource) {
      rows.retain(|r| row_id(r).as_deref() != Some(id));
    }
    Ok(Self::envelope(json!({ "id": id })))
  }
}
