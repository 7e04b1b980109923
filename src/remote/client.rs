use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api_types::{Encoding, Payload};
use crate::error::{Error, Result};

/// CRUD calls against a named REST resource.
///
/// Implementations return the parsed response body and never retry.
#[async_trait]
pub trait RemoteResource: Send + Sync {
  /// `GET /{resource}/lists?<query>`
  async fn list(&self, resource: &str, query: &[(String, String)]) -> Result<Value>;

  /// `GET /{resource}/lists/{id}`
  async fn get(&self, resource: &str, id: &str) -> Result<Value>;

  /// `POST /{resource}`
  async fn create(&self, resource: &str, encoding: Encoding, payload: &Payload) -> Result<Value>;

  /// `PUT /{resource}/update/{id}`
  async fn update(
    &self,
    resource: &str,
    id: &str,
    encoding: Encoding,
    payload: &Payload,
  ) -> Result<Value>;

  /// `DELETE /{resource}/delete/{id}`
  async fn remove(&self, resource: &str, id: &str) -> Result<Value>;
}

/// HTTP implementation of [`RemoteResource`].
#[derive(Debug, Clone)]
pub struct HttpResourceClient {
  http: Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpResourceClient {
  pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

  pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
    let base_url = Url::parse(base_url)
      .map_err(|e| Error::Transport(format!("invalid base URL {}: {}", base_url, e)))?;
    if base_url.cannot_be_a_base() {
      return Err(Error::Transport(format!(
        "base URL {} cannot carry a path",
        base_url
      )));
    }

    let http = Client::builder()
      .timeout(timeout)
      .user_agent(concat!("dashsync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| Error::Transport(e.to_string()))?;

    Ok(Self {
      http,
      base_url,
      token,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Base URL with extra path segments appended (each one percent-encoded).
  fn url(&self, segments: &[&str]) -> Url {
    let mut url = self.base_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  fn with_body(
    &self,
    request: RequestBuilder,
    encoding: Encoding,
    payload: &Payload,
  ) -> Result<RequestBuilder> {
    match encoding {
      Encoding::Json => {
        if !payload.files.is_empty() {
          tracing::warn!(
            "Dropping {} file(s): resource is JSON-encoded",
            payload.files.len()
          );
        }
        Ok(request.json(&payload.fields))
      }
      Encoding::Multipart => Ok(request.multipart(payload.to_form()?)),
    }
  }

  fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  async fn send(&self, request: RequestBuilder) -> Result<Value> {
    let response = self.authorize(request).send().await?;
    let status = response.status();
    debug!("{} {}", status.as_u16(), response.url());

    let body = match response.bytes().await {
      Ok(body) => body,
      Err(e) if !status.is_success() => {
        debug!("Failed to read {} response body: {}", status.as_u16(), e);
        Default::default()
      }
      Err(e) => return Err(e.into()),
    };
    decode_response(status, &body)
  }
}

/// Map a response to the client's result: non-2xx becomes `Http` with the
/// body as text, an empty 2xx body is `null`, anything else must be JSON.
fn decode_response(status: StatusCode, body: &[u8]) -> Result<Value> {
  if !status.is_success() {
    return Err(Error::Http {
      status_code: status.as_u16(),
      body: String::from_utf8_lossy(body).into_owned(),
    });
  }
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(Value::Null);
  }
  Ok(serde_json::from_slice(body)?)
}

#[async_trait]
impl RemoteResource for HttpResourceClient {
  async fn list(&self, resource: &str, query: &[(String, String)]) -> Result<Value> {
    let request = self.http.get(self.url(&[resource, "lists"])).query(query);
    self.send(request).await
  }

  async fn get(&self, resource: &str, id: &str) -> Result<Value> {
    let request = self.http.get(self.url(&[resource, "lists", id]));
    self.send(request).await
  }

  async fn create(&self, resource: &str, encoding: Encoding, payload: &Payload) -> Result<Value> {
    let request = self.http.post(self.url(&[resource]));
    let request = self.with_body(request, encoding, payload)?;
    self.send(request).await
  }

  async fn update(
    &self,
    resource: &str,
    id: &str,
    encoding: Encoding,
    payload: &Payload,
  ) -> Result<Value> {
    let request = self.http.put(self.url(&[resource, "update", id]));
    let request = self.with_body(request, encoding, payload)?;
    self.send(request).await
  }

  async fn remove(&self, resource: &str, id: &str) -> Result<Value> {
    let request = self.http.delete(self.url(&[resource, "delete", id]));
    self.send(request).await
  }
}
