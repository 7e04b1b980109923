//! Error taxonomy shared by the remote client, the cache and the controller.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  /// The server could not be reached, or the request timed out.
  #[error("network error: {0}")]
  Transport(String),
  /// The server answered with a non-2xx status.
  #[error("http {status_code}: {body}")]
  Http { status_code: u16, body: String },
  /// The response body did not have the expected shape.
  #[error("malformed response: {0}")]
  Decode(String),
}

impl Error {
  /// Whether a read may be attempted again. Mutations never retry.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Transport(_) => true,
      Self::Http { status_code, .. } => (500..=599).contains(status_code),
      Self::Decode(_) => false,
    }
  }

  pub fn status_code(&self) -> Option<u16> {
    match self {
      Self::Http { status_code, .. } => Some(*status_code),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      Self::Transport(format!("request timed out: {}", e))
    } else if e.is_decode() {
      Self::Decode(e.to_string())
    } else {
      Self::Transport(e.to_string())
    }
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Self::Decode(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_retry_policy() {
    assert!(Error::Transport("connection refused".into()).is_retryable());
    assert!(Error::Http {
      status_code: 503,
      body: String::new()
    }
    .is_retryable());
    assert!(!Error::Http {
      status_code: 404,
      body: "not found".into()
    }
    .is_retryable());
    assert!(!Error::Decode("expected array".into()).is_retryable());
  }

  #[test]
  fn test_display() {
    let err = Error::Http {
      status_code: 500,
      body: "boom".into(),
    };
    assert_eq!(err.to_string(), "http 500: boom");
  }
}
