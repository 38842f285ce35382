use bytes::Bytes;
use reqwest::Method;
use url::Url;

use crate::error::TransportError;

/// An intercepted outbound request.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Bytes,
}

impl ProxyRequest {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Vec::new(),
      body: Bytes::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// Build a GET request from an absolute URL string.
  pub fn parse_get(url: &str) -> Result<Self, TransportError> {
    let url = Url::parse(url).map_err(|e| TransportError::InvalidRequest(format!("{}: {}", url, e)))?;
    Ok(Self::get(url))
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
    self.body = body.into();
    self
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }

  /// Identity of this request inside a cache store.
  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }

  /// Host of the request target, if any.
  pub fn host(&self) -> Option<&str> {
    self.url.host_str()
  }
}

/// Normalized request descriptor: method plus absolute URL without fragment.
///
/// Host case and default ports are already normalized by URL parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.as_str().to_uppercase(),
      url: url.into(),
    }
  }

  /// Stable fixed-length digest used as the storage key.
  pub fn digest(&self) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl std::fmt::Display for RequestKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// A response snapshot: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Bytes,
}

pub const OFFLINE_MESSAGE: &str = "This data is not available offline";

impl ProxyResponse {
  pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// JSON response with the matching content type.
  pub fn json(status: u16, value: &serde_json::Value) -> Self {
    Self::new(status, value.to_string()).with_header("Content-Type", "application/json")
  }

  /// Synthesized answer for an API request that could not reach the network.
  pub fn offline_fallback() -> Self {
    Self::json(
      503,
      &serde_json::json!({
        "error": "Offline",
        "message": OFFLINE_MESSAGE,
      }),
    )
  }

  /// Only plain `200 OK` responses are worth keeping.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}
