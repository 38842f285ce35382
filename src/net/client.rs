use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::TransportError;

use super::types::{ProxyRequest, ProxyResponse};

/// Transport seam between the proxy and the outside world.
///
/// A non-success status is a response, not an error. Only failures to obtain
/// a response at all are reported as `TransportError`.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, TransportError>;
}

/// `reqwest`-backed network client.
/// Clone is cheap - the underlying client shares its connection pool.
#[derive(Clone)]
pub struct HttpNetwork {
  client: Client,
}

impl HttpNetwork {
  pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let client = builder.build()?;

    Ok(Self { client })
  }

  /// Use a preconfigured client, e.g. one with custom proxy settings.
  #[allow(dead_code)]
  pub fn with_client(client: Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, TransportError> {
    debug!(method = %request.method, url = %request.url, "network fetch");

    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());

    for (name, value) in &request.headers {
      // Hop-by-hop and host headers belong to the inbound connection.
      if is_connection_header(name) {
        continue;
      }
      let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| TransportError::InvalidRequest(format!("header {}: {}", name, e)))?;
      let value = HeaderValue::from_str(value)
        .map_err(|e| TransportError::InvalidRequest(format!("header {}: {}", name, e)))?;
      builder = builder.header(name, value);
    }

    if !request.body.is_empty() {
      builder = builder.body(request.body.clone());
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter(|(name, _)| !is_connection_header(name.as_str()))
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response.bytes().await?;

    debug!(url = %request.url, status, bytes = body.len(), "network response");

    Ok(ProxyResponse {
      status,
      headers,
      body,
    })
  }
}

fn is_connection_header(name: &str) -> bool {
  const SKIPPED: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "content-length",
    "upgrade",
    "te",
    "trailer",
  ];
  SKIPPED.iter().any(|h| h.eq_ignore_ascii_case(name))
}
