//! HTTP front door: every request the hosted application sends through the
//! proxy is answered by the worker.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use color_eyre::{eyre::eyre, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::error::{ProxyError, TransportError};
use crate::net::{ProxyRequest, ProxyResponse};
use crate::proxy::Worker;

/// Largest request body forwarded upstream.
const MAX_REQUEST_BODY: usize = 8 * 1024 * 1024;

#[derive(Clone)]
struct ServerState {
  worker: Arc<Worker>,
  static_origin: Arc<Url>,
}

pub fn app(worker: Arc<Worker>, static_origin: Url) -> axum::Router {
  axum::Router::new()
    .fallback(intercept)
    .with_state(ServerState {
      worker,
      static_origin: Arc::new(static_origin),
    })
}

/// Serve until the process is stopped.
pub async fn serve(worker: Arc<Worker>, static_origin: Url, listen: SocketAddr) -> Result<()> {
  let listener = tokio::net::TcpListener::bind(listen)
    .await
    .map_err(|e| eyre!("Failed to bind {}: {}", listen, e))?;
  info!(%listen, generation = %worker.generation(), "proxy listening");

  axum::serve(listener, app(worker, static_origin))
    .await
    .map_err(|e| eyre!("Server error: {}", e))?;
  Ok(())
}

async fn intercept(State(state): State<ServerState>, request: Request) -> Response {
  let (parts, body) = request.into_parts();
  let body = match to_bytes(body, MAX_REQUEST_BODY).await {
    Ok(body) => body,
    Err(e) => return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response(),
  };

  let request = match to_proxy_request(parts.method, &parts.uri, &parts.headers, body, &state.static_origin) {
    Ok(request) => request,
    Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
  };

  match state.worker.fetch(request).await {
    Ok(result) => to_http_response(result.response),
    Err(e @ ProxyError::Transport(_)) => {
      warn!(error = %e, "request failed");
      (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
    }
    Err(e @ ProxyError::NotActive(_)) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
  }
}

/// Translate an inbound request. Absolute-form targets are used as-is,
/// origin-form paths are resolved against the static origin.
pub fn to_proxy_request(
  method: Method,
  uri: &Uri,
  headers: &HeaderMap,
  body: bytes::Bytes,
  static_origin: &Url,
) -> Result<ProxyRequest, TransportError> {
  let url = if uri.scheme().is_some() && uri.authority().is_some() {
    Url::parse(&uri.to_string())
  } else {
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    static_origin.join(path)
  }
  .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", uri, e)))?;

  let mut request = ProxyRequest::new(method, url).with_body(body);
  for (name, value) in headers {
    if let Ok(value) = value.to_str() {
      request = request.with_header(name.as_str(), value);
    }
  }
  Ok(request)
}

fn to_http_response(response: ProxyResponse) -> Response {
  let mut builder = Response::builder().status(response.status);
  for (name, value) in &response.headers {
    builder = builder.header(name.as_str(), value.as_str());
  }
  match builder.body(Body::from(response.body)) {
    Ok(response) => response,
    Err(e) => {
      warn!(error = %e, "upstream response could not be rebuilt");
      (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
    }
  }
}
