//! Outbound network access and the request/response types shared by the proxy.

mod client;
mod types;

pub use client::{HttpNetwork, Network};
pub use types::{ProxyRequest, ProxyResponse, RequestKey};

#[cfg(test)]
pub mod testing {
  //! Scripted network used by the proxy tests.

  use async_trait::async_trait;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Mutex;

  use super::{Network, ProxyRequest, ProxyResponse};
  use crate::error::TransportError;

  /// In-memory network with a call counter and an on/off switch.
  #[derive(Default)]
  pub struct MockNetwork {
    routes: Mutex<HashMap<String, ProxyResponse>>,
    calls: AtomicUsize,
    offline: AtomicBool,
  }

  impl MockNetwork {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn route(self, url: &str, response: ProxyResponse) -> Self {
      self.routes.lock().unwrap().insert(url.to_string(), response);
      self
    }

    pub fn set_offline(&self, offline: bool) {
      self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
      self.calls.store(0, Ordering::SeqCst);
    }
  }

  #[async_trait]
  impl Network for MockNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, TransportError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.offline.load(Ordering::SeqCst) {
        return Err(TransportError::Connect(format!("offline: {}", request.url)));
      }
      let routes = self.routes.lock().unwrap();
      Ok(
        routes
          .get(request.url.as_str())
          .cloned()
          .unwrap_or_else(|| ProxyResponse::new(404, "not found")),
      )
    }
  }
}
