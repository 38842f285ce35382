//! Request interception: classify each request and apply its strategy.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheLayer, CacheResult, CachedEntry};
use crate::error::ProxyError;
use crate::net::{Network, ProxyRequest};

use super::generation::Generation;

/// Request classes, one strategy each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Application files and images: cache-first, never written back
  Static,
  /// Reference-data API: cache-first, stored on success, fallback when offline
  Api,
}

/// Requests to the reference-data API host are `Api`, everything else `Static`.
pub fn classify(request: &ProxyRequest, api_host: &str) -> RequestClass {
  match request.host() {
    Some(host) if host.eq_ignore_ascii_case(api_host) => RequestClass::Api,
    _ => RequestClass::Static,
  }
}

/// Routes intercepted requests for one generation.
///
/// Cloning is cheap; every request can run on its own task.
#[derive(Clone)]
pub struct Router {
  caches: CacheLayer,
  network: Arc<dyn Network>,
  generation: Generation,
  api_host: String,
}

impl Router {
  pub fn new(
    caches: CacheLayer,
    network: Arc<dyn Network>,
    generation: Generation,
    api_host: impl Into<String>,
  ) -> Self {
    Self {
      caches,
      network,
      generation,
      api_host: api_host.into(),
    }
  }

  pub fn caches(&self) -> &CacheLayer {
    &self.caches
  }

  pub fn network(&self) -> &dyn Network {
    self.network.as_ref()
  }

  pub fn generation(&self) -> &Generation {
    &self.generation
  }

  pub fn classify(&self, request: &ProxyRequest) -> RequestClass {
    classify(request, &self.api_host)
  }

  /// Answer a request. Only static misses that cannot reach the network and
  /// non-GET transport failures surface as errors.
  pub async fn route(&self, request: ProxyRequest) -> Result<CacheResult, ProxyError> {
    if !request.is_get() {
      debug!(method = %request.method, url = %request.url, "passthrough");
      let response = self.network.fetch(&request).await?;
      return Ok(CacheResult::from_network(response));
    }

    let result = match self.classify(&request) {
      RequestClass::Static => self.serve_static(&request).await?,
      RequestClass::Api => self.serve_api(request.clone()).await,
    };

    debug!(
      url = %request.url,
      status = result.response.status,
      source = result.source.as_str(),
      "routed"
    );
    Ok(result)
  }

  async fn serve_static(&self, request: &ProxyRequest) -> Result<CacheResult, ProxyError> {
    let cache = self.caches.open(&self.generation.static_store());
    if let Some(entry) = lookup(&cache, request).await {
      return Ok(CacheResult::from_cache(entry));
    }

    let response = self.network.fetch(request).await?;
    Ok(CacheResult::from_network(response))
  }

  async fn serve_api(&self, request: ProxyRequest) -> CacheResult {
    let cache = self.caches.open(&self.generation.api_store());
    if let Some(entry) = lookup(&cache, &request).await {
      return CacheResult::from_cache(entry);
    }

    // Detached so that a caller dropping this future does not cancel the write.
    let network = Arc::clone(&self.network);
    let url = request.url.clone();
    let task = tokio::spawn(async move { fetch_and_store(network.as_ref(), &cache, &request).await });

    match task.await {
      Ok(result) => result,
      Err(e) => {
        warn!(url = %url, error = %e, "api fetch task failed");
        CacheResult::fallback()
      }
    }
  }
}

/// Store lookup that treats a storage failure as a miss.
async fn lookup(cache: &Cache, request: &ProxyRequest) -> Option<CachedEntry> {
  match cache.match_request(request).await {
    Ok(hit) => hit,
    Err(e) => {
      warn!(store = cache.name(), url = %request.url, error = %e, "cache lookup failed, using network");
      None
    }
  }
}

async fn fetch_and_store(network: &dyn Network, cache: &Cache, request: &ProxyRequest) -> CacheResult {
  match network.fetch(request).await {
    Ok(response) => {
      if response.is_cacheable() {
        if let Err(e) = cache.put(request, &response).await {
          warn!(store = cache.name(), url = %request.url, error = %e, "failed to cache api response");
        }
      }
      CacheResult::from_network(response)
    }
    Err(e) => {
      warn!(url = %request.url, error = %e, "api request failed, serving offline fallback");
      CacheResult::fallback()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, CacheStorage, MemoryStorage};
  use crate::error::{StorageError, StorageResult, TransportError};
  use crate::net::testing::MockNetwork;
  use crate::net::{HttpNetwork, ProxyResponse, RequestKey};
  use async_trait::async_trait;
  use reqwest::Method;

  const API: &str = "https://pokeapi.co/api/v2";

  fn router(network: Arc<MockNetwork>) -> Router {
    router_with(Arc::new(MemoryStorage::new()), network)
  }

  fn router_with(storage: Arc<dyn CacheStorage>, network: Arc<MockNetwork>) -> Router {
    Router::new(
      CacheLayer::new(storage),
      network,
      Generation::new("pokemon-database", 1),
      "pokeapi.co",
    )
  }

  fn get(url: &str) -> ProxyRequest {
    ProxyRequest::parse_get(url).unwrap()
  }

  #[test]
  fn test_classify_by_host() {
    assert_eq!(classify(&get("https://pokeapi.co/api/v2/pokemon/1"), "pokeapi.co"), RequestClass::Api);
    assert_eq!(classify(&get("https://PokeAPI.co/api/v2/type"), "pokeapi.co"), RequestClass::Api);
    assert_eq!(classify(&get("http://localhost:3000/app.bundle"), "pokeapi.co"), RequestClass::Static);
    // Host match, not substring match
    assert_eq!(
      classify(&get("https://raw.githubusercontent.com/pokeapi.co/sprite.png"), "pokeapi.co"),
      RequestClass::Static
    );
  }

  #[tokio::test]
  async fn test_api_first_fetch_stored_then_served_offline() {
    let url = format!("{}/thing/25", API);
    let network = Arc::new(MockNetwork::new().route(&url, ProxyResponse::new(200, r#"{"id":25}"#)));
    let router = router(network.clone());

    let first = router.route(get(&url)).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.response.status, 200);
    assert_eq!(network.calls(), 1);

    let api = router.caches().open(&router.generation().api_store());
    assert_eq!(api.len().await.unwrap(), 1);
    assert!(api.match_request(&get(&url)).await.unwrap().is_some());

    network.set_offline(true);
    network.reset_calls();
    let second = router.route(get(&url)).await.unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.response, first.response);
    assert_eq!(network.calls(), 0);
  }

  #[tokio::test]
  async fn test_repeated_api_requests_hit_network_once() {
    let url = format!("{}/pokemon?limit=20&offset=0", API);
    let network = Arc::new(MockNetwork::new().route(&url, ProxyResponse::new(200, "[]")));
    let router = router(network.clone());

    for _ in 0..5 {
      router.route(get(&url)).await.unwrap();
    }
    assert_eq!(network.calls(), 1);
    assert_eq!(
      router
        .caches()
        .open(&router.generation().api_store())
        .len()
        .await
        .unwrap(),
      1
    );
  }

  #[tokio::test]
  async fn test_api_offline_miss_returns_fallback() {
    let network = Arc::new(MockNetwork::new());
    network.set_offline(true);
    let router = router(network.clone());

    let result = router.route(get(&format!("{}/thing/999", API))).await.unwrap();
    assert_eq!(result.source, CacheSource::Fallback);
    assert_eq!(result.response.status, 503);
    assert_eq!(result.response.header("Content-Type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(&result.response.body).unwrap();
    assert_eq!(body["error"], "Offline");

    // Fallbacks are never stored
    assert!(router.caches().keys().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_api_timeout_returns_fallback() {
    let upstream = axum::Router::new().route(
      "/api/v2/pokemon/25",
      axum::routing::get(|| async {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        "{}"
      }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, upstream).await.unwrap();
    });

    let client = reqwest::Client::builder()
      .no_proxy()
      .timeout(std::time::Duration::from_millis(200))
      .build()
      .unwrap();
    let router = Router::new(
      CacheLayer::new(Arc::new(MemoryStorage::new())),
      Arc::new(HttpNetwork::with_client(client)),
      Generation::new("pokemon-database", 1),
      "127.0.0.1",
    );

    let result = router
      .route(get(&format!("http://{}/api/v2/pokemon/25", addr)))
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Fallback);
    assert_eq!(result.response.status, 503);
    assert!(router.caches().keys().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_api_error_status_not_cached() {
    let missing = format!("{}/pokemon/missingno", API);
    let broken = format!("{}/type/500", API);
    let network = Arc::new(MockNetwork::new().route(&broken, ProxyResponse::new(500, "boom")));
    let router = router(network.clone());

    for url in [&missing, &broken] {
      let first = router.route(get(url)).await.unwrap();
      assert!(first.response.status >= 400);
      let retry = router.route(get(url)).await.unwrap();
      assert_eq!(retry.source, CacheSource::Network);
    }

    assert_eq!(network.calls(), 4);
    assert!(router.caches().keys().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_static_served_from_store_without_network() {
    let network = Arc::new(MockNetwork::new());
    let router = router(network.clone());
    let req = get("http://localhost:3000/app.bundle");
    router
      .caches()
      .open(&router.generation().static_store())
      .put(&req, &ProxyResponse::new(200, "bundle"))
      .await
      .unwrap();

    network.set_offline(true);
    let result = router.route(req).await.unwrap();
    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(&result.response.body[..], b"bundle");
    assert_eq!(network.calls(), 0);
  }

  #[tokio::test]
  async fn test_static_miss_goes_to_network_without_write_back() {
    let url = "http://localhost:3000/sprites/25.png";
    let network = Arc::new(MockNetwork::new().route(url, ProxyResponse::new(200, "png")));
    let router = router(network.clone());

    for _ in 0..2 {
      let result = router.route(get(url)).await.unwrap();
      assert_eq!(result.source, CacheSource::Network);
    }
    assert_eq!(network.calls(), 2);
    assert!(router.caches().keys().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_static_offline_miss_surfaces_transport_error() {
    let network = Arc::new(MockNetwork::new());
    network.set_offline(true);
    let router = router(network);

    let err = router.route(get("http://localhost:3000/not-seeded.png")).await.unwrap_err();
    assert!(matches!(err, ProxyError::Transport(TransportError::Connect(_))));
  }

  #[tokio::test]
  async fn test_static_lookup_ignores_api_store() {
    let url = "http://localhost:3000/app.bundle";
    let network = Arc::new(MockNetwork::new().route(url, ProxyResponse::new(200, "fresh")));
    let router = router(network.clone());
    router
      .caches()
      .open(&router.generation().api_store())
      .put(&get(url), &ProxyResponse::new(200, "wrong store"))
      .await
      .unwrap();

    let result = router.route(get(url)).await.unwrap();
    assert_eq!(&result.response.body[..], b"fresh");
    assert_eq!(network.calls(), 1);
  }

  #[tokio::test]
  async fn test_non_get_bypasses_stores() {
    let url = format!("{}/pokemon/25", API);
    let network = Arc::new(MockNetwork::new().route(&url, ProxyResponse::new(200, "{}")));
    let router = router(network.clone());

    let post = ProxyRequest::new(Method::POST, url.parse().unwrap()).with_body("{}");
    router.route(post.clone()).await.unwrap();
    router.route(post).await.unwrap();

    assert_eq!(network.calls(), 2);
    assert!(router.caches().keys().await.unwrap().is_empty());
  }

  /// Backend where every operation fails.
  struct BrokenStorage;

  #[async_trait]
  impl CacheStorage for BrokenStorage {
    async fn match_entry(&self, _cache: &str, _key: &RequestKey) -> StorageResult<Option<CachedEntry>> {
      Err(StorageError::Unavailable("disk gone".into()))
    }

    async fn put(&self, _cache: &str, _key: &RequestKey, _response: &ProxyResponse) -> StorageResult<()> {
      Err(StorageError::Unavailable("quota exceeded".into()))
    }

    async fn delete(&self, _cache: &str) -> StorageResult<bool> {
      Err(StorageError::Unavailable("disk gone".into()))
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
      Err(StorageError::Unavailable("disk gone".into()))
    }

    async fn entry_count(&self, _cache: &str) -> StorageResult<usize> {
      Err(StorageError::Unavailable("disk gone".into()))
    }
  }

  #[tokio::test]
  async fn test_storage_failure_degrades_to_network() {
    let api_url = format!("{}/pokemon/25", API);
    let static_url = "http://localhost:3000/app.bundle";
    let network = Arc::new(
      MockNetwork::new()
        .route(&api_url, ProxyResponse::new(200, "{}"))
        .route(static_url, ProxyResponse::new(200, "bundle")),
    );
    let router = router_with(Arc::new(BrokenStorage), network.clone());

    let api = router.route(get(&api_url)).await.unwrap();
    assert_eq!(api.source, CacheSource::Network);
    assert_eq!(api.response.status, 200);

    let asset = router.route(get(static_url)).await.unwrap();
    assert_eq!(&asset.response.body[..], b"bundle");
    assert_eq!(network.calls(), 2);
  }

  #[tokio::test]
  async fn test_abandoned_api_request_still_warms_cache() {
    let url = format!("{}/pokemon/1", API);
    let network = Arc::new(MockNetwork::new().route(&url, ProxyResponse::new(200, "{}")));
    let router = router(network.clone());

    // Poll the request once so the detached fetch is spawned, then drop it.
    {
      let fut = router.route(get(&url));
      tokio::pin!(fut);
      let _ = futures::poll!(fut.as_mut());
    }

    let api = router.caches().open(&router.generation().api_store());
    for _ in 0..50 {
      if api.len().await.unwrap() == 1 {
        break;
      }
      tokio::task::yield_now().await;
    }
    assert_eq!(api.len().await.unwrap(), 1);
  }
}
