//! Generation sweep: reclaim stores of superseded versions.

use tracing::{info, warn};

use crate::cache::CacheLayer;
use crate::error::StorageResult;

use super::generation::Generation;

/// Delete every store not owned by `generation`. Returns the deleted names.
///
/// A store that fails to delete is skipped; it will be retried by the next
/// sweep.
pub async fn sweep(caches: &CacheLayer, generation: &Generation) -> StorageResult<Vec<String>> {
  let mut deleted = Vec::new();

  for name in caches.keys().await? {
    if generation.owns(&name) {
      continue;
    }
    match caches.delete(&name).await {
      Ok(_) => {
        info!(store = %name, "deleted old cache");
        deleted.push(name);
      }
      Err(e) => warn!(store = %name, error = %e, "failed to delete old cache"),
    }
  }

  Ok(deleted)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::net::testing::MockNetwork;
  use crate::net::{ProxyRequest, ProxyResponse};
  use crate::proxy::router::Router;
  use std::sync::Arc;

  async fn seed(caches: &CacheLayer, name: &str) {
    let req = ProxyRequest::parse_get("https://pokeapi.co/api/v2/type").unwrap();
    caches.open(name).put(&req, &ProxyResponse::new(200, "[]")).await.unwrap();
  }

  #[tokio::test]
  async fn test_sweep_removes_only_foreign_stores() {
    let caches = CacheLayer::new(Arc::new(MemoryStorage::new()));
    let v1 = Generation::new("pokemon-database", 1);
    let v2 = Generation::new("pokemon-database", 2);

    for name in [v1.static_store(), v1.api_store(), v2.static_store(), v2.api_store()] {
      seed(&caches, &name).await;
    }
    seed(&caches, "unrelated-cache").await;

    let mut deleted = sweep(&caches, &v2).await.unwrap();
    deleted.sort();

    assert_eq!(
      deleted,
      vec![
        v1.api_store(),
        v1.static_store(),
        "unrelated-cache".to_string()
      ]
    );
    let mut remaining = caches.keys().await.unwrap();
    remaining.sort();
    assert_eq!(remaining, vec![v2.api_store(), v2.static_store()]);
  }

  #[tokio::test]
  async fn test_sweep_on_clean_state_is_noop() {
    let caches = CacheLayer::new(Arc::new(MemoryStorage::new()));
    let v1 = Generation::new("pokemon-database", 1);
    seed(&caches, &v1.api_store()).await;

    assert!(sweep(&caches, &v1).await.unwrap().is_empty());
    assert_eq!(caches.keys().await.unwrap(), vec![v1.api_store()]);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_sweep_with_inflight_api_requests() {
    let caches = CacheLayer::new(Arc::new(MemoryStorage::new()));
    let v1 = Generation::new("pokemon-database", 1);
    let v2 = Generation::new("pokemon-database", 2);
    seed(&caches, &v1.api_store()).await;
    seed(&caches, &v1.static_store()).await;

    let mut network = MockNetwork::new();
    for id in 0..20 {
      network = network.route(
        &format!("https://pokeapi.co/api/v2/pokemon/{}", id),
        ProxyResponse::new(200, format!("{{\"id\":{}}}", id)),
      );
    }
    let router = Router::new(caches.clone(), Arc::new(network), v2.clone(), "pokeapi.co");

    let requests: Vec<_> = (0..20)
      .map(|id| {
        let router = router.clone();
        tokio::spawn(async move {
          let req = ProxyRequest::parse_get(&format!("https://pokeapi.co/api/v2/pokemon/{}", id)).unwrap();
          router.route(req).await.unwrap()
        })
      })
      .collect();
    let sweeper = {
      let caches = caches.clone();
      let v2 = v2.clone();
      tokio::spawn(async move { sweep(&caches, &v2).await.unwrap() })
    };

    for handle in requests {
      assert_eq!(handle.await.unwrap().response.status, 200);
    }
    sweeper.await.unwrap();

    assert_eq!(caches.open(&v2.api_store()).len().await.unwrap(), 20);
    assert!(!caches.has(&v1.api_store()).await.unwrap());
    assert!(!caches.has(&v1.static_store()).await.unwrap());
  }
}
