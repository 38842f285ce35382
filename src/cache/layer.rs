//! Named cache stores on top of a storage backend.

use std::sync::Arc;

use crate::error::StorageResult;
use crate::net::{ProxyRequest, ProxyResponse};

use super::storage::CacheStorage;
use super::traits::CachedEntry;

/// Entry point to all cache stores of a backend.
///
/// Cloning is cheap; all clones share the same backend.
#[derive(Clone)]
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
}

impl CacheLayer {
  pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
    Self { storage }
  }

  /// Handle to a named store. Opening does not create it.
  pub fn open(&self, name: &str) -> Cache {
    Cache {
      storage: Arc::clone(&self.storage),
      name: name.to_string(),
    }
  }

  pub async fn delete(&self, name: &str) -> StorageResult<bool> {
    self.storage.delete(name).await
  }

  pub async fn keys(&self) -> StorageResult<Vec<String>> {
    self.storage.keys().await
  }

  pub async fn has(&self, name: &str) -> StorageResult<bool> {
    Ok(self.keys().await?.iter().any(|k| k == name))
  }
}

/// A single named store.
#[derive(Clone)]
pub struct Cache {
  storage: Arc<dyn CacheStorage>,
  name: String,
}

impl Cache {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub async fn match_request(&self, request: &ProxyRequest) -> StorageResult<Option<CachedEntry>> {
    self.storage.match_entry(&self.name, &request.key()).await
  }

  pub async fn put(&self, request: &ProxyRequest, response: &ProxyResponse) -> StorageResult<()> {
    self.storage.put(&self.name, &request.key(), response).await
  }

  /// Write all pairs in one go.
  pub async fn put_all(&self, entries: &[(ProxyRequest, ProxyResponse)]) -> StorageResult<()> {
    let keyed: Vec<_> = entries
      .iter()
      .map(|(request, response)| (request.key(), response.clone()))
      .collect();
    self.storage.put_all(&self.name, &keyed).await
  }

  pub async fn len(&self) -> StorageResult<usize> {
    self.storage.entry_count(&self.name).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;

  #[tokio::test]
  async fn test_open_is_lazy() {
    let layer = CacheLayer::new(Arc::new(MemoryStorage::new()));
    let cache = layer.open("pokemon-database-api-v1");
    assert_eq!(cache.name(), "pokemon-database-api-v1");
    assert!(!layer.has("pokemon-database-api-v1").await.unwrap());

    let req = ProxyRequest::parse_get("https://pokeapi.co/api/v2/type").unwrap();
    cache.put(&req, &ProxyResponse::new(200, "[]")).await.unwrap();
    assert!(layer.has("pokemon-database-api-v1").await.unwrap());
    assert_eq!(cache.len().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_handles_share_backend() {
    let layer = CacheLayer::new(Arc::new(MemoryStorage::new()));
    let req = ProxyRequest::parse_get("http://localhost:3000/favicon.ico").unwrap();

    layer
      .open("static-v1")
      .put_all(&[(req.clone(), ProxyResponse::new(200, "icon"))])
      .await
      .unwrap();

    let hit = layer.clone().open("static-v1").match_request(&req).await.unwrap();
    assert!(hit.is_some());

    assert!(layer.delete("static-v1").await.unwrap());
    assert!(layer.open("static-v1").match_request(&req).await.unwrap().is_none());
  }
}
