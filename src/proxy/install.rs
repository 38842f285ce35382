//! Install phase: seed the static store from the manifest.

use futures::future::try_join_all;
use tracing::{info, warn};

use crate::cache::CacheLayer;
use crate::error::InstallError;
use crate::net::{Network, ProxyRequest, ProxyResponse};

use super::generation::Generation;
use super::manifest::Manifest;

/// Fetch every manifest entry and write them all to the static store.
///
/// All-or-nothing: nothing is written unless every fetch succeeded, and a
/// failed write removes whatever part of the store was written. Returns the
/// number of seeded entries.
pub async fn install(
  caches: &CacheLayer,
  network: &dyn Network,
  generation: &Generation,
  manifest: &Manifest,
) -> Result<usize, InstallError> {
  let cache = caches.open(&generation.static_store());
  info!(store = cache.name(), entries = manifest.len(), "installing static assets");

  let fetched: Vec<(ProxyRequest, ProxyResponse)> =
    try_join_all(manifest.entries().iter().map(|request| fetch_entry(network, request))).await?;

  if fetched.is_empty() {
    return Ok(0);
  }

  if let Err(e) = cache.put_all(&fetched).await {
    warn!(store = cache.name(), error = %e, "seeding failed, rolling back");
    if let Err(cleanup) = caches.delete(cache.name()).await {
      warn!(store = cache.name(), error = %cleanup, "rollback failed");
    }
    return Err(e.into());
  }

  info!(store = cache.name(), entries = fetched.len(), "static assets installed");
  Ok(fetched.len())
}

async fn fetch_entry(
  network: &dyn Network,
  request: &ProxyRequest,
) -> Result<(ProxyRequest, ProxyResponse), InstallError> {
  let response = network
    .fetch(request)
    .await
    .map_err(|source| InstallError::Fetch {
      url: request.url.to_string(),
      source,
    })?;

  if !response.is_success() {
    return Err(InstallError::BadStatus {
      url: request.url.to_string(),
      status: response.status,
    });
  }

  Ok((request.clone(), response))
}
