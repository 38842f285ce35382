//! Core types for the cache stores.

use chrono::{DateTime, Utc};

use crate::net::ProxyResponse;

/// A stored response snapshot.
///
/// Entries are never patched; a `put` on the same key replaces the whole entry.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  /// The stored response
  pub response: ProxyResponse,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
  pub fn new(response: ProxyResponse) -> Self {
    Self {
      response,
      cached_at: Utc::now(),
    }
  }
}

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Served from a cache store, no network attempt
  Cache,
  /// Fresh response from the network
  Network,
  /// Synthesized offline fallback
  Fallback,
}

impl CacheSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      CacheSource::Cache => "cache",
      CacheSource::Network => "network",
      CacheSource::Fallback => "fallback",
    }
  }
}

/// Result of routing a request, including where the response came from.
#[derive(Debug, Clone)]
pub struct CacheResult {
  pub response: ProxyResponse,
  pub source: CacheSource,
  /// When the entry was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl CacheResult {
  pub fn from_network(response: ProxyResponse) -> Self {
    Self {
      response,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(entry: CachedEntry) -> Self {
    Self {
      response: entry.response,
      source: CacheSource::Cache,
      cached_at: Some(entry.cached_at),
    }
  }

  pub fn fallback() -> Self {
    Self {
      response: ProxyResponse::offline_fallback(),
      source: CacheSource::Fallback,
      cached_at: None,
    }
  }
}
