//! Error taxonomy for the cache proxy.
//!
//! Storage and transport failures are recovered by the router wherever a
//! meaningful substitute exists. Install failures are the exception: they
//! block activation of the generation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
  #[error("Cache storage unavailable: {0}")]
  Unavailable(String),

  #[error("Lock poisoned: {0}")]
  Poisoned(String),

  #[error("Failed to (de)serialize cache entry: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("SQLite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("Corrupt cache entry: {0}")]
  Corrupt(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum TransportError {
  #[error("Connection failed: {0}")]
  Connect(String),

  #[error("Request timed out: {0}")]
  Timeout(String),

  #[error("Invalid request: {0}")]
  InvalidRequest(String),

  #[error("Network error: {0}")]
  Other(String),
}

impl From<reqwest::Error> for TransportError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
      TransportError::Connect(err.to_string())
    } else if err.is_builder() {
      TransportError::InvalidRequest(err.to_string())
    } else {
      TransportError::Other(err.to_string())
    }
  }
}

#[derive(Error, Debug)]
pub enum InstallError {
  #[error("Failed to fetch manifest entry {url}: {source}")]
  Fetch {
    url: String,
    #[source]
    source: TransportError,
  },

  #[error("Manifest entry {url} returned status {status}")]
  BadStatus { url: String, status: u16 },

  #[error("Failed to seed static cache: {0}")]
  Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum LifecycleError {
  #[error("Cannot {action} while worker is {state}")]
  InvalidState {
    action: &'static str,
    state: &'static str,
  },

  #[error("Generation {0} is not installed")]
  NotInstalled(String),

  #[error(transparent)]
  Install(#[from] InstallError),

  #[error(transparent)]
  Storage(#[from] StorageError),
}

/// Errors the router can surface to the caller.
#[derive(Error, Debug)]
pub enum ProxyError {
  #[error(transparent)]
  Transport(#[from] TransportError),

  #[error("Worker is not active (state: {0})")]
  NotActive(&'static str),
}
