//! Named, versioned response stores.
//!
//! This module provides the storage half of the proxy:
//! - A `CacheStorage` trait with SQLite, in-memory and no-op backends
//! - A `CacheLayer` facade to open, enumerate and delete named stores
//! - Immutable entries: a write on an existing key replaces the whole entry

mod layer;
mod storage;
mod traits;

pub use layer::{Cache, CacheLayer};
pub use storage::{CacheStorage, MemoryStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, CachedEntry};
