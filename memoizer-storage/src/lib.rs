//! Memoizer Storage - Cache Contract and Backends
//!
//! Defines the [`Cache`] trait that the evaluator reads and writes through,
//! the three backends (no-op, in-memory LRU, file-backed), and the result
//! encoding shared by all of them.

mod blob;
pub mod cache;

pub use blob::{from_blob, to_blob};

pub use cache::{
    entry_size, Cache, CacheStats, CachedResult, FileCache, InMemoryCache, NoOpCache,
    METADATA_SUFFIX, RESULT_SUFFIX,
};

use memoizer_core::{CacheKind, MemoResult, MemoizerConfig};
use std::sync::Arc;
use tracing::info;

/// Shared handle to a cache backend.
pub type SharedCache = Arc<dyn Cache>;

/// Build the backend a configuration asks for.
pub fn build_cache(config: &MemoizerConfig) -> MemoResult<SharedCache> {
    config.validate()?;
    let cache: SharedCache = match &config.cache {
        CacheKind::NoOp => Arc::new(NoOpCache::new()),
        CacheKind::InMemory { capacity_bytes } => Arc::new(InMemoryCache::new(*capacity_bytes)),
        CacheKind::File {
            path,
            front_capacity_bytes,
        } => Arc::new(FileCache::new(path.clone(), *front_capacity_bytes)),
    };
    info!(backend = cache.name(), "Cache backend ready");
    Ok(cache)
}
