//! Cache backends for memoized results.
//!
//! Every backend implements [`Cache`], keyed by [`NodeId`](memoizer_core::NodeId):
//!
//! - [`NoOpCache`] stores nothing; every lookup misses
//! - [`InMemoryCache`] is a byte-bounded LRU held in process memory
//! - [`FileCache`] persists entries under a directory, fronted by an
//!   [`InMemoryCache`]

pub mod file;
pub mod memory;
pub mod noop;
pub mod traits;

pub use file::{FileCache, METADATA_SUFFIX, RESULT_SUFFIX};
pub use memory::{entry_size, InMemoryCache};
pub use noop::NoOpCache;
pub use traits::{Cache, CacheStats, CachedResult};
