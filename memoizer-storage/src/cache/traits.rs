//! Cache backend trait.
//!
//! This module defines the contract every cache backend implements. Results
//! are stored type-erased as JSON values; the evaluator converts them back to
//! the memoized function's return type.

use memoizer_core::{CallId, MemoResult, Metadata, NodeId};
use std::collections::BTreeSet;

/// A cached result, stored as a self-describing JSON value produced by
/// [`to_blob`](crate::to_blob).
pub type CachedResult = serde_json::Value;

/// Cache backend trait for pluggable cache implementations.
///
/// Keys are node identities, matched exactly. Reads of absent keys fail with
/// `CacheError::NotFound`. Backends that cannot answer a listing query fail
/// with `CacheError::NotImplemented`.
///
/// # Thread Safety
///
/// Implementations use interior locking, so a handle can be shared across
/// threads. Concurrent evaluations of the same node may still both compute.
pub trait Cache: Send + Sync {
    /// Short backend name for logs and error messages.
    fn name(&self) -> &'static str;

    /// Store a result and its metadata under `node_id`, replacing any
    /// existing entry.
    fn write(&self, node_id: &NodeId, result: &CachedResult, metadata: &Metadata)
        -> MemoResult<()>;

    /// Read the cached result.
    fn read_result(&self, node_id: &NodeId) -> MemoResult<CachedResult>;

    /// Read the metadata stored with a result.
    fn read_metadata(&self, node_id: &NodeId) -> MemoResult<Metadata>;

    /// Whether an entry exists for `node_id`.
    fn contains(&self, node_id: &NodeId) -> MemoResult<bool>;

    /// Delete the entry for `node_id`.
    fn remove(&self, node_id: &NodeId) -> MemoResult<()>;

    /// All stored node identities.
    fn list_node_ids(&self) -> MemoResult<BTreeSet<NodeId>>;

    /// Node identities of every stored evaluation of `call_id`, oldest asof
    /// first.
    fn list_node_ids_by_call_id(&self, call_id: &CallId) -> MemoResult<Vec<NodeId>>;

    /// The stored evaluation of `call_id` with the greatest asof.
    fn get_latest_node_id_by_call_id(&self, call_id: &CallId) -> MemoResult<Option<NodeId>>;

    /// Get cache statistics.
    fn stats(&self) -> CacheStats;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Serialized size of stored entries in bytes.
    pub memory_bytes: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Number of writes refused because the entry alone exceeds capacity.
    pub refusals: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
