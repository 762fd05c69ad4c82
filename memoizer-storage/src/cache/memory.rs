//! Byte-bounded in-memory LRU cache.
//!
//! Entries are sized by the serialized length of their result and metadata.
//! When a write pushes the total over capacity, least-recently-used entries
//! are evicted until it fits again. An entry that alone reaches the capacity
//! is never stored.
//!
//! # Recency
//!
//! Writes and successful reads both mark an entry as most recently used.
//! `contains` does not touch recency.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use memoizer_core::{CacheError, CallId, MemoResult, Metadata, NodeId};
use tracing::debug;

use super::traits::{Cache, CacheStats, CachedResult};

struct StoredEntry {
    result: CachedResult,
    metadata: Metadata,
    size_bytes: u64,
    tick: u64,
}

#[derive(Default)]
struct LruState {
    entries: HashMap<NodeId, StoredEntry>,
    /// Recency order: smallest tick is least recently used.
    order: BTreeMap<u64, NodeId>,
    next_tick: u64,
    size_bytes: u64,
    stats: CacheStats,
}

impl LruState {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn take(&mut self, node_id: &NodeId) -> Option<StoredEntry> {
        let entry = self.entries.remove(node_id)?;
        self.order.remove(&entry.tick);
        self.size_bytes -= entry.size_bytes;
        Some(entry)
    }

    fn touch(&mut self, node_id: &NodeId) -> Option<&StoredEntry> {
        let tick = self.bump();
        let entry = self.entries.get_mut(node_id)?;
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, node_id.clone());
        self.entries.get(node_id)
    }

    fn evict_until(&mut self, capacity: u64) {
        while self.size_bytes > capacity {
            let Some((_, victim)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&victim) {
                self.size_bytes -= entry.size_bytes;
                self.stats.evictions += 1;
                debug!(node_id = %victim, bytes = entry.size_bytes, "Evicted cache entry");
            }
        }
    }
}

/// In-memory cache with LRU eviction by total serialized size.
pub struct InMemoryCache {
    capacity_bytes: Option<u64>,
    state: Mutex<LruState>,
}

impl InMemoryCache {
    /// Create a cache holding at most `capacity_bytes`; `None` is unbounded.
    pub fn new(capacity_bytes: Option<u64>) -> Self {
        Self {
            capacity_bytes,
            state: Mutex::new(LruState::default()),
        }
    }

    /// Create an unbounded cache.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn capacity_bytes(&self) -> Option<u64> {
        self.capacity_bytes
    }

    /// Total serialized size of stored entries.
    pub fn size_bytes(&self) -> u64 {
        self.lock().map(|state| state.size_bytes).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Node identities from least to most recently used.
    pub fn lru_order(&self) -> MemoResult<Vec<NodeId>> {
        Ok(self.lock()?.order.values().cloned().collect())
    }

    fn lock(&self) -> MemoResult<MutexGuard<'_, LruState>> {
        self.state
            .lock()
            .map_err(|_| CacheError::LockPoisoned.into())
    }

    fn not_implemented(operation: &'static str) -> CacheError {
        CacheError::NotImplemented {
            backend: "InMemoryCache",
            operation,
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Serialized size of an entry, used for capacity accounting.
pub fn entry_size(result: &CachedResult, metadata: &Metadata) -> MemoResult<u64> {
    let bytes = serde_json::to_vec(&(result, metadata)).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })?;
    Ok(bytes.len() as u64)
}

impl Cache for InMemoryCache {
    fn name(&self) -> &'static str {
        "InMemoryCache"
    }

    fn write(&self, node_id: &NodeId, result: &CachedResult, metadata: &Metadata) -> MemoResult<()> {
        let size_bytes = entry_size(result, metadata)?;
        let mut state = self.lock()?;

        if let Some(capacity) = self.capacity_bytes {
            if size_bytes >= capacity {
                state.stats.refusals += 1;
                debug!(
                    node_id = %node_id,
                    bytes = size_bytes,
                    capacity,
                    "Entry too large for cache, not stored"
                );
                return Ok(());
            }
        }

        state.take(node_id);
        let tick = state.bump();
        state.entries.insert(
            node_id.clone(),
            StoredEntry {
                result: result.clone(),
                metadata: metadata.clone(),
                size_bytes,
                tick,
            },
        );
        state.order.insert(tick, node_id.clone());
        state.size_bytes += size_bytes;

        if let Some(capacity) = self.capacity_bytes {
            state.evict_until(capacity);
        }
        Ok(())
    }

    fn read_result(&self, node_id: &NodeId) -> MemoResult<CachedResult> {
        let mut state = self.lock()?;
        match state.touch(node_id).map(|entry| entry.result.clone()) {
            Some(result) => {
                state.stats.hits += 1;
                Ok(result)
            }
            None => {
                state.stats.misses += 1;
                Err(CacheError::NotFound {
                    node_id: node_id.to_string(),
                }
                .into())
            }
        }
    }

    fn read_metadata(&self, node_id: &NodeId) -> MemoResult<Metadata> {
        let mut state = self.lock()?;
        state
            .touch(node_id)
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| {
                CacheError::NotFound {
                    node_id: node_id.to_string(),
                }
                .into()
            })
    }

    fn contains(&self, node_id: &NodeId) -> MemoResult<bool> {
        Ok(self.lock()?.entries.contains_key(node_id))
    }

    fn remove(&self, node_id: &NodeId) -> MemoResult<()> {
        let mut state = self.lock()?;
        match state.take(node_id) {
            Some(_) => Ok(()),
            None => Err(CacheError::NotFound {
                node_id: node_id.to_string(),
            }
            .into()),
        }
    }

    fn list_node_ids(&self) -> MemoResult<BTreeSet<NodeId>> {
        Ok(self.lock()?.entries.keys().cloned().collect())
    }

    fn list_node_ids_by_call_id(&self, _call_id: &CallId) -> MemoResult<Vec<NodeId>> {
        Err(Self::not_implemented("list_node_ids_by_call_id").into())
    }

    fn get_latest_node_id_by_call_id(&self, _call_id: &CallId) -> MemoResult<Option<NodeId>> {
        Err(Self::not_implemented("get_latest_node_id_by_call_id").into())
    }

    fn stats(&self) -> CacheStats {
        match self.lock() {
            Ok(state) => CacheStats {
                entry_count: state.entries.len() as u64,
                memory_bytes: state.size_bytes,
                ..state.stats.clone()
            },
            Err(_) => CacheStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoizer_core::{CallArgs, FunctionRef, MemoError};
    use chrono::NaiveDate;
    use serde_json::json;

    const F: FunctionRef = FunctionRef::new("tests", "f");

    fn entry(n: i64) -> (NodeId, Metadata) {
        let asof = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let args = CallArgs::new().arg(n);
        let call_id = CallId::from_call(&F, &args).unwrap();
        let node_id = NodeId::new(&call_id, asof);
        let metadata = Metadata {
            node_id: node_id.clone(),
            call_id,
            asof,
            module: "tests".to_string(),
            function: "f".to_string(),
            args: args.positional().to_vec(),
            kwargs: args.keywords().clone(),
            children: Vec::new(),
            start_time: asof,
            end_time: asof,
            cpu_time_sec: 0.0,
            source: String::new(),
            return_type: "i64".to_string(),
        };
        (node_id, metadata)
    }

    #[test]
    fn test_write_then_read() {
        let cache = InMemoryCache::unbounded();
        let (node_id, metadata) = entry(1);
        cache.write(&node_id, &json!(42), &metadata).unwrap();

        assert!(cache.contains(&node_id).unwrap());
        assert_eq!(cache.read_result(&node_id).unwrap(), json!(42));
        assert_eq!(cache.read_metadata(&node_id).unwrap(), metadata);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_missing_entry_is_not_found() {
        let cache = InMemoryCache::unbounded();
        let (node_id, _) = entry(1);
        assert!(cache.read_result(&node_id).unwrap_err().is_not_found());
        assert!(cache.read_metadata(&node_id).unwrap_err().is_not_found());
        assert!(cache.remove(&node_id).unwrap_err().is_not_found());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_overwrite_replaces_size() {
        let cache = InMemoryCache::unbounded();
        let (node_id, metadata) = entry(1);
        cache.write(&node_id, &json!("a"), &metadata).unwrap();
        let small = cache.size_bytes();
        cache
            .write(&node_id, &json!("a much longer value"), &metadata)
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.size_bytes(),
            entry_size(&json!("a much longer value"), &metadata).unwrap()
        );
        assert!(cache.size_bytes() > small);
    }

    #[test]
    fn test_lru_eviction_order() {
        let (id1, m1) = entry(1);
        let (id2, m2) = entry(2);
        let (id3, m3) = entry(3);
        let one = entry_size(&json!(0), &m1).unwrap();
        // Room for two entries, not three.
        let cache = InMemoryCache::new(Some(one * 2 + one / 2));

        cache.write(&id1, &json!(0), &m1).unwrap();
        cache.write(&id2, &json!(0), &m2).unwrap();
        // Reading id1 makes id2 the eviction candidate.
        cache.read_result(&id1).unwrap();
        cache.write(&id3, &json!(0), &m3).unwrap();

        assert!(cache.contains(&id1).unwrap());
        assert!(!cache.contains(&id2).unwrap());
        assert!(cache.contains(&id3).unwrap());
        assert_eq!(cache.lru_order().unwrap(), vec![id1, id3]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let (_, m) = entry(0);
        let one = entry_size(&json!(0), &m).unwrap();
        let capacity = one * 3;
        let cache = InMemoryCache::new(Some(capacity));
        for n in 0..20 {
            let (id, m) = entry(n);
            cache.write(&id, &json!(0), &m).unwrap();
            assert!(cache.size_bytes() <= capacity);
        }
        assert!(cache.len() <= 3);
    }

    #[test]
    fn test_oversized_entry_refused() {
        let (id, m) = entry(1);
        let size = entry_size(&json!("payload"), &m).unwrap();
        let cache = InMemoryCache::new(Some(size));
        cache.write(&id, &json!("payload"), &m).unwrap();
        assert!(!cache.contains(&id).unwrap());
        assert_eq!(cache.size_bytes(), 0);
        assert_eq!(cache.stats().refusals, 1);
    }

    #[test]
    fn test_contains_does_not_touch_recency() {
        let (id1, m1) = entry(1);
        let (id2, m2) = entry(2);
        let cache = InMemoryCache::unbounded();
        cache.write(&id1, &json!(1), &m1).unwrap();
        cache.write(&id2, &json!(2), &m2).unwrap();
        cache.contains(&id1).unwrap();
        assert_eq!(cache.lru_order().unwrap(), vec![id1, id2]);
    }

    #[test]
    fn test_listing() {
        let cache = InMemoryCache::unbounded();
        let (id1, m1) = entry(1);
        let (id2, m2) = entry(2);
        cache.write(&id1, &json!(1), &m1).unwrap();
        cache.write(&id2, &json!(2), &m2).unwrap();
        let ids = cache.list_node_ids().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&id1));

        let err = cache
            .list_node_ids_by_call_id(&m1.call_id)
            .unwrap_err();
        assert!(matches!(
            err,
            MemoError::Cache(CacheError::NotImplemented { .. })
        ));
        assert!(cache.get_latest_node_id_by_call_id(&m1.call_id).is_err());
    }

    #[test]
    fn test_remove() {
        let cache = InMemoryCache::unbounded();
        let (id, m) = entry(1);
        cache.write(&id, &json!(1), &m).unwrap();
        cache.remove(&id).unwrap();
        assert!(!cache.contains(&id).unwrap());
        assert_eq!(cache.size_bytes(), 0);
        assert!(cache.is_empty());
    }
}
