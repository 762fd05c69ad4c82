//! Cache that stores nothing.

use super::traits::{Cache, CacheStats, CachedResult};
use memoizer_core::{CacheError, CallId, MemoResult, Metadata, NodeId};
use std::collections::BTreeSet;

/// Backend of the default context: every lookup misses and writes vanish.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCache;

impl NoOpCache {
    pub fn new() -> Self {
        Self
    }
}

impl Cache for NoOpCache {
    fn name(&self) -> &'static str {
        "NoOpCache"
    }

    fn write(&self, _node_id: &NodeId, _result: &CachedResult, _metadata: &Metadata) -> MemoResult<()> {
        Ok(())
    }

    fn read_result(&self, node_id: &NodeId) -> MemoResult<CachedResult> {
        Err(CacheError::NotFound {
            node_id: node_id.to_string(),
        }
        .into())
    }

    fn read_metadata(&self, node_id: &NodeId) -> MemoResult<Metadata> {
        Err(CacheError::NotFound {
            node_id: node_id.to_string(),
        }
        .into())
    }

    fn contains(&self, _node_id: &NodeId) -> MemoResult<bool> {
        Ok(false)
    }

    fn remove(&self, _node_id: &NodeId) -> MemoResult<()> {
        Ok(())
    }

    fn list_node_ids(&self) -> MemoResult<BTreeSet<NodeId>> {
        Ok(BTreeSet::new())
    }

    fn list_node_ids_by_call_id(&self, _call_id: &CallId) -> MemoResult<Vec<NodeId>> {
        Ok(Vec::new())
    }

    fn get_latest_node_id_by_call_id(&self, _call_id: &CallId) -> MemoResult<Option<NodeId>> {
        Ok(None)
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}
