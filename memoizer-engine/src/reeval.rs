//! Re-evaluation of stored node identities.
//!
//! Given only a cache and a node identity (say, from a link or a query
//! string), decode the call, resolve its function through the registry and
//! evaluate it under that cache and asof. Only registered functions can be
//! re-evaluated.

use std::sync::Arc;

use memoizer_core::{Identify, MemoResult, Metadata, NodeId};
use memoizer_storage::{CachedResult, SharedCache};
use tracing::info;

use crate::context::ScopeBuilder;

/// Make sure `cache` holds `node_id`, evaluating it if needed, and return
/// the stored result with its metadata.
pub fn reevaluate(cache: &SharedCache, node_id: &NodeId) -> MemoResult<(CachedResult, Metadata)> {
    if !cache.contains(node_id)? {
        let (call_id, asof) = node_id.split()?;
        let (function, args) = call_id.to_call()?;
        info!(
            node_id = %node_id,
            function = %function.function_ref(),
            "Re-evaluating"
        );
        let _scope = ScopeBuilder::new()
            .cache(Arc::clone(cache))
            .asof(asof)
            .enter()?;
        function.invoke(&args)?;
    }
    Ok((cache.read_result(node_id)?, cache.read_metadata(node_id)?))
}

/// The stored evaluation of `node_id`'s call with the greatest asof, if the
/// cache can list by call identity.
pub fn latest(cache: &SharedCache, node_id: &NodeId) -> MemoResult<Option<NodeId>> {
    cache.get_latest_node_id_by_call_id(&node_id.call_id()?)
}
