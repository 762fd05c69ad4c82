//! Render hooks.
//!
//! After a cache miss, when the scope's `render_html` or `render_csv` flag is
//! set, the evaluator hands the fresh result to the hook installed on the
//! current thread. No renderer ships with the crate; the default does
//! nothing.

use std::cell::RefCell;
use std::sync::Arc;

use memoizer_core::{MemoResult, Metadata, NodeId};
use memoizer_storage::CachedResult;
use tracing::debug;

use crate::context::Scope;

/// Produces derived artifacts from freshly evaluated results.
pub trait RenderHook {
    fn render_html(
        &self,
        node_id: &NodeId,
        result: &CachedResult,
        metadata: &Metadata,
    ) -> MemoResult<()>;

    fn render_csv(
        &self,
        node_id: &NodeId,
        result: &CachedResult,
        metadata: &Metadata,
    ) -> MemoResult<()>;
}

thread_local! {
    static HOOK: RefCell<Option<Arc<dyn RenderHook>>> = const { RefCell::new(None) };
}

/// Install `hook` for the current thread, returning the previous one.
pub fn install(hook: Arc<dyn RenderHook>) -> Option<Arc<dyn RenderHook>> {
    HOOK.with(|slot| slot.borrow_mut().replace(hook))
}

/// Remove the current thread's hook.
pub fn uninstall() -> Option<Arc<dyn RenderHook>> {
    HOOK.with(|slot| slot.borrow_mut().take())
}

/// Run the installed hook for whichever render flags `scope` has set.
pub(crate) fn run(
    scope: &Scope,
    node_id: &NodeId,
    result: &CachedResult,
    metadata: &Metadata,
) -> MemoResult<()> {
    if !scope.render_html() && !scope.render_csv() {
        return Ok(());
    }
    // Clone out of the slot so a hook may itself call memoized functions.
    let Some(hook) = HOOK.with(|slot| slot.borrow().clone()) else {
        debug!(node_id = %node_id, "Render requested but no hook installed");
        return Ok(());
    };
    if scope.render_html() {
        hook.render_html(node_id, result, metadata)?;
    }
    if scope.render_csv() {
        hook.render_csv(node_id, result, metadata)?;
    }
    Ok(())
}
