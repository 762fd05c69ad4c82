//! Execution context: a per-thread stack of scopes.
//!
//! A scope fixes the cache that memoized calls read and write, the asof their
//! node identities are keyed on, and whether render hooks run after a miss.
//! Each thread starts with a default scope (no-op cache, asof `0001-01-01`,
//! rendering off). Nested scopes inherit every field they do not set.
//!
//! # Example
//!
//! ```ignore
//! let cache: SharedCache = Arc::new(InMemoryCache::unbounded());
//! let _scope = ScopeBuilder::new().cache(cache).asof(asof).enter()?;
//! fib(10)?; // cached under `asof`
//! // scope popped when `_scope` drops
//! ```

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use memoizer_core::{
    min_asof, truncate_asof, Asof, ContextError, MemoResult, MemoizerConfig,
};
use memoizer_storage::{build_cache, NoOpCache, SharedCache};
use tracing::trace;

// ============================================================================
// SCOPE
// ============================================================================

/// One entry of the context stack.
#[derive(Clone)]
pub struct Scope {
    cache: SharedCache,
    asof: Asof,
    render_html: bool,
    render_csv: bool,
}

impl Scope {
    fn root() -> Self {
        Self {
            cache: Arc::new(NoOpCache::new()),
            asof: min_asof(),
            render_html: false,
            render_csv: false,
        }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn asof(&self) -> Asof {
        self.asof
    }

    pub fn render_html(&self) -> bool {
        self.render_html
    }

    pub fn render_csv(&self) -> bool {
        self.render_csv
    }

    /// Push this scope onto the current thread's stack.
    pub fn enter(self) -> ScopeGuard {
        let depth = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            scopes.push(self);
            scopes.len()
        });
        trace!(depth, "Entered scope");
        ScopeGuard {
            depth,
            _not_send: PhantomData,
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("cache", &self.cache.name())
            .field("asof", &self.asof)
            .field("render_html", &self.render_html)
            .field("render_csv", &self.render_csv)
            .finish()
    }
}

thread_local! {
    static SCOPES: RefCell<Vec<Scope>> = RefCell::new(vec![Scope::root()]);
}

// ============================================================================
// BUILDER
// ============================================================================

/// Describes a nested scope. Unset fields inherit from the scope that is
/// current when the builder is built.
#[derive(Clone, Default)]
pub struct ScopeBuilder {
    cache: Option<SharedCache>,
    asof: Option<Asof>,
    render_html: Option<bool>,
    render_csv: Option<bool>,
}

impl ScopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for the cache, asof and render flags a configuration names.
    pub fn from_config(config: &MemoizerConfig) -> MemoResult<Self> {
        Ok(Self {
            cache: Some(build_cache(config)?),
            asof: config.asof,
            render_html: Some(config.render_html),
            render_csv: Some(config.render_csv),
        })
    }

    pub fn cache(mut self, cache: SharedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Asof of the scope, truncated to microseconds.
    pub fn asof(mut self, asof: Asof) -> Self {
        self.asof = Some(asof);
        self
    }

    pub fn render_html(mut self, enabled: bool) -> Self {
        self.render_html = Some(enabled);
        self
    }

    pub fn render_csv(mut self, enabled: bool) -> Self {
        self.render_csv = Some(enabled);
        self
    }

    /// Resolve against the current scope.
    ///
    /// Fails with `InvalidContext` when neither a cache nor an asof was set.
    pub fn build(self) -> MemoResult<Scope> {
        if self.cache.is_none() && self.asof.is_none() {
            return Err(ContextError::InvalidContext {
                reason: "a scope must set a cache, an asof, or both".to_string(),
            }
            .into());
        }
        let parent = current();
        Ok(Scope {
            cache: self.cache.unwrap_or(parent.cache),
            asof: truncate_asof(self.asof.unwrap_or(parent.asof)),
            render_html: self.render_html.unwrap_or(parent.render_html),
            render_csv: self.render_csv.unwrap_or(parent.render_csv),
        })
    }

    /// Build and enter in one step.
    pub fn enter(self) -> MemoResult<ScopeGuard> {
        Ok(self.build()?.enter())
    }
}

// ============================================================================
// GUARD
// ============================================================================

/// Pops its scope (and anything pushed above it) when dropped.
#[must_use = "the scope is popped as soon as the guard is dropped"]
pub struct ScopeGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl ScopeGuard {
    /// Stack depth including this guard's scope.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let depth = self.depth;
        let _ = SCOPES.try_with(|scopes| {
            scopes.borrow_mut().truncate(depth - 1);
        });
        trace!(depth, "Left scope");
    }
}

// ============================================================================
// ACCESSORS
// ============================================================================

/// The innermost scope of the current thread.
pub fn current() -> Scope {
    SCOPES.with(|scopes| scopes.borrow().last().cloned().unwrap_or_else(Scope::root))
}

pub fn current_cache() -> SharedCache {
    SCOPES.with(|scopes| match scopes.borrow().last() {
        Some(scope) => Arc::clone(&scope.cache),
        None => Scope::root().cache,
    })
}

pub fn current_asof() -> Asof {
    SCOPES.with(|scopes| {
        scopes
            .borrow()
            .last()
            .map(|scope| scope.asof)
            .unwrap_or_else(min_asof)
    })
}

/// Number of scopes on the current thread's stack, the default one included.
pub fn depth() -> usize {
    SCOPES.with(|scopes| scopes.borrow().len())
}

/// Run `f` inside the scope `builder` describes.
pub fn with_scope<T>(builder: ScopeBuilder, f: impl FnOnce() -> T) -> MemoResult<T> {
    let _guard = builder.enter()?;
    Ok(f())
}
