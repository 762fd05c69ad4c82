//! Memoizer Engine - Scopes, Call Graphs and Memoized Evaluation
//!
//! Ties the identity types from `memoizer-core` to the cache backends of
//! `memoizer-storage`:
//! - [`context`]: per-thread scope stack (cache, asof, render flags)
//! - [`tracker`]: frames of in-flight evaluations, children and self time
//! - [`memoized`]: the [`Memoized`] handle, [`blow_cache`] and [`memoize!`]
//! - [`reeval`]: evaluate a stored node identity through the registry
//! - [`render`]: per-thread render hooks
//! - [`telemetry`]: tracing subscriber setup

pub mod context;
pub mod memoized;
pub mod reeval;
pub mod render;
pub mod telemetry;
pub mod tracker;

pub use context::{
    current, current_asof, current_cache, with_scope, Scope, ScopeBuilder, ScopeGuard,
};
pub use memoized::{blow_cache, Body, Memoized};
pub use reeval::{latest, reevaluate};
pub use render::RenderHook;
pub use telemetry::{init_tracing, TelemetryConfig, TelemetryError};
pub use tracker::{ChildTiming, CompletedFrame, FrameGuard};

// Used by `memoize!` expansions.
pub use memoizer_core::{CallArgs, FunctionRef, MemoError, MemoResult};
pub use memoizer_storage::{Cache, SharedCache};
