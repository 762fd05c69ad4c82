//! Memoizer Test Utilities
//!
//! Shared test infrastructure for the memoizer workspace:
//! - Proptest generators for argument value trees, call arguments and asofs
//! - Memoized fixture functions with per-thread evaluation counters
//! - Temporary cache helpers

// Re-export core types for convenience
pub use memoizer_core::{
    encode_value, Asof, CallArgs, CallId, FunctionRef, MemoError, MemoResult, Metadata, NodeId,
    Value,
};
pub use memoizer_engine::{memoize, Memoized, ScopeBuilder, ScopeGuard, SharedCache};
pub use memoizer_storage::{Cache, FileCache, InMemoryCache, NoOpCache};

use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
pub use tempfile::TempDir;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;

    /// Generate a finite float.
    pub fn arb_float() -> impl Strategy<Value = f64> {
        prop_oneof![
            any::<f64>().prop_filter("finite", |f| f.is_finite()),
            Just(0.0),
            Just(-0.5),
            Just(3.14),
            Just(1e20),
            Just(1e-7),
        ]
    }

    /// Generate a string mixing plain text, quotes and escapes.
    pub fn arb_text() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-zA-Z0-9 _]{0,12}",
            "['\"\\\\\n\t]{0,6}",
            any::<String>(),
        ]
    }

    /// Generate a value without containers.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::None),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            arb_float().prop_map(Value::Float),
            arb_text().prop_map(Value::Str),
            prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
        ]
    }

    /// Generate a value usable as a set element or dict key.
    pub fn arb_hashable() -> impl Strategy<Value = Value> {
        arb_scalar().prop_recursive(2, 8, 3, |inner| {
            prop::collection::vec(inner, 0..3).prop_map(Value::Tuple)
        })
    }

    /// Generate an arbitrary encodable value tree.
    pub fn arb_value() -> impl Strategy<Value = Value> {
        arb_scalar().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Tuple),
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
                prop::collection::vec(arb_hashable(), 0..4).prop_map(Value::Set),
                prop::collection::vec((arb_hashable(), inner), 0..4).prop_map(unique_keys),
            ]
        })
    }

    /// Drop entries whose key encodes the same as an earlier one.
    fn unique_keys(entries: Vec<(Value, Value)>) -> Value {
        let mut seen = HashSet::new();
        Value::Dict(
            entries
                .into_iter()
                .filter(|(key, _)| encode_value(key).map_or(false, |text| seen.insert(text)))
                .collect(),
        )
    }

    /// Generate a keyword argument name.
    pub fn arb_keyword() -> impl Strategy<Value = String> {
        "[a-z_][a-z0-9_]{0,8}"
    }

    /// Generate positional and keyword arguments.
    pub fn arb_call_args() -> impl Strategy<Value = CallArgs> {
        (
            prop::collection::vec(arb_value(), 0..4),
            prop::collection::btree_map(arb_keyword(), arb_value(), 0..3),
        )
            .prop_map(|(positional, keywords)| {
                keywords
                    .into_iter()
                    .fold(CallArgs::from_positional(positional), |args, (k, v)| {
                        args.kwarg(k, v)
                    })
            })
    }

    /// Generate an asof at microsecond precision, exercising every format tier.
    pub fn arb_asof() -> impl Strategy<Value = Asof> {
        let date = (1u32..=9999, 1u32..=12, 1u32..=28)
            .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y as i32, m, d).unwrap_or_default());
        prop_oneof![
            date.clone().prop_map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default()),
            (date.clone(), 0u32..24, 0u32..60, 0u32..60).prop_map(|(d, h, mi, s)| {
                d.and_hms_opt(h, mi, s).unwrap_or_default()
            }),
            (date, 0u32..24, 0u32..60, 0u32..60, 0u32..1_000_000).prop_map(
                |(d, h, mi, s, us)| d.and_hms_micro_opt(h, mi, s, us).unwrap_or_default()
            ),
        ]
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static FIB_EVALS: Cell<u64> = const { Cell::new(0) };
        static LEAF_EVALS: Cell<u64> = const { Cell::new(0) };
    }

    fn bump(counter: &'static std::thread::LocalKey<Cell<u64>>) {
        counter.with(|c| c.set(c.get() + 1));
    }

    /// Evaluations of [`fib`] on this thread since the last reset.
    pub fn fib_evaluations() -> u64 {
        FIB_EVALS.with(Cell::get)
    }

    /// Evaluations of [`leaf`] on this thread since the last reset.
    pub fn leaf_evaluations() -> u64 {
        LEAF_EVALS.with(Cell::get)
    }

    pub fn reset_counters() {
        FIB_EVALS.with(|c| c.set(0));
        LEAF_EVALS.with(|c| c.set(0));
    }

    memoize! {
        /// Fibonacci numbers, memoized at every level.
        pub fn fib(n: i64) -> Result<i64, MemoError> as FIB {
            bump(&FIB_EVALS);
            if n < 2 {
                return Ok(n);
            }
            Ok(fib(n - 1)? + fib(n - 2)?)
        }
    }

    memoize! {
        /// Sleeps `millis` and echoes `label`.
        pub fn leaf(label: String, millis: u32) -> Result<String, MemoError> as LEAF {
            bump(&LEAF_EVALS);
            std::thread::sleep(std::time::Duration::from_millis(u64::from(millis)));
            Ok(label)
        }
    }

    memoize! {
        /// Calls two slow leaves, then sleeps `millis` itself.
        pub fn parent(millis: u32) -> Result<Vec<String>, MemoError> as PARENT {
            let a = leaf("a".to_string(), 40)?;
            let b = leaf("b".to_string(), 40)?;
            std::thread::sleep(std::time::Duration::from_millis(u64::from(millis)));
            Ok(vec![a, b])
        }
    }

    memoize! {
        /// Fails with `reason` once `n` reaches zero; recurses otherwise.
        pub fn countdown(n: i64, reason: String) -> Result<i64, MemoError> as COUNTDOWN {
            if n <= 0 {
                return Err(MemoError::evaluation(reason));
            }
            countdown(n - 1, reason)
        }
    }

    /// Register every fixture with the function registry.
    pub fn register_all() -> MemoResult<()> {
        FIB.register()?;
        LEAF.register()?;
        PARENT.register()?;
        COUNTDOWN.register()?;
        Ok(())
    }
}

// ============================================================================
// CACHE HELPERS
// ============================================================================

/// Midnight on the given date.
pub fn asof(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// A fresh unbounded in-memory cache.
pub fn memory_cache() -> SharedCache {
    Arc::new(InMemoryCache::unbounded())
}

/// A file cache in a new temporary directory. Keep the `TempDir` alive for
/// as long as the cache is used.
pub fn temp_file_cache(front_capacity_bytes: u64) -> (TempDir, Arc<FileCache>) {
    let dir = TempDir::new().unwrap_or_else(|e| panic!("failed to create temp dir: {}", e));
    let cache = Arc::new(FileCache::new(dir.path(), front_capacity_bytes));
    (dir, cache)
}

/// Enter a scope with `cache` and `asof`.
pub fn enter(cache: SharedCache, asof: Asof) -> ScopeGuard {
    ScopeBuilder::new()
        .cache(cache)
        .asof(asof)
        .enter()
        .unwrap_or_else(|e| panic!("failed to enter scope: {}", e))
}
