//! Memoized functions.
//!
//! A [`Memoized`] handle pairs a function body with the reference that names
//! it in call identities. Calling it consults the current scope's cache under
//! the node identity `<call>@<asof>`; on a miss it evaluates the body inside
//! a tracker frame, writes the result with its [`Metadata`], and returns it.
//!
//! The [`memoize!`](crate::memoize) macro declares a plain Rust function
//! backed by a static handle.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDateTime, TimeDelta, Utc};
use memoizer_core::{
    registry, CallArgs, CallId, FunctionRef, Identify, Invoker, MemoError, MemoResult,
    Metadata, NodeId, RegisteredFunction,
};
use memoizer_storage::{from_blob, to_blob};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::context;
use crate::render;
use crate::tracker::{self, ChildTiming};

/// Body of a memoized function: arguments in, typed result out.
pub type Body<R, E> = fn(&CallArgs) -> Result<R, E>;

/// A function whose results are cached per node identity.
///
/// `E` is the caller's error type; infrastructure failures (encoding, cache
/// I/O) reach it through `From<MemoError>`, and errors from the body pass
/// through unchanged.
pub struct Memoized<R, E = MemoError> {
    function: FunctionRef,
    source: &'static str,
    body: Body<R, E>,
}

impl<R, E> Memoized<R, E> {
    pub const fn new(function: FunctionRef, source: &'static str, body: Body<R, E>) -> Self {
        Self {
            function,
            source,
            body,
        }
    }

    pub fn function(&self) -> &FunctionRef {
        &self.function
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    /// Call identity of `args`.
    pub fn call_id(&self, args: &CallArgs) -> MemoResult<CallId> {
        CallId::from_call(&self.function, args)
    }

    /// Node identity of `args` under the current scope.
    pub fn node_id(&self, args: &CallArgs) -> MemoResult<NodeId> {
        Ok(NodeId::new(&self.call_id(args)?, context::current_asof()))
    }
}

impl<R, E> Identify for Memoized<R, E> {
    fn function_ref(&self) -> &FunctionRef {
        &self.function
    }
}

impl<R, E> fmt::Debug for Memoized<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("function", &self.function)
            .field("return_type", &type_name::<R>())
            .finish_non_exhaustive()
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Monotonic time since `clock`; wall-clock steps never make it negative.
fn elapsed(clock: Instant) -> TimeDelta {
    TimeDelta::from_std(clock.elapsed()).unwrap_or_else(|_| TimeDelta::zero())
}

fn seconds(delta: TimeDelta) -> f64 {
    delta
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or_else(|| delta.num_milliseconds() as f64 / 1_000.0)
}

impl<R, E> Memoized<R, E>
where
    R: Serialize + DeserializeOwned,
    E: From<MemoError>,
{
    /// Evaluate through the current scope's cache.
    pub fn call(&self, args: &CallArgs) -> Result<R, E> {
        let scope = context::current();
        let call_id = self.call_id(args)?;
        let node_id = NodeId::new(&call_id, scope.asof());
        tracker::record_child(&node_id);
        let cache = scope.cache();

        match cache.read_result(&node_id) {
            Ok(cached) => {
                debug!(node_id = %node_id, "Cache hit");
                return Ok(from_blob(cached)?);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        info!(node_id = %node_id, "eval");
        let start = now();
        let clock = Instant::now();
        let frame = tracker::push_frame(node_id.clone());
        let outcome = (self.body)(args);
        let wall = elapsed(clock);
        let end = start + wall;
        let completed = frame.finish();
        // The parent spent this time in a child, whether or not it succeeded.
        tracker::record_timing(ChildTiming {
            node_id: node_id.clone(),
            start,
            end,
            wall,
        });
        let value = outcome?;

        let (children, children_wall) = match completed {
            Some(frame) => {
                let children_wall = frame.children_wall();
                (frame.children, children_wall)
            }
            None => (Vec::new(), TimeDelta::zero()),
        };
        let self_time = (wall - children_wall).max(TimeDelta::zero());

        let result = to_blob(&value)?;
        let metadata = Metadata {
            node_id: node_id.clone(),
            call_id,
            asof: scope.asof(),
            module: self.function.module().to_string(),
            function: self.function.name().to_string(),
            args: args.positional().to_vec(),
            kwargs: args.keywords().clone(),
            children,
            start_time: start,
            end_time: end,
            cpu_time_sec: seconds(self_time),
            source: self.source.to_string(),
            return_type: type_name::<R>().to_string(),
        };
        cache.write(&node_id, &result, &metadata)?;
        render::run(&scope, &node_id, &result, &metadata)?;

        info!(
            node_id = %node_id,
            wall_sec = seconds(wall),
            self_sec = metadata.cpu_time_sec,
            "done"
        );
        Ok(value)
    }

    /// Drop the cached result of `args` under the current scope, if any.
    pub fn blow_cache(&self, args: &CallArgs) -> Result<(), E> {
        blow_cache(self, args).map_err(E::from)
    }
}

impl<R, E> Memoized<R, E>
where
    R: Serialize + DeserializeOwned + 'static,
    E: From<MemoError> + Into<MemoError> + 'static,
{
    /// Make this function resolvable from its call identities.
    ///
    /// The registered invoker evaluates under the caller's current scope and
    /// converts body errors back into [`MemoError`].
    pub fn register(&'static self) -> MemoResult<()> {
        let invoker: Invoker = Arc::new(move |args: &CallArgs| -> MemoResult<()> {
            self.call(args).map(|_| ()).map_err(Into::into)
        });
        registry::register(RegisteredFunction::new(
            self.function.clone(),
            self.source,
            invoker,
        ))?;
        debug!(function = %self.function, "Registered memoized function");
        Ok(())
    }
}

/// Remove the node identity of `function(args)` under the current scope from
/// the current cache, when present.
pub fn blow_cache(function: &impl Identify, args: &CallArgs) -> MemoResult<()> {
    let scope = context::current();
    let node_id = NodeId::from_call(scope.asof(), function, args)?;
    let cache = scope.cache();
    if cache.contains(&node_id)? {
        cache.remove(&node_id)?;
        info!(node_id = %node_id, "Removed from cache");
    }
    Ok(())
}

/// Declare a memoized function.
///
/// ```ignore
/// memoize! {
///     /// Fibonacci numbers.
///     pub fn fib(n: i64) -> Result<i64, MemoError> as FIB {
///         if n < 2 { return Ok(n); }
///         Ok(fib(n - 1)? + fib(n - 2)?)
///     }
/// }
/// ```
///
/// This expands to a static `FIB: Memoized<i64, MemoError>` named
/// `<module_path>.fib`, and a function `fib(n: i64) -> Result<i64, MemoError>`
/// that calls through it. Parameters must implement `ToValue` and `FromValue`;
/// the error type must implement `From<MemoError>`.
#[macro_export]
macro_rules! memoize {
    (
        $(#[$attr:meta])*
        $vis:vis fn $name:ident ( $( $arg:ident : $ty:ty ),* $(,)? )
            -> Result<$ret:ty, $err:ty> as $handle:ident $body:block
    ) => {
        $vis static $handle: $crate::Memoized<$ret, $err> = $crate::Memoized::new(
            $crate::FunctionRef::new(::std::module_path!(), ::std::stringify!($name)),
            ::std::stringify!(fn $name ( $( $arg : $ty ),* ) -> Result<$ret, $err> $body),
            {
                fn __memoized_body(
                    __args: &$crate::CallArgs,
                ) -> ::std::result::Result<$ret, $err> {
                    #[allow(unused_mut, unused_variables)]
                    let mut __index = 0usize;
                    $(
                        let $arg: $ty = __args
                            .get::<$ty>(::std::stringify!($name), __index)
                            .map_err(|e| <$err>::from($crate::MemoError::from(e)))?;
                        __index += 1;
                    )*
                    $body
                }
                __memoized_body
            },
        );

        $(#[$attr])*
        $vis fn $name ( $( $arg : $ty ),* ) -> ::std::result::Result<$ret, $err> {
            $handle.call(&$crate::CallArgs::new() $( .arg($arg) )*)
        }
    };
}
