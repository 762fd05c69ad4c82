//! Function Registry
//!
//! Process-wide map from qualified function names to invokers. Decoding a
//! call identity resolves its function here instead of loading code by name,
//! so only functions that were explicitly registered can be re-evaluated.

use crate::error::{MemoResult, RegistryError};
use crate::identity::{FunctionRef, Identify};
use crate::value::CallArgs;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Type-erased entry point of a registered function.
///
/// Invoking it evaluates the call under the caller's current context; the
/// result ends up in that context's cache rather than being returned.
pub type Invoker = Arc<dyn Fn(&CallArgs) -> MemoResult<()> + Send + Sync>;

/// A resolved registry entry.
#[derive(Clone)]
pub struct RegisteredFunction {
    function: FunctionRef,
    source: &'static str,
    invoker: Invoker,
}

impl RegisteredFunction {
    pub fn new(function: FunctionRef, source: &'static str, invoker: Invoker) -> Self {
        Self {
            function,
            source,
            invoker,
        }
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn invoke(&self, args: &CallArgs) -> MemoResult<()> {
        (self.invoker)(args)
    }
}

impl Identify for RegisteredFunction {
    fn function_ref(&self) -> &FunctionRef {
        &self.function
    }
}

impl PartialEq for RegisteredFunction {
    fn eq(&self, other: &Self) -> bool {
        self.function == other.function
    }
}

impl fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("function", &self.function)
            .finish_non_exhaustive()
    }
}

static REGISTRY: Lazy<RwLock<HashMap<String, RegisteredFunction>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register (or replace) a function under its qualified name.
pub fn register(entry: RegisteredFunction) -> MemoResult<()> {
    let mut registry = REGISTRY.write().map_err(|_| RegistryError::LockPoisoned)?;
    registry.insert(entry.function.qualified_name(), entry);
    Ok(())
}

/// Look a function up by its qualified name (`module.name`).
pub fn resolve(qualified_name: &str) -> MemoResult<RegisteredFunction> {
    let registry = REGISTRY.read().map_err(|_| RegistryError::LockPoisoned)?;
    registry.get(qualified_name).cloned().ok_or_else(|| {
        RegistryError::Unresolved {
            qualified_name: qualified_name.to_string(),
        }
        .into()
    })
}

pub fn is_registered(qualified_name: &str) -> bool {
    REGISTRY
        .read()
        .map(|registry| registry.contains_key(qualified_name))
        .unwrap_or(false)
}

/// Qualified names of all registered functions, sorted.
pub fn registered_names() -> Vec<String> {
    let mut names: Vec<String> = REGISTRY
        .read()
        .map(|registry| registry.keys().cloned().collect())
        .unwrap_or_default();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoError;
    use crate::identity::CallId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_and_resolve() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let function = FunctionRef::new("memoizer_core::registry::tests", "counted");
        register(RegisteredFunction::new(
            function.clone(),
            "fn counted() {}",
            Arc::new(|_: &CallArgs| -> MemoResult<()> {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ))
        .unwrap();

        assert!(is_registered("memoizer_core::registry::tests.counted"));
        assert!(registered_names().contains(&"memoizer_core::registry::tests.counted".to_string()));

        let call_id = CallId::from_call(&function, &CallArgs::new().arg(1i64)).unwrap();
        let (resolved, args) = call_id.to_call().unwrap();
        assert_eq!(resolved.function_ref(), &function);
        assert_eq!(resolved.source(), "fn counted() {}");
        resolved.invoke(&args).unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unresolved_function() {
        let call_id = CallId::new("nowhere::at_all.missing(1)");
        let err = call_id.to_call().unwrap_err();
        assert!(matches!(
            err,
            MemoError::Registry(RegistryError::Unresolved { .. })
        ));
    }
}
