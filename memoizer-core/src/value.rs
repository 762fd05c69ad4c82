//! Argument value trees and call arguments
//!
//! Every argument of a memoized call is lowered into a [`Value`] before it is
//! encoded. The variants mirror the literal grammar of the call identity codec:
//! primitives, ordered sequences, unordered sets and mappings.

use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

// ============================================================================
// VALUE
// ============================================================================

/// A canonicalizable argument value.
///
/// `Set` and `Dict` keep their elements in a `Vec` so that floats and nested
/// tuples can be members; equality between two sets (or two dicts) ignores
/// element order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Set(Vec<Value>),
    Dict(Vec<(Value, Value)>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(b.into())
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(items.into_iter().collect())
    }

    pub fn dict(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::Dict(entries.into_iter().collect())
    }

    /// Short name of the variant, used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
        }
    }

    /// Whether this value may appear as a set element or a dict key.
    pub fn is_hashable(&self) -> bool {
        match self {
            Value::List(_) | Value::Set(_) | Value::Dict(_) => false,
            Value::Tuple(items) => items.iter().all(Value::is_hashable),
            _ => true,
        }
    }
}

fn same_elements<T>(a: &[T], b: &[T], eq: impl Fn(&T, &T) -> bool) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|x| {
        match b
            .iter()
            .enumerate()
            .find(|(i, y)| !used[*i] && eq(x, *y))
        {
            Some((i, _)) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) | (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                let mut a = a.clone();
                let mut b = b.clone();
                dedup_in_place(&mut a);
                dedup_in_place(&mut b);
                same_elements(&a, &b, |x, y| x == y)
            }
            (Value::Dict(a), Value::Dict(b)) => {
                same_elements(a, b, |(ka, va), (kb, vb)| ka == kb && va == vb)
            }
            _ => false,
        }
    }
}

fn dedup_in_place(items: &mut Vec<Value>) {
    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    *items = unique;
}

// ============================================================================
// CALL ARGUMENTS
// ============================================================================

/// Positional and keyword arguments of one call.
///
/// Keywords live in a `BTreeMap`, so the order in which they were supplied
/// never leaks into the encoded identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    positional: Vec<Value>,
    keywords: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already lowered positional values.
    pub fn from_positional(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: BTreeMap::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl ToValue) -> Self {
        self.positional.push(value.to_value());
        self
    }

    /// Set a keyword argument, replacing any earlier value for `name`.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl ToValue) -> Self {
        self.keywords.insert(name.into(), value.to_value());
        self
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn keywords(&self) -> &BTreeMap<String, Value> {
        &self.keywords
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    /// Convert positional argument `index` into a Rust value.
    pub fn get<T: FromValue>(&self, function: &str, index: usize) -> Result<T, CodecError> {
        let value = self
            .positional
            .get(index)
            .ok_or_else(|| CodecError::MissingArgument {
                function: function.to_string(),
                index,
            })?;
        T::from_value(value)
    }

    pub(crate) fn insert_keyword(&mut self, name: String, value: Value) -> bool {
        self.keywords.insert(name, value).is_none()
    }

    pub(crate) fn push_positional(&mut self, value: Value) {
        self.positional.push(value);
    }
}

// ============================================================================
// CONVERSION TRAITS
// ============================================================================

/// Lower a Rust value into a [`Value`] tree.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Rebuild a Rust value from a decoded [`Value`] tree.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, CodecError>;
}

fn mismatch(expected: &str, found: &Value) -> CodecError {
    CodecError::TypeMismatch {
        expected: expected.to_string(),
        found: found.kind().to_string(),
    }
}

/// Owned byte string; encodes as a `b'...'` literal rather than a list of ints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteString(pub Vec<u8>);

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        Ok(value.clone())
    }
}

impl ToValue for () {
    fn to_value(&self) -> Value {
        Value::None
    }
}

impl FromValue for () {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::None => Ok(()),
            other => Err(mismatch("None", other)),
        }
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }
}

macro_rules! int_value {
    ($($t:ty),*) => {
        $(
            impl ToValue for $t {
                fn to_value(&self) -> Value {
                    Value::Int(i64::from(*self))
                }
            }

            impl FromValue for $t {
                fn from_value(value: &Value) -> Result<Self, CodecError> {
                    match value {
                        Value::Int(i) => <$t>::try_from(*i).map_err(|_| CodecError::TypeMismatch {
                            expected: stringify!($t).to_string(),
                            found: format!("int {}", i),
                        }),
                        other => Err(mismatch(stringify!($t), other)),
                    }
                }
            }
        )*
    };
}

int_value!(i8, i16, i32, i64, u8, u16, u32);

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Float(f) => Ok(*f),
            other => Err(mismatch("float", other)),
        }
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(mismatch("str", other)),
        }
    }
}

impl ToValue for char {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl ToValue for ByteString {
    fn to_value(&self) -> Value {
        Value::Bytes(self.0.clone())
    }
}

impl FromValue for ByteString {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Bytes(b) => Ok(ByteString(b.clone())),
            other => Err(mismatch("bytes", other)),
        }
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::None => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        self.as_slice().to_value()
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::List(items) | Value::Tuple(items) => items.iter().map(T::from_value).collect(),
            other => Err(mismatch("list", other)),
        }
    }
}

impl<T: ToValue> ToValue for BTreeSet<T> {
    fn to_value(&self) -> Value {
        Value::Set(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue + Ord> FromValue for BTreeSet<T> {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Set(items) => items.iter().map(T::from_value).collect(),
            other => Err(mismatch("set", other)),
        }
    }
}

impl<T: ToValue, S> ToValue for HashSet<T, S> {
    fn to_value(&self) -> Value {
        Value::Set(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue + Eq + Hash> FromValue for HashSet<T> {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Set(items) => items.iter().map(T::from_value).collect(),
            other => Err(mismatch("set", other)),
        }
    }
}

impl<K: ToValue, V: ToValue> ToValue for BTreeMap<K, V> {
    fn to_value(&self) -> Value {
        Value::Dict(
            self.iter()
                .map(|(k, v)| (k.to_value(), v.to_value()))
                .collect(),
        )
    }
}

impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Dict(entries) => entries
                .iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(mismatch("dict", other)),
        }
    }
}

impl<K: ToValue, V: ToValue, S> ToValue for HashMap<K, V, S> {
    fn to_value(&self) -> Value {
        Value::Dict(
            self.iter()
                .map(|(k, v)| (k.to_value(), v.to_value()))
                .collect(),
        )
    }
}

impl<K: FromValue + Eq + Hash, V: FromValue> FromValue for HashMap<K, V> {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Dict(entries) => entries
                .iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(mismatch("dict", other)),
        }
    }
}

macro_rules! tuple_value {
    ($len:expr => $($name:ident : $idx:tt),+) => {
        impl<$($name: ToValue),+> ToValue for ($($name,)+) {
            fn to_value(&self) -> Value {
                Value::Tuple(vec![$(self.$idx.to_value()),+])
            }
        }

        impl<$($name: FromValue),+> FromValue for ($($name,)+) {
            fn from_value(value: &Value) -> Result<Self, CodecError> {
                match value {
                    Value::Tuple(items) if items.len() == $len => {
                        Ok(($($name::from_value(&items[$idx])?,)+))
                    }
                    other => Err(mismatch(concat!("tuple of ", stringify!($len)), other)),
                }
            }
        }
    };
}

tuple_value!(1 => A: 0);
tuple_value!(2 => A: 0, B: 1);
tuple_value!(3 => A: 0, B: 1, C: 2);
tuple_value!(4 => A: 0, B: 1, C: 2, D: 3);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_equality_ignores_order() {
        let a = Value::set([Value::Int(1), Value::Int(2), Value::Int(3)]);
        let b = Value::set([Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(a, b);
        assert_ne!(a, Value::set([Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_dict_equality_ignores_order() {
        let a = Value::dict([
            (Value::str("a"), Value::Int(1)),
            (Value::str("b"), Value::Int(2)),
        ]);
        let b = Value::dict([
            (Value::str("b"), Value::Int(2)),
            (Value::str("a"), Value::Int(1)),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_tuple_and_list_are_distinct() {
        assert_ne!(
            Value::tuple([Value::Int(1)]),
            Value::list([Value::Int(1)])
        );
    }

    #[test]
    fn test_hashable() {
        assert!(Value::tuple([Value::Int(1), Value::str("x")]).is_hashable());
        assert!(!Value::tuple([Value::list([])]).is_hashable());
        assert!(!Value::set([]).is_hashable());
    }

    #[test]
    fn test_rust_values_round_trip_through_value() {
        let map: BTreeMap<String, Vec<i32>> =
            [("x".to_string(), vec![1, 2]), ("y".to_string(), vec![])]
                .into_iter()
                .collect();
        let back = BTreeMap::<String, Vec<i32>>::from_value(&map.to_value()).unwrap();
        assert_eq!(map, back);

        let tuple = (1i64, "two".to_string(), Some(3.5f64));
        let back = <(i64, String, Option<f64>)>::from_value(&tuple.to_value()).unwrap();
        assert_eq!(tuple, back);
    }

    #[test]
    fn test_int_out_of_range_is_mismatch() {
        let err = u8::from_value(&Value::Int(300)).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn test_call_args_keywords_are_sorted() {
        let args = CallArgs::new()
            .arg(1i64)
            .kwarg("zeta", true)
            .kwarg("alpha", "x");
        let names: Vec<&str> = args.keywords().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(args.get::<i64>("f", 0).unwrap(), 1);
        assert!(matches!(
            args.get::<i64>("f", 1),
            Err(CodecError::MissingArgument { index: 1, .. })
        ));
    }
}
