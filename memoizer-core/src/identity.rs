//! Identity types for memoized calls
//!
//! A [`CallId`] names one call (function + arguments); a [`NodeId`] pins a
//! call to an asof timestamp and is the key every cache backend uses.

use crate::codec::{encode_call, parse_call};
use crate::error::{IdentityError, MemoResult};
use crate::registry::{self, RegisteredFunction};
use crate::timestamp::{format_asof, parse_asof, Asof};
use crate::value::CallArgs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;

/// Maximum length of a cache filename derived from a call identity.
pub const FILENAME_MAX_LEN: usize = 128;

/// Characters (besides ASCII letters and digits) left untouched in filenames.
pub const FILENAME_ALLOWED_CHARS: &str = " !#$%&()+-.;=@{}~[]^_";

/// Maximum length of an identity query string.
pub const QUERYSTRING_MAX_LEN: usize = 512;

// ============================================================================
// FUNCTION REFERENCE
// ============================================================================

/// Module-qualified function name, rendered as `<module>.<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionRef {
    module: Cow<'static, str>,
    name: Cow<'static, str>,
}

impl FunctionRef {
    /// Const constructor so memoized handles can live in statics.
    pub const fn new(module: &'static str, name: &'static str) -> Self {
        Self {
            module: Cow::Borrowed(module),
            name: Cow::Borrowed(name),
        }
    }

    pub fn owned(module: String, name: String) -> Self {
        Self {
            module: Cow::Owned(module),
            name: Cow::Owned(name),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// Anything that names a function for identity purposes.
///
/// Wrappers (memoized handles, registry entries) return the reference of the
/// function they wrap, so wrapping never shows up in a call identity.
pub trait Identify {
    fn function_ref(&self) -> &FunctionRef;
}

impl Identify for FunctionRef {
    fn function_ref(&self) -> &FunctionRef {
        self
    }
}

impl<T: Identify + ?Sized> Identify for &T {
    fn function_ref(&self) -> &FunctionRef {
        (**self).function_ref()
    }
}

// ============================================================================
// CALL IDENTITY
// ============================================================================

/// Canonical text of a call: `module.func(arg,...,key=value,...)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Wrap an existing identity string without validating it.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Encode a call.
    pub fn from_call(function: &impl Identify, args: &CallArgs) -> MemoResult<Self> {
        let function = function.function_ref();
        Ok(Self(encode_call(&function.qualified_name(), args)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse back into function reference and arguments, without resolving
    /// the function.
    pub fn parse(&self) -> MemoResult<(FunctionRef, CallArgs)> {
        Ok(parse_call(&self.0)?)
    }

    /// Parse and resolve the function through the registry.
    pub fn to_call(&self) -> MemoResult<(RegisteredFunction, CallArgs)> {
        let (function, args) = self.parse()?;
        let registered = registry::resolve(&function.qualified_name())?;
        Ok((registered, args))
    }

    /// Filesystem-safe form, at most [`FILENAME_MAX_LEN`] characters.
    pub fn to_filename(&self) -> String {
        to_filename(&self.0)
    }

    pub fn to_query_string(&self) -> MemoResult<String> {
        let query = format!("call={}", urlencoding::encode(&self.0));
        check_query_len(query)
    }

    pub fn from_query_string(query: &str) -> MemoResult<Self> {
        Ok(Self(query_value(query, "call")?))
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// NODE IDENTITY
// ============================================================================

/// A call pinned to an asof: `<call identity>@<timestamp>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an existing node identity string without validating it.
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn new(call_id: &CallId, asof: Asof) -> Self {
        Self(format!("{}@{}", call_id.0, format_asof(&asof)))
    }

    pub fn from_call(asof: Asof, function: &impl Identify, args: &CallArgs) -> MemoResult<Self> {
        Ok(Self::new(&CallId::from_call(function, args)?, asof))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split on the last `@` into call identity and asof.
    pub fn split(&self) -> MemoResult<(CallId, Asof)> {
        let idx = self
            .0
            .rfind('@')
            .ok_or_else(|| IdentityError::MissingSeparator { id: self.0.clone() })?;
        let asof = parse_asof(&self.0[idx + 1..])?;
        Ok((CallId(self.0[..idx].to_string()), asof))
    }

    pub fn call_id(&self) -> MemoResult<CallId> {
        self.split().map(|(call_id, _)| call_id)
    }

    pub fn asof(&self) -> MemoResult<Asof> {
        self.split().map(|(_, asof)| asof)
    }

    pub fn to_query_string(&self) -> MemoResult<String> {
        let (call_id, asof) = self.split()?;
        let query = format!(
            "call={}&asof={}",
            urlencoding::encode(call_id.as_str()),
            urlencoding::encode(&format_asof(&asof))
        );
        check_query_len(query)
    }

    pub fn from_query_string(query: &str) -> MemoResult<Self> {
        let call_id = CallId(query_value(query, "call")?);
        let asof = parse_asof(&query_value(query, "asof")?)?;
        Ok(Self::new(&call_id, asof))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn to_filename(id: &str) -> String {
    let mut encoded = String::with_capacity(id.len());
    for &byte in id.as_bytes() {
        if byte.is_ascii_alphanumeric() || FILENAME_ALLOWED_CHARS.as_bytes().contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    if encoded.len() > FILENAME_MAX_LEN {
        let hash = hex::encode(Sha256::digest(encoded.as_bytes()));
        let keep = FILENAME_MAX_LEN - hash.len() - 1;
        encoded.truncate(keep);
        encoded.push('@');
        encoded.push_str(&hash);
    }
    encoded
}

fn check_query_len(query: String) -> MemoResult<String> {
    if query.len() > QUERYSTRING_MAX_LEN {
        return Err(IdentityError::QueryStringTooLong {
            len: query.len(),
            max: QUERYSTRING_MAX_LEN,
        }
        .into());
    }
    Ok(query)
}

fn query_value(query: &str, key: &str) -> MemoResult<String> {
    let raw = query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
        .ok_or_else(|| IdentityError::MissingQueryKey {
            key: key.to_string(),
        })?;
    let raw = raw.replace('+', " ");
    let decoded = urlencoding::decode(&raw).map_err(|e| {
        IdentityError::QueryDecode {
            reason: e.to_string(),
        }
    })?;
    Ok(decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoError;
    use crate::value::Value;
    use chrono::NaiveDate;

    const QUOTE: FunctionRef = FunctionRef::new("urllib.parse", "quote");

    fn asof() -> Asof {
        NaiveDate::from_ymd_opt(2024, 4, 27)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_call_id_examples() {
        let cases = vec![
            ("urllib.parse.quote()", CallArgs::new()),
            (
                "urllib.parse.quote('hello',3.14,(None,(None,False,'abc')))",
                CallArgs::new().arg("hello").arg(3.14f64).arg(Value::tuple([
                    Value::None,
                    Value::tuple([Value::None, Value::Bool(false), Value::str("abc")]),
                ])),
            ),
            (
                "urllib.parse.quote(hello=3.14,world=None)",
                CallArgs::new()
                    .kwarg("world", Value::None)
                    .kwarg("hello", 3.14f64),
            ),
        ];
        for (text, args) in cases {
            let id = CallId::from_call(&QUOTE, &args).unwrap();
            assert_eq!(id.as_str(), text);
            let (function, parsed) = id.parse().unwrap();
            assert_eq!(function, QUOTE);
            assert_eq!(parsed, args);
        }
    }

    #[test]
    fn test_node_id_split_uses_last_at() {
        let call_id = CallId::from_call(&QUOTE, &CallArgs::new().arg("a@b")).unwrap();
        let node_id = NodeId::new(&call_id, asof());
        assert_eq!(
            node_id.as_str(),
            "urllib.parse.quote('a@b')@2024-04-27 12:00:00"
        );
        let (back_call, back_asof) = node_id.split().unwrap();
        assert_eq!(back_call, call_id);
        assert_eq!(back_asof, asof());
    }

    #[test]
    fn test_node_id_without_separator() {
        let err = NodeId::from_raw("m.f()").split().unwrap_err();
        assert!(matches!(
            err,
            MemoError::Identity(IdentityError::MissingSeparator { .. })
        ));
    }

    #[test]
    fn test_query_string_round_trip() {
        let call_id = CallId::from_call(&QUOTE, &CallArgs::new().arg("a b&c=d")).unwrap();
        let node_id = NodeId::new(&call_id, asof());
        let query = node_id.to_query_string().unwrap();
        assert!(query.starts_with("call="));
        assert!(query.contains("&asof=2024-04-27%2012%3A00%3A00"));
        assert_eq!(NodeId::from_query_string(&query).unwrap(), node_id);

        let call_query = call_id.to_query_string().unwrap();
        assert_eq!(CallId::from_query_string(&call_query).unwrap(), call_id);
    }

    #[test]
    fn test_query_string_keys_any_order() {
        let parsed = NodeId::from_query_string("asof=2024-04-27&call=m.f%28%29").unwrap();
        assert_eq!(parsed.as_str(), "m.f()@2024-04-27");
    }

    #[test]
    fn test_query_string_plus_decodes_as_space() {
        let parsed = NodeId::from_query_string("call=m.f%28%27a+b%27%29&asof=2024-04-27").unwrap();
        assert_eq!(parsed.as_str(), "m.f('a b')@2024-04-27");
        let call_id = CallId::from_query_string("call=m.f%28%27c+d%27%29").unwrap();
        assert_eq!(call_id.as_str(), "m.f('c d')");
    }

    #[test]
    fn test_query_string_too_long() {
        let call_id = CallId::from_call(&QUOTE, &CallArgs::new().arg("x".repeat(600))).unwrap();
        let err = call_id.to_query_string().unwrap_err();
        assert!(matches!(
            err,
            MemoError::Identity(IdentityError::QueryStringTooLong { .. })
        ));
    }

    #[test]
    fn test_missing_query_key() {
        let err = NodeId::from_query_string("call=m.f%28%29").unwrap_err();
        assert!(matches!(
            err,
            MemoError::Identity(IdentityError::MissingQueryKey { .. })
        ));
    }

    #[test]
    fn test_filename_allow_list() {
        let id = CallId::new("m.f('a/b',\"c\")");
        assert_eq!(id.to_filename(), "m.f(%27a%2Fb%27%2C%22c%22)");
    }

    #[test]
    fn test_filename_truncation() {
        let id = CallId::new(format!("m.f('{}')", "x".repeat(300)));
        let name = id.to_filename();
        assert_eq!(name.len(), FILENAME_MAX_LEN);
        assert_eq!(name.as_bytes()[FILENAME_MAX_LEN - 65], b'@');
        let other = CallId::new(format!("m.f('{}')", "x".repeat(301))).to_filename();
        assert_ne!(name, other);
        assert_eq!(name[..63], other[..63]);
    }

    #[test]
    fn test_filename_short_ids_untouched_length() {
        let id = CallId::new("m.f(1)");
        assert_eq!(id.to_filename(), "m.f(1)");
    }
}
