//! Property-Based Tests for the Call Identity Codec
//!
//! Properties:
//! - decode(encode(f, args, kwargs)) == (f, args, kwargs)
//! - encoding ignores the order of set elements, dict entries and keywords
//! - distinct calls never share an identity
//! - timestamps round-trip through their minimal text form

use memoizer_core::{
    encode_value, format_asof, parse_asof, parse_value, CallArgs, CallId, FunctionRef, NodeId,
    Value,
};
use memoizer_test_utils::generators::{arb_asof, arb_call_args, arb_hashable, arb_value};
use proptest::prelude::*;
use std::collections::HashSet;

const TEST_FUN: FunctionRef = FunctionRef::new("memoizer_core::tests", "test_fun");

// ============================================================================
// ROUND TRIP
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: any encodable call decodes to the same function and arguments
    #[test]
    fn prop_call_round_trip(args in arb_call_args()) {
        let call_id = CallId::from_call(&TEST_FUN, &args)
            .map_err(|e| TestCaseError::fail(format!("encode failed: {}", e)))?;
        let (function, decoded) = call_id.parse()
            .map_err(|e| TestCaseError::fail(format!("decode of {} failed: {}", call_id, e)))?;
        prop_assert_eq!(function, TEST_FUN);
        prop_assert_eq!(&decoded, &args);

        // Re-encoding the decoded call is byte-identical.
        let again = CallId::from_call(&TEST_FUN, &decoded)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(again, call_id);
    }

    /// Property: single literals round-trip through `parse_value`
    #[test]
    fn prop_value_round_trip(value in arb_value()) {
        let text = encode_value(&value)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let decoded = parse_value(&text)
            .map_err(|e| TestCaseError::fail(format!("{}: {}", text, e)))?;
        prop_assert_eq!(decoded, value);
    }

    /// Property: set and dict encodings ignore element order
    #[test]
    fn prop_order_insensitive(items in prop::collection::vec(arb_hashable(), 0..6)) {
        let mut reversed = items.clone();
        reversed.reverse();
        prop_assert_eq!(
            encode_value(&Value::set(items.clone())).ok(),
            encode_value(&Value::set(reversed.clone())).ok()
        );

        let mut seen = HashSet::new();
        let unique: Vec<Value> = items
            .into_iter()
            .filter(|v| encode_value(v).map_or(false, |t| seen.insert(t)))
            .collect();
        let entries: Vec<(Value, Value)> =
            unique.iter().cloned().enumerate().map(|(i, k)| (k, Value::Int(i as i64))).collect();
        let mut shuffled = entries.clone();
        shuffled.rotate_left(entries.len() / 2);
        prop_assert_eq!(
            encode_value(&Value::dict(entries)).ok(),
            encode_value(&Value::dict(shuffled)).ok()
        );
    }

    /// Property: keyword order never shows up in the identity
    #[test]
    fn prop_keyword_order_insensitive(a in arb_value(), b in arb_value()) {
        let forward = CallArgs::new().kwarg("alpha", a.clone()).kwarg("beta", b.clone());
        let backward = CallArgs::new().kwarg("beta", b).kwarg("alpha", a);
        prop_assert_eq!(
            CallId::from_call(&TEST_FUN, &forward).ok(),
            CallId::from_call(&TEST_FUN, &backward).ok()
        );
    }

    /// Property: asofs round-trip and node identities split back apart
    #[test]
    fn prop_asof_round_trip(asof in arb_asof(), args in arb_call_args()) {
        let text = format_asof(&asof);
        prop_assert!(matches!(text.len(), 10 | 19 | 26), "unexpected tier {:?}", text);
        prop_assert_eq!(parse_asof(&text).ok(), Some(asof));

        let call_id = CallId::from_call(&TEST_FUN, &args)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let node_id = NodeId::new(&call_id, asof);
        let (back_call, back_asof) = node_id.split()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(back_call, call_id);
        prop_assert_eq!(back_asof, asof);
    }
}

// ============================================================================
// INJECTIVITY
// ============================================================================

#[test]
fn test_no_collisions_over_byte_range_characters() {
    let chars: Vec<String> = (0u32..256)
        .filter_map(char::from_u32)
        .map(String::from)
        .collect();
    let mut ids = HashSet::new();
    let mut total = 0usize;
    let mut push = |args: CallArgs| {
        let id = CallId::from_call(&TEST_FUN, &args).unwrap();
        let (_, decoded) = id.parse().unwrap();
        assert_eq!(decoded, args, "round trip failed for {}", id);
        ids.insert(id);
        total += 1;
    };

    for c1 in &chars {
        push(CallArgs::new().arg(c1.as_str()));
        for c2 in &chars {
            push(CallArgs::new().arg(format!("{}{}", c1, c2)));
            push(CallArgs::new().arg(c1.as_str()).arg(c2.as_str()));
            push(CallArgs::new().arg(c1.as_str()).arg(c2.as_str()).arg(3.14f64));
            push(CallArgs::new().arg(c1.as_str()).arg(c2.as_str()).arg(Value::None));
            push(
                CallArgs::new()
                    .arg(c1.as_str())
                    .arg(c2.as_str())
                    .kwarg("larargl", "hello world"),
            );
        }
    }
    drop(push);
    assert_eq!(total, 256 + 256 * 256 * 5);
    assert_eq!(ids.len(), total);
}

#[test]
fn test_single_tuple_and_empty_set_stay_distinct() {
    let cases = [
        Value::tuple([Value::Int(1)]),
        Value::Int(1),
        Value::set([]),
        Value::dict([]),
        Value::tuple([]),
        Value::list([]),
    ];
    let encoded: HashSet<String> = cases.iter().map(|v| encode_value(v).unwrap()).collect();
    assert_eq!(encoded.len(), cases.len());
    for value in &cases {
        assert_eq!(&parse_value(&encode_value(value).unwrap()).unwrap(), value);
    }
}
