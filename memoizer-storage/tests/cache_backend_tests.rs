//! Cache backend behaviour shared by every implementation, plus the
//! byte-bound and persistence guarantees of the concrete backends.

use std::collections::BTreeSet;

use memoizer_core::{CallArgs, CallId, FunctionRef, Metadata, NodeId};
use memoizer_storage::{entry_size, Cache, FileCache, InMemoryCache, NoOpCache};
use memoizer_test_utils::asof;
use memoizer_test_utils::generators::arb_value;
use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;

const F: FunctionRef = FunctionRef::new("storage_tests", "f");

fn metadata_for(n: i64, day: u32) -> Metadata {
    let at = asof(2024, 5, day);
    let args = CallArgs::new().arg(n);
    let call_id = CallId::from_call(&F, &args).unwrap();
    Metadata {
        node_id: NodeId::new(&call_id, at),
        call_id,
        asof: at,
        module: F.module().to_string(),
        function: F.name().to_string(),
        args: args.positional().to_vec(),
        kwargs: args.keywords().clone(),
        children: Vec::new(),
        start_time: at,
        end_time: at,
        cpu_time_sec: 0.0,
        source: String::new(),
        return_type: "serde_json::value::Value".to_string(),
    }
}

fn exercise_backend(cache: &dyn Cache) {
    let meta = metadata_for(1, 1);
    let node_id = meta.node_id.clone();
    assert!(!cache.contains(&node_id).unwrap());
    assert!(cache.read_result(&node_id).unwrap_err().is_not_found());

    cache.write(&node_id, &json!({"rows": [1, 2]}), &meta).unwrap();
    assert!(cache.contains(&node_id).unwrap());
    assert_eq!(cache.read_result(&node_id).unwrap(), json!({"rows": [1, 2]}));
    assert_eq!(cache.read_metadata(&node_id).unwrap(), meta);
    assert_eq!(
        cache.list_node_ids().unwrap(),
        BTreeSet::from([node_id.clone()])
    );

    cache.remove(&node_id).unwrap();
    assert!(!cache.contains(&node_id).unwrap());
}

#[test]
fn test_backends_share_contract() {
    exercise_backend(&InMemoryCache::unbounded());

    let dir = TempDir::new().unwrap();
    exercise_backend(&FileCache::new(dir.path(), 0));
    exercise_backend(&FileCache::new(dir.path().join("fronted"), 1 << 20));
}

#[test]
fn test_noop_stores_nothing() {
    let cache = NoOpCache::new();
    let meta = metadata_for(1, 1);
    cache.write(&meta.node_id, &json!(1), &meta).unwrap();
    assert!(!cache.contains(&meta.node_id).unwrap());
    assert!(cache.list_node_ids().unwrap().is_empty());
}

#[test]
fn test_file_cache_persists_across_instances() {
    let dir = TempDir::new().unwrap();
    let metas: Vec<Metadata> = (0..5).map(|n| metadata_for(n, 1 + n as u32)).collect();
    {
        let cache = FileCache::new(dir.path(), 1 << 20);
        for meta in &metas {
            cache.write(&meta.node_id, &json!(meta.args.len()), meta).unwrap();
        }
    }

    let reopened = FileCache::new(dir.path(), 1 << 20);
    assert!(reopened.front().is_empty());
    for meta in &metas {
        assert!(reopened.contains(&meta.node_id).unwrap());
        assert_eq!(reopened.read_metadata(&meta.node_id).unwrap(), *meta);
    }
    let listed = reopened.list_node_ids().unwrap();
    let expected: BTreeSet<NodeId> = metas.iter().map(|m| m.node_id.clone()).collect();
    assert_eq!(listed, expected);
}

#[test]
fn test_file_cache_latest_by_call_id() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path(), 0);
    for day in [3, 9, 1] {
        let meta = metadata_for(7, day);
        cache.write(&meta.node_id, &json!(day), &meta).unwrap();
    }
    let call_id = CallId::from_call(&F, &CallArgs::new().arg(7i64)).unwrap();
    assert_eq!(cache.list_node_ids_by_call_id(&call_id).unwrap().len(), 3);
    assert_eq!(
        cache.get_latest_node_id_by_call_id(&call_id).unwrap(),
        Some(NodeId::new(&call_id, asof(2024, 5, 9)))
    );

    let unknown = CallId::from_call(&F, &CallArgs::new().arg(8i64)).unwrap();
    assert_eq!(cache.get_latest_node_id_by_call_id(&unknown).unwrap(), None);
}

#[test]
fn test_front_layer_eviction_keeps_disk_copy() {
    let dir = TempDir::new().unwrap();
    let first = metadata_for(1, 1);
    let one = entry_size(&json!(0), &first).unwrap();
    let cache = FileCache::new(dir.path(), one + one / 2);

    let second = metadata_for(2, 1);
    cache.write(&first.node_id, &json!(0), &first).unwrap();
    cache.write(&second.node_id, &json!(0), &second).unwrap();

    assert!(!cache.front().contains(&first.node_id).unwrap());
    assert!(cache.front().contains(&second.node_id).unwrap());
    assert_eq!(cache.read_result(&first.node_id).unwrap(), json!(0));
    assert_eq!(cache.stats().evictions, 1);
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Write(i64, serde_json::Value),
    Read(i64),
    Remove(i64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0i64..12, arb_value()).prop_map(|(n, v)| {
            Op::Write(n, serde_json::to_value(&v).unwrap_or(serde_json::Value::Null))
        }),
        (0i64..12).prop_map(Op::Read),
        (0i64..12).prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: the byte bound holds after every operation, and oversized
    /// entries are never stored
    #[test]
    fn prop_lru_respects_capacity(
        capacity in 200u64..4_000,
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let cache = InMemoryCache::new(Some(capacity));
        for op in ops {
            match op {
                Op::Write(n, value) => {
                    let meta = metadata_for(n, 1);
                    let size = entry_size(&value, &meta).unwrap();
                    cache.write(&meta.node_id, &value, &meta).unwrap();
                    prop_assert_eq!(cache.contains(&meta.node_id).unwrap(), size < capacity);
                }
                Op::Read(n) => {
                    let _ = cache.read_result(&metadata_for(n, 1).node_id);
                }
                Op::Remove(n) => {
                    let node_id = metadata_for(n, 1).node_id;
                    if cache.contains(&node_id).unwrap() {
                        cache.remove(&node_id).unwrap();
                    }
                }
            }
            prop_assert!(cache.size_bytes() <= capacity);
            prop_assert_eq!(cache.stats().memory_bytes, cache.size_bytes());
            prop_assert_eq!(cache.lru_order().unwrap().len(), cache.len());
        }
    }
}
