//! Evaluation metadata stored next to every cached result

use crate::identity::{CallId, NodeId};
use crate::timestamp::Asof;
use crate::value::Value;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Record of one evaluation: what was called, when, how long it took and
/// which memoized calls it made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub node_id: NodeId,
    pub call_id: CallId,
    pub asof: Asof,
    pub module: String,
    pub function: String,
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
    /// Child node identities in the order they were first invoked.
    pub children: Vec<NodeId>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Wall time minus the wall time of recorded children, in seconds.
    pub cpu_time_sec: f64,
    pub source: String,
    pub return_type: String,
}

impl Metadata {
    /// `end_time - start_time` in seconds.
    pub fn wall_time_sec(&self) -> f64 {
        let delta = self.end_time - self.start_time;
        delta
            .num_microseconds()
            .map(|us| us as f64 / 1_000_000.0)
            .unwrap_or_else(|| delta.num_milliseconds() as f64 / 1_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FunctionRef;
    use crate::value::CallArgs;
    use chrono::{Duration, NaiveDate};

    fn sample() -> Metadata {
        let function = FunctionRef::new("demo", "f");
        let args = CallArgs::new().arg(1i64).kwarg("k", "v");
        let asof = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let call_id = CallId::from_call(&function, &args).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_micro_opt(10, 0, 0, 0)
            .unwrap();
        Metadata {
            node_id: NodeId::new(&call_id, asof),
            call_id,
            asof,
            module: "demo".to_string(),
            function: "f".to_string(),
            args: args.positional().to_vec(),
            kwargs: args.keywords().clone(),
            children: vec![NodeId::from_raw("demo.g()@2024-01-01")],
            start_time: start,
            end_time: start + Duration::milliseconds(1500),
            cpu_time_sec: 0.5,
            source: "fn f(x: i64) -> i64 { x }".to_string(),
            return_type: "i64".to_string(),
        }
    }

    #[test]
    fn test_wall_time() {
        let metadata = sample();
        assert!((metadata.wall_time_sec() - 1.5).abs() < 1e-9);
        assert!(metadata.cpu_time_sec <= metadata.wall_time_sec());
    }

    #[test]
    fn test_metadata_json_round_trip() {
        let metadata = sample();
        let json = serde_json::to_string(&metadata).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }
}
