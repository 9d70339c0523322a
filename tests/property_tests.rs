//! Property-based tests for value decoding.
//!
//! Arbitrary values are pushed through the whole stack (scripted engine,
//! query, row decode) and must come back equal, including nested
//! containers; their JSON rendering must always parse.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta};
use proptest::prelude::*;
use uuid::Uuid;

use ladybug::engine::mem::{MemoryEngine, ScriptedResult};
use ladybug::{Context, Database, Value};

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int64),
        any::<u64>().prop_map(Value::UInt64),
        // Integral doubles sidestep float-equality noise without losing
        // the extractor path.
        (-1_000_000i64..1_000_000).prop_map(|i| Value::Float64(i as f64)),
        "[ -~]{0,20}".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Blob),
        any::<u128>().prop_map(|bits| Value::Uuid(Uuid::from_u128(bits))),
        (-1_000_000i64..1_000_000).prop_map(|s| Value::Interval(TimeDelta::seconds(s))),
        (-10_000_000_000i64..10_000_000_000).prop_map(|s| {
            Value::Timestamp(DateTime::from_timestamp(s, 0).unwrap())
        }),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::vec(("[a-z]{1,8}", inner.clone()), 0..4).prop_map(Value::Struct),
        ]
    })
}

fn round_trip(value: Value) -> Value {
    let engine = Arc::new(MemoryEngine::new());
    engine.script(
        "Q",
        ScriptedResult::from_values(&["v"], vec![vec![value]]),
    );
    let db = Database::open(engine, "prop.db", None).unwrap();
    let ctx = Context::background();
    let conn = db.connect(&ctx).unwrap();
    let mut result = conn.query(&ctx, "Q").unwrap();
    let row = result.next().unwrap();
    row.value(0).unwrap()
}

proptest! {
    #[test]
    fn prop_values_round_trip_through_the_driver(value in arb_value()) {
        prop_assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn prop_value_json_always_parses(value in arb_value()) {
        let json = serde_json::to_string(&value).unwrap();
        prop_assert!(serde_json::from_str::<serde_json::Value>(&json).is_ok());
    }

    #[test]
    fn prop_null_columns_scan_as_none(padding in any::<i64>()) {
        let engine = Arc::new(MemoryEngine::new());
        engine.script(
            "Q",
            ScriptedResult::from_values(
                &["a", "b"],
                vec![vec![Value::Int64(padding), Value::Null]],
            ),
        );
        let db = Database::open(engine, "prop.db", None).unwrap();
        let ctx = Context::background();
        let conn = db.connect(&ctx).unwrap();
        let mut result = conn.query(&ctx, "Q").unwrap();
        let row = result.next().unwrap();
        let (a, b): (i64, Option<i64>) = row.scan().unwrap();
        prop_assert_eq!(a, padding);
        prop_assert_eq!(b, None);
    }
}
