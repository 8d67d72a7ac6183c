// crates/formwork-core/tests/proptest_keys.rs
// ============================================================================
// Module: Cache Key Property-Based Tests
// Description: Property tests for canonical keys of condition values.
// Purpose: Detect member-order sensitivity in keys and compiled identity.
// ============================================================================

//! Property-based tests for cache-key invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;

use formwork_core::Condition;
use formwork_core::FormRuntime;
use formwork_core::Operator;
use formwork_core::cache_key;
use formwork_core::cache_key::value_key;
use proptest::prelude::*;
use serde_json::Map;
use serde_json::Value;

/// Scalar JSON values.
fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64 .. 1000).prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ]
}

/// Object members keyed by short names.
fn members() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map("[a-z]{1,4}", leaf(), 0 .. 8)
}

/// Builds an object inserting members in the given order.
fn object<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>) -> Value {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert(key.clone(), value.clone());
    }
    Value::Object(map)
}

proptest! {
    #[test]
    fn keys_ignore_member_order(entries in members()) {
        let forward = object(entries.iter());
        let reverse = object(entries.iter().rev());
        prop_assert_eq!(cache_key(&forward).unwrap(), cache_key(&reverse).unwrap());
        prop_assert_eq!(value_key(Some(&forward)), value_key(Some(&reverse)));
    }

    #[test]
    fn absent_values_never_collide_with_null(value in leaf()) {
        prop_assert_ne!(value_key(None), value_key(Some(&value)));
    }

    #[test]
    fn permuted_conditions_compile_once(entries in members()) {
        let runtime = FormRuntime::default();
        let first = Condition::field("profile", Operator::Equals, object(entries.iter()));
        let second = Condition::field("profile", Operator::Equals, object(entries.iter().rev()));
        let a = runtime.compile_logic(&first).unwrap();
        let b = runtime.compile_logic(&second).unwrap();
        prop_assert!(Arc::ptr_eq(&a, &b));
        prop_assert_eq!(runtime.stats().logic_functions, 1);
    }
}
