// crates/formwork-core/tests/logic_functions.rs
// ============================================================================
// Test Module: Logic Functions
// Coverage: Determinism, compiled-function identity, shape checks, runtime
//           scoping and debounced logic.
// ============================================================================
//! ## Overview
//! Integration tests for compiling conditions into logic functions.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use formwork_core::Condition;
use formwork_core::ConditionShapeError;
use formwork_core::EvaluationContext;
use formwork_core::FormModel;
use formwork_core::FormRuntime;
use formwork_core::FunctionRegistry;
use formwork_core::Operator;
use formwork_core::SnapshotField;
use formwork_core::evaluate_condition;
use formwork_expr::ExprValue;
use serde_json::json;
use support::TestResult;
use support::ensure;

// ========================================================================
// Fixtures
// ========================================================================

/// The account-type visibility condition used across tests.
fn not_business() -> Condition {
    Condition::field("accountType", Operator::NotEquals, json!("business"))
}

// ========================================================================
// Evaluation
// ========================================================================

#[test]
fn account_type_example_evaluates_both_ways() -> TestResult {
    let runtime = FormRuntime::default();
    let logic = runtime.compile_logic(&not_business())?;
    let business = SnapshotField::new(json!({"accountType": "business"}), "company");
    let personal = SnapshotField::new(json!({"accountType": "personal"}), "company");
    ensure(!logic(&business), "business accounts hide nothing")?;
    ensure(logic(&personal), "personal accounts match notEquals")?;
    Ok(())
}

#[test]
fn evaluation_is_deterministic_without_state_change() -> TestResult {
    let runtime = FormRuntime::default();
    let condition: Condition = serde_json::from_value(json!({
        "type": "or",
        "conditions": [
            {"type": "expression", "code": "fieldValue > 10 && formValue.enabled"},
            {"type": "fieldValue", "fieldPath": "tags", "operator": "contains", "value": "vip"}
        ]
    }))?;
    let field = SnapshotField::new(json!({"amount": 12, "enabled": true, "tags": []}), "amount");
    let context = EvaluationContext::untracked(runtime.services(), &field);
    let first = evaluate_condition(&condition, &context);
    let second = evaluate_condition(&condition, &context);
    ensure(first && first == second, "repeated evaluation returns the same result")?;
    Ok(())
}

#[test]
fn structurally_equal_conditions_share_one_function() -> TestResult {
    let runtime = FormRuntime::default();
    let first: Condition = serde_json::from_value(json!({
        "type": "fieldValue", "fieldPath": "age", "operator": "greaterOrEqual", "value": {"min": 18, "unit": "y"}
    }))?;
    let second: Condition = serde_json::from_value(json!({
        "value": {"unit": "y", "min": 18}, "operator": "greaterOrEqual", "fieldPath": "age", "type": "fieldValue"
    }))?;
    let a = runtime.compile_logic(&first)?;
    let b = runtime.compile_logic(&second)?;
    ensure(Arc::ptr_eq(&a, &b), "member order does not change identity")?;
    let c = runtime.compile_logic(&Condition::field("age", Operator::Greater, json!(18)))?;
    ensure(!Arc::ptr_eq(&a, &c), "different conditions compile separately")?;
    ensure(runtime.stats().logic_functions == 2, "two cache entries")?;
    Ok(())
}

#[test]
fn nested_remote_conditions_are_rejected_at_compile_time() -> TestResult {
    let runtime = FormRuntime::default();
    let condition: Condition = serde_json::from_value(json!({
        "type": "and",
        "conditions": [
            {"type": "fieldValue", "fieldPath": "country", "operator": "equals", "value": "NO"},
            {"type": "remote", "request": {"url": "https://api.example.test/check"}}
        ]
    }))?;
    let Err(err) = runtime.compile_logic(&condition) else {
        panic!("nested remote condition compiled");
    };
    match err {
        ConditionShapeError::NestedAsync {
            kind,
            parent,
            location,
        } => {
            ensure(kind == "remote" && parent == "and", "names the offending kinds")?;
            ensure(location == "and[1]", "names the location")?;
        }
        ConditionShapeError::Key(_) => panic!("unexpected key error"),
    }
    ensure(runtime.stats().logic_functions == 0, "nothing was cached")?;
    Ok(())
}

#[test]
fn custom_functions_are_callable_from_conditions_and_expressions() -> TestResult {
    let mut registry = FunctionRegistry::new();
    registry.register_function("isAdult", |context, args| {
        let age = args.first().map_or_else(
            || context.current_value().and_then(serde_json::Value::as_f64).unwrap_or(0.0),
            ExprValue::to_number,
        );
        Ok(ExprValue::Bool(age >= 18.0))
    })?;
    let runtime = FormRuntime::new(registry);
    let field = SnapshotField::new(json!({"age": 20, "guardian": {"age": 12}}), "age");
    let by_name = runtime.compile_logic(&Condition::custom("isAdult"))?;
    let by_call = runtime.compile_logic(&Condition::expression("!isAdult(formValue.guardian.age)"))?;
    ensure(by_name(&field), "custom condition reads the field value")?;
    ensure(by_call(&field), "expressions call registered functions with arguments")?;
    Ok(())
}

// ========================================================================
// Scoping
// ========================================================================

#[test]
fn runtimes_never_share_caches() -> TestResult {
    let first = FormRuntime::default();
    let second = FormRuntime::default();
    let a = first.compile_logic(&not_business())?;
    let b = second.compile_logic(&not_business())?;
    ensure(!Arc::ptr_eq(&a, &b), "each runtime compiles its own function")?;
    ensure(first.stats().logic_functions == 1, "first runtime holds one entry")?;
    ensure(second.stats().logic_functions == 1, "second runtime holds one entry")?;
    ensure(!first.same_instance(&second), "distinct instances")?;
    ensure(first.same_instance(&first.clone()), "clones share caches")?;
    Ok(())
}

#[test]
fn compiled_functions_outlive_their_runtime_safely() -> TestResult {
    let runtime = FormRuntime::default();
    let logic = runtime.compile_logic(&not_business())?;
    drop(runtime);
    let personal = SnapshotField::new(json!({"accountType": "personal"}), "company");
    ensure(!logic(&personal), "dropped runtimes fall back to false")?;
    Ok(())
}

// ========================================================================
// Debounce
// ========================================================================

#[tokio::test(start_paused = true)]
async fn debounced_logic_settles_after_quiet_window() -> TestResult {
    let runtime = FormRuntime::default();
    let updates = runtime.resolution_updates();
    let logic = runtime.compile_debounced_logic(&Condition::expression("fieldValue.length > 3"), 200)?;
    let model = FormModel::new(json!({"name": "ab"}));
    let field = model.field("name");

    ensure(!logic(&field), "starts false")?;
    model.set("name", json!("abcd"));
    ensure(!logic(&field), "not yet settled")?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    ensure(!logic(&field), "still inside the window")?;
    tokio::time::sleep(Duration::from_millis(250)).await;
    ensure(logic(&field), "settles after the window")?;
    ensure(updates.has_changed()?, "publication was announced")?;
    ensure(runtime.stats().debounced_slots == 1, "one slot per occurrence")?;
    Ok(())
}

#[test]
fn debounced_logic_without_async_runtime_is_undebounced() -> TestResult {
    let runtime = FormRuntime::default();
    let logic = runtime.compile_debounced_logic(&not_business(), 500)?;
    let personal = SnapshotField::new(json!({"accountType": "personal"}), "company");
    ensure(logic(&personal), "falls back to the immediate value")?;
    Ok(())
}
