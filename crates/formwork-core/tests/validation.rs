// crates/formwork-core/tests/validation.rs
// ============================================================================
// Test Module: Validation
// Coverage: Built-in, custom, async and HTTP validators, guards, cross-field
//           hoisting and derived values.
// ============================================================================
//! ## Overview
//! Integration tests for the validator factory and the form engine.

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

use async_trait::async_trait;
use formwork_core::AsyncValidator;
use formwork_core::Derivation;
use formwork_core::DiagnosticCode;
use formwork_core::Diagnostics;
use formwork_core::FormDefinition;
use formwork_core::FormEngine;
use formwork_core::FormModel;
use formwork_core::FormRuntime;
use formwork_core::FunctionError;
use formwork_core::FunctionRegistry;
use formwork_core::MemoryDiagnosticSink;
use formwork_core::SetupError;
use formwork_core::SnapshotField;
use formwork_core::ValidationError;
use formwork_core::ValidatorConfig;
use serde_json::Value;
use serde_json::json;
use support::ScriptedTransport;
use support::TestResult;
use support::ensure;

// ========================================================================
// Fixtures
// ========================================================================

/// Parses a form definition from JSON.
fn form(value: Value) -> TestResult<FormDefinition> {
    Ok(serde_json::from_value(value)?)
}

/// Async validator rejecting reserved usernames.
struct ReservedNames;

#[async_trait]
impl AsyncValidator for ReservedNames {
    async fn call(&self, value: Option<Value>, _params: Value) -> Result<Value, FunctionError> {
        match value.as_ref().and_then(Value::as_str) {
            Some("offline") => Err(FunctionError::new("directory offline")),
            Some(name) => Ok(json!({"reserved": name == "admin"})),
            None => Ok(json!({"reserved": false})),
        }
    }

    fn on_success(&self, result: &Value, _params: &Value) -> Option<ValidationError> {
        (result["reserved"] == json!(true)).then(|| ValidationError::new("reserved"))
    }
}

// ========================================================================
// Cross-Field Hoisting
// ========================================================================

#[test]
fn cross_field_validators_run_only_in_the_tree_pass() -> TestResult {
    let sink = Arc::new(MemoryDiagnosticSink::new());
    let runtime = FormRuntime::builder().diagnostics(Diagnostics::new(sink.clone())).build();
    let definition = form(json!({
        "fields": [
            {"key": "startDate"},
            {"key": "endDate", "validators": [
                {"type": "required"},
                {"type": "custom", "expression": "fieldValue >= valueOf('startDate')", "errorKind": "beforeStart"}
            ]}
        ]
    }))?;
    let engine = FormEngine::build(&definition, runtime)?;
    ensure(engine.hoisted_targets() == vec!["endDate"], "the custom validator is hoisted")?;
    ensure(sink.codes().contains(&DiagnosticCode::CrossFieldHoisted), "hoisting is reported")?;

    let root = json!({"startDate": "2024-05-10", "endDate": "2024-05-01"});
    let field_level = engine.validate_field(&SnapshotField::new(root.clone(), "endDate"));
    ensure(field_level.is_empty(), "field-level path skips the cross-field validator")?;
    let report = engine.validate(&root);
    ensure(report.errors.len() == 1, "tree pass reports one error")?;
    ensure(report.errors[0].kind == "beforeStart", "custom error kind")?;
    Ok(())
}

#[test]
fn schema_gates_reading_other_fields_hoist_their_validators() -> TestResult {
    let definition = form(json!({
        "fields": [
            {"key": "sameAsBilling"},
            {"key": "shipping", "schemas": [{
                "schema": {"validators": [{"type": "required", "path": "city"}]},
                "strategy": "applyWhen",
                "condition": {
                    "type": "fieldValue", "fieldPath": "sameAsBilling",
                    "operator": "equals", "value": false
                }
            }]}
        ]
    }))?;
    let engine = FormEngine::build(&definition, FormRuntime::default())?;
    ensure(engine.hoisted_targets() == vec!["shipping.city"], "gate read hoists the rule")?;

    let separate = json!({"sameAsBilling": false, "shipping": {}});
    let field_level = engine.validate_field(&SnapshotField::new(separate.clone(), "shipping.city"));
    ensure(field_level.is_empty(), "field-level path skips the gated rule")?;
    let report = engine.validate(&separate);
    ensure(report.errors.len() == 1, "tree pass applies the gated rule")?;
    ensure(report.errors[0].field == "shipping.city", "error targets the schema path")?;
    ensure(engine.validate(&json!({"sameAsBilling": true})).is_valid(), "closed gate skips")?;
    Ok(())
}

#[test]
fn declared_references_and_guards_hoist_too() -> TestResult {
    let runtime = FormRuntime::default();
    let declared: ValidatorConfig = serde_json::from_value(json!({
        "type": "required", "fieldReferences": ["country"]
    }))?;
    let guarded: ValidatorConfig = serde_json::from_value(json!({
        "type": "required",
        "when": {"type": "fieldValue", "fieldPath": "country", "operator": "equals", "value": "US"}
    }))?;
    let own: ValidatorConfig = serde_json::from_value(json!({
        "type": "minLength", "value": {"expression": "valueOf('zip.prefix') ? 3 : 5"}
    }))?;
    ensure(runtime.prepare_validator("state", &declared)?.is_cross_field(), "declared list hoists")?;
    ensure(runtime.prepare_validator("state", &guarded)?.is_cross_field(), "guard hoists")?;
    ensure(!runtime.prepare_validator("zip.code", &own)?.is_cross_field(), "same root key stays")?;
    Ok(())
}

// ========================================================================
// Built-ins
// ========================================================================

#[test]
fn built_ins_accept_static_and_dynamic_operands() -> TestResult {
    let definition = form(json!({
        "fields": [
            {"key": "minAge"},
            {"key": "age", "validators": [
                {"type": "min", "value": {"expression": "formValue.minAge"}},
                {"type": "max", "value": 130}
            ]},
            {"key": "code", "validators": [{"type": "pattern", "value": "[A-Z]{3}"}]},
            {"key": "tags", "validators": [{"type": "maxLength", "value": 2}]}
        ]
    }))?;
    let engine = FormEngine::build(&definition, FormRuntime::default())?;
    let report = engine.validate(&json!({
        "minAge": 21, "age": 18, "code": "ABCD", "tags": ["a", "b", "c"]
    }));
    let kinds: Vec<&str> = report.errors.iter().map(|error| error.kind.as_str()).collect();
    ensure(kinds == vec!["pattern", "maxLength", "min"], "hoisted min reports last")?;
    ensure(engine.hoisted_targets() == vec!["age"], "dynamic min reads another field")?;
    ensure(report.errors[2].params == Some(json!({"min": 21.0, "actual": 18.0})), "bound detail")?;
    let valid = engine.validate(&json!({"minAge": 21, "age": 30, "code": "ABC", "tags": []}));
    ensure(valid.is_valid(), "valid values pass")?;
    Ok(())
}

#[test]
fn patterns_match_the_whole_value_whatever_anchors_are_written() -> TestResult {
    let definition = form(json!({
        "fields": [
            {"key": "leading", "validators": [{"type": "pattern", "value": "^[0-9]+"}]},
            {"key": "trailing", "validators": [{"type": "pattern", "value": "[0-9]+$"}]},
            {"key": "either", "validators": [{"type": "pattern", "value": "^yes|no$"}]},
            {"key": "dynamic", "validators": [
                {"type": "pattern", "value": {"expression": "'^[a-z]+'"}}
            ]}
        ]
    }))?;
    let engine = FormEngine::build(&definition, FormRuntime::default())?;
    let report = engine.validate(&json!({
        "leading": "123abc", "trailing": "abc123", "either": "yes please", "dynamic": "abc1"
    }));
    let fields: Vec<&str> = report.errors.iter().map(|error| error.field.as_str()).collect();
    ensure(
        fields == vec!["leading", "trailing", "either", "dynamic"],
        "partial matches are rejected",
    )?;
    let valid = engine.validate(&json!({
        "leading": "123", "trailing": "123", "either": "no", "dynamic": "abc"
    }));
    ensure(valid.is_valid(), "whole-value matches pass")?;
    Ok(())
}

#[test]
fn invalid_static_patterns_fail_setup() -> TestResult {
    let definition = form(json!({
        "fields": [{"key": "code", "validators": [{"type": "pattern", "value": "([A-Z"}]}]
    }))?;
    let result = FormEngine::build(&definition, FormRuntime::default());
    ensure(matches!(result, Err(SetupError::InvalidPattern { .. })), "pattern rejected")?;
    Ok(())
}

#[test]
fn guards_skip_validators() -> TestResult {
    let definition = form(json!({
        "fields": [{"key": "vat", "validators": [{
            "type": "required",
            "when": {"type": "expression", "code": "formValue.kind === 'business'"}
        }]}]
    }))?;
    let engine = FormEngine::build(&definition, FormRuntime::default())?;
    ensure(engine.validate(&json!({"kind": "personal"})).is_valid(), "guard false skips")?;
    ensure(!engine.validate(&json!({"kind": "business"})).is_valid(), "guard true applies")?;
    Ok(())
}

#[test]
fn named_validators_receive_params() -> TestResult {
    let mut registry = FunctionRegistry::new();
    registry.register_validator("divisibleBy", |context, params| {
        let divisor = params["divisor"].as_i64().unwrap_or(1);
        let value = context.current_value().and_then(Value::as_i64)?;
        (value % divisor != 0).then(|| ValidationError::new("divisibleBy"))
    })?;
    let definition = form(json!({
        "fields": [{"key": "qty", "validators": [
            {"type": "custom", "functionName": "divisibleBy", "params": {"divisor": 6}}
        ]}]
    }))?;
    let engine = FormEngine::build(&definition, FormRuntime::new(registry))?;
    let report = engine.validate(&json!({"qty": 8}));
    ensure(report.errors.len() == 1, "8 is not divisible by 6")?;
    ensure(report.errors[0].params == Some(json!({"divisor": 6})), "params are attached")?;
    ensure(engine.validate(&json!({"qty": 12})).is_valid(), "12 passes")?;
    Ok(())
}

// ========================================================================
// Async and HTTP Validators
// ========================================================================

#[tokio::test]
async fn async_validators_decide_success_themselves() -> TestResult {
    let mut registry = FunctionRegistry::new();
    registry.register_async_validator("reserved", Arc::new(ReservedNames))?;
    let definition = form(json!({
        "fields": [{"key": "username", "validators": [{"type": "async", "functionName": "reserved"}]}]
    }))?;
    let engine = FormEngine::build(&definition, FormRuntime::new(registry))?;
    let sync_only = engine.validate(&json!({"username": "admin"}));
    ensure(sync_only.is_valid(), "async validators do not run synchronously")?;
    let report = engine.validate_async(&json!({"username": "admin"})).await;
    ensure(report.errors.len() == 1 && report.errors[0].kind == "reserved", "reserved name")?;
    let offline = engine.validate_async(&json!({"username": "offline"})).await;
    ensure(offline.is_valid(), "lookup failures let the value pass by default")?;
    Ok(())
}

#[tokio::test]
async fn http_validators_judge_responses() -> TestResult {
    let transport = Arc::new(ScriptedTransport::responding(json!({"taken": true})));
    let runtime = FormRuntime::builder().transport(transport.clone()).build();
    let definition = form(json!({
        "fields": [{"key": "email", "validators": [{
            "type": "http",
            "request": {"url": "https://api.example.test/emails", "params": {"address": "fieldValue"}},
            "validWhen": "response.taken === false",
            "errorKind": "emailTaken"
        }]}]
    }))?;
    let engine = FormEngine::build(&definition, runtime)?;
    let report = engine.validate_async(&json!({"email": "a@b.io"})).await;
    ensure(report.errors.len() == 1 && report.errors[0].kind == "emailTaken", "taken")?;
    ensure(report.errors[0].field == "email", "reported against the field")?;
    let requests = transport.requests();
    ensure(requests[0].query.get("address").map(String::as_str) == Some("a@b.io"), "query")?;
    Ok(())
}

#[tokio::test]
async fn http_validator_errors_follow_on_error() -> TestResult {
    let transport = Arc::new(ScriptedTransport::failing());
    let runtime = FormRuntime::builder().transport(transport).build();
    let definition = form(json!({
        "fields": [
            {"key": "a", "validators": [{
                "type": "http", "request": {"url": "https://api.example.test/a"}, "validWhen": "true"
            }]},
            {"key": "b", "validators": [{
                "type": "http", "request": {"url": "https://api.example.test/b"}, "validWhen": "true",
                "onError": "fail", "errorKind": "unverified"
            }]}
        ]
    }))?;
    let engine = FormEngine::build(&definition, runtime)?;
    let report = engine.validate_async(&json!({"a": 1, "b": 2})).await;
    ensure(report.errors.len() == 1, "only the failing-closed validator reports")?;
    ensure(report.errors[0].field == "b" && report.errors[0].kind == "unverified", "b fails")?;
    Ok(())
}

// ========================================================================
// Derived Values
// ========================================================================

#[test]
fn totals_follow_quantity_and_price() -> TestResult {
    let runtime = FormRuntime::default();
    let total = runtime.compile_derivation(&Derivation::Expression {
        code: "(formValue.qty||0)*(formValue.price||0)".to_string(),
    })?;
    let model = FormModel::new(json!({"qty": 3, "price": 4}));
    let handle = model.field("total");
    let derived = model.derive(move || total(&handle));
    ensure(derived.get() == Some(json!(12)), "3 * 4")?;
    model.set("qty", json!(5));
    ensure(derived.get() == Some(json!(20)), "recomputed after a change")?;
    ensure(derived.recomputations() == 2, "recomputed once per change")?;
    Ok(())
}
