// crates/formwork-core/src/evaluator.rs
// ============================================================================
// Module: Condition Evaluator
// Description: Dispatch of condition variants to boolean results.
// Purpose: Evaluate conditions without ever propagating a fault.
// Dependencies: formwork-expr, serde_json
// ============================================================================

//! ## Overview
//! [`evaluate_condition`] is total: every fault (expression errors, missing
//! or failing custom functions) becomes `false` plus a diagnostic. Async and
//! remote conditions cannot be resolved synchronously; evaluated here they
//! yield their pending value. The logic factory routes them to the resolver
//! instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use formwork_expr::ExprValue;

use crate::cache_key::fingerprint;
use crate::comparator::apply_operator;
use crate::condition::Condition;
use crate::context::EvaluationContext;
use crate::diagnostics::DiagnosticCode;

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates a condition against a context.
#[must_use]
pub fn evaluate_condition(condition: &Condition, context: &EvaluationContext<'_>) -> bool {
    match condition {
        Condition::Literal {
            value,
        } => *value,
        Condition::FieldValue {
            field_path,
            operator,
            value,
        } => {
            let actual = context.value_at(field_path);
            let patterns = &context.services().patterns;
            apply_operator(*operator, actual.as_ref(), value.as_ref(), patterns)
        }
        Condition::FormValue {
            operator,
            value,
        } => apply_operator(
            *operator,
            Some(context.root_value()),
            value.as_ref(),
            &context.services().patterns,
        ),
        Condition::Expression {
            code,
        } => evaluate_expression_condition(code, context),
        Condition::Custom {
            function_name,
        } => evaluate_custom(function_name, context),
        Condition::And {
            conditions,
        } => conditions.iter().all(|child| evaluate_condition(child, context)),
        Condition::Or {
            conditions,
        } => conditions.iter().any(|child| evaluate_condition(child, context)),
        Condition::Remote(remote) => {
            remote.pending_value.unwrap_or(context.services().resolver.default_pending_value)
        }
        Condition::Async(condition) => {
            condition.pending_value.unwrap_or(context.services().resolver.default_pending_value)
        }
    }
}

/// Evaluates expression text as a boolean.
///
/// Non-boolean results are coerced by truthiness and reported once per site.
#[must_use]
pub fn evaluate_expression_condition(code: &str, context: &EvaluationContext<'_>) -> bool {
    let diagnostics = &context.services().diagnostics;
    match context.evaluate(code) {
        Ok(value) => coerce_boolean(&value, code, context),
        Err(err) => {
            diagnostics.error(
                DiagnosticCode::ExpressionFailed,
                &context.path(),
                format!("expression `{code}` failed: {err}"),
            );
            false
        }
    }
}

/// Coerces a value to a boolean, reporting non-boolean results once per site.
#[must_use]
pub fn coerce_boolean(value: &ExprValue, code: &str, context: &EvaluationContext<'_>) -> bool {
    if let ExprValue::Bool(flag) = value {
        return *flag;
    }
    context.services().diagnostics.warn_once(
        DiagnosticCode::NonBooleanResult,
        &fingerprint(code),
        format!(
            "expression `{code}` returned a {}; return an explicit boolean",
            value.type_name()
        ),
    );
    value.truthy()
}

/// Calls a registered predicate with no arguments.
fn evaluate_custom(function_name: &str, context: &EvaluationContext<'_>) -> bool {
    let diagnostics = &context.services().diagnostics;
    let Some(function) = context.services().functions.custom_function(function_name) else {
        diagnostics.error(
            DiagnosticCode::CustomFunctionMissing,
            &context.path(),
            format!("custom function `{function_name}` is not registered"),
        );
        return false;
    };
    match function(context, &[]) {
        Ok(value) => value.truthy(),
        Err(err) => {
            diagnostics.error(
                DiagnosticCode::CustomFunctionFailed,
                &context.path(),
                format!("custom function `{function_name}` failed: {err}"),
            );
            false
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use std::sync::Arc;

    use formwork_expr::ExpressionEngine;
    use serde_json::json;

    use super::evaluate_condition;
    use crate::condition::Condition;
    use crate::condition::Operator;
    use crate::context::EvaluationContext;
    use crate::context::EvaluationServices;
    use crate::diagnostics::DiagnosticCode;
    use crate::diagnostics::Diagnostics;
    use crate::diagnostics::MemoryDiagnosticSink;
    use crate::field::SnapshotField;
    use crate::registry::FunctionError;
    use crate::registry::FunctionRegistry;

    /// Builds services recording diagnostics in memory.
    fn services(registry: FunctionRegistry) -> (EvaluationServices, Arc<MemoryDiagnosticSink>) {
        let sink = Arc::new(MemoryDiagnosticSink::new());
        let services = EvaluationServices::new(
            ExpressionEngine::default(),
            Arc::new(registry),
            Diagnostics::new(sink.clone()),
        );
        (services, sink)
    }

    #[test]
    fn composites_follow_empty_identities() {
        let (services, _) = services(FunctionRegistry::new());
        let field = SnapshotField::new(json!({}), "a");
        let context = EvaluationContext::tracked(&services, &field);
        assert!(evaluate_condition(&Condition::and(vec![]), &context));
        assert!(!evaluate_condition(&Condition::or(vec![]), &context));
    }

    #[test]
    fn composites_short_circuit() {
        let mut registry = FunctionRegistry::new();
        registry
            .register_function("boom", |_, _| Err(FunctionError::new("should not run")))
            .unwrap();
        let (services, sink) = services(registry);
        let field = SnapshotField::new(json!({}), "a");
        let context = EvaluationContext::tracked(&services, &field);
        let or = Condition::or(vec![Condition::literal(true), Condition::custom("boom")]);
        let and = Condition::and(vec![Condition::literal(false), Condition::custom("boom")]);
        assert!(evaluate_condition(&or, &context));
        assert!(!evaluate_condition(&and, &context));
        assert!(sink.records().is_empty());
    }

    #[test]
    fn faults_downgrade_to_false_with_diagnostics() {
        let mut registry = FunctionRegistry::new();
        registry.register_function("boom", |_, _| Err(FunctionError::new("exploded"))).unwrap();
        let (services, sink) = services(registry);
        let field = SnapshotField::new(json!({"a": null}), "a");
        let context = EvaluationContext::tracked(&services, &field);
        assert!(!evaluate_condition(&Condition::expression("fieldValue.trim()"), &context));
        assert!(!evaluate_condition(&Condition::expression("1 +"), &context));
        assert!(!evaluate_condition(&Condition::custom("missing"), &context));
        assert!(!evaluate_condition(&Condition::custom("boom"), &context));
        assert_eq!(
            sink.codes(),
            vec![
                DiagnosticCode::ExpressionFailed,
                DiagnosticCode::ExpressionFailed,
                DiagnosticCode::CustomFunctionMissing,
                DiagnosticCode::CustomFunctionFailed,
            ]
        );
    }

    #[test]
    fn non_boolean_results_are_coerced_and_reported_once() {
        let (services, sink) = services(FunctionRegistry::new());
        let field = SnapshotField::new(json!({"name": "Ada"}), "name");
        let context = EvaluationContext::tracked(&services, &field);
        let condition = Condition::expression("fieldValue");
        assert!(evaluate_condition(&condition, &context));
        assert!(evaluate_condition(&condition, &context));
        assert_eq!(sink.codes(), vec![DiagnosticCode::NonBooleanResult]);
    }

    #[test]
    fn field_value_comparison_reads_other_paths() {
        let (services, _) = services(FunctionRegistry::new());
        let condition = Condition::field("accountType", Operator::NotEquals, json!("business"));
        let business = SnapshotField::new(json!({"accountType": "business"}), "vat");
        let personal = SnapshotField::new(json!({"accountType": "personal"}), "vat");
        assert!(!evaluate_condition(&condition, &EvaluationContext::tracked(&services, &business)));
        assert!(evaluate_condition(&condition, &EvaluationContext::tracked(&services, &personal)));
    }
}
