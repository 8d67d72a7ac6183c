// crates/formwork-core/src/derivation.rs
// ============================================================================
// Module: Derived Values
// Description: Compilation of derived-value descriptions into functions.
// Purpose: Compute field values from other form values.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Derivation`] computes a field's value from the form, either with an
//! expression or with a registered derivation function. Compiled
//! derivations are cached per runtime like logic functions and read their
//! inputs through tracked contexts. Faults yield `None` plus a diagnostic.

use std::sync::Arc;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::cache_key::CacheKeyError;
use crate::cache_key::cache_key;
use crate::context::EvaluationContext;
use crate::diagnostics::DiagnosticCode;
use crate::field::FieldState;
use crate::runtime::FormRuntime;

/// Compiled derivation function; `None` means "no value".
pub type DerivationFn = Arc<dyn Fn(&dyn FieldState) -> Option<Value> + Send + Sync>;

/// Derived-value description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Derivation {
    /// Value of an expression.
    Expression {
        /// Expression text.
        #[serde(alias = "expression")]
        code: String,
    },
    /// Value returned by a registered derivation function.
    Function {
        /// Registered function name.
        function_name: String,
    },
}

impl FormRuntime {
    /// Compiles a derivation into a cached function.
    ///
    /// # Errors
    ///
    /// Returns [`CacheKeyError`] when the description cannot be keyed.
    pub fn compile_derivation(
        &self,
        derivation: &Derivation,
    ) -> Result<DerivationFn, CacheKeyError> {
        let key = cache_key(derivation)?;
        let mut cache = self.inner.derivations.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = cache.get(&key) {
            return Ok(Arc::clone(existing));
        }
        let weak = Arc::downgrade(&self.inner);
        let derivation = derivation.clone();
        let function: DerivationFn = Arc::new(move |state: &dyn FieldState| {
            let inner = weak.upgrade()?;
            let context = EvaluationContext::tracked(&inner.services, state);
            derive(&derivation, &context)
        });
        cache.insert(key, Arc::clone(&function));
        drop(cache);
        Ok(function)
    }
}

/// Computes a derived value, downgrading faults to `None`.
fn derive(derivation: &Derivation, context: &EvaluationContext<'_>) -> Option<Value> {
    let diagnostics = &context.services().diagnostics;
    match derivation {
        Derivation::Expression {
            code,
        } => match context.evaluate(code) {
            Ok(value) => value.to_json(),
            Err(err) => {
                diagnostics.error(
                    DiagnosticCode::ExpressionFailed,
                    &context.path(),
                    format!("derivation `{code}` failed: {err}"),
                );
                None
            }
        },
        Derivation::Function {
            function_name,
        } => {
            let Some(function) = context.services().functions.derivation(function_name) else {
                diagnostics.error(
                    DiagnosticCode::CustomFunctionMissing,
                    &context.path(),
                    format!("derivation function `{function_name}` is not registered"),
                );
                return None;
            };
            match function(context) {
                Ok(value) => Some(value),
                Err(err) => {
                    diagnostics.error(
                        DiagnosticCode::CustomFunctionFailed,
                        &context.path(),
                        format!("derivation function `{function_name}` failed: {err}"),
                    );
                    None
                }
            }
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

    use serde_json::json;

    use super::Derivation;
    use crate::field::SnapshotField;
    use crate::registry::FunctionRegistry;
    use crate::runtime::FormRuntime;

    #[test]
    fn expression_derivation_computes_totals() {
        let runtime = FormRuntime::default();
        let total = runtime
            .compile_derivation(&Derivation::Expression {
                code: "(formValue.qty||0)*(formValue.price||0)".to_string(),
            })
            .unwrap();
        let field = SnapshotField::new(json!({"qty": 3, "price": 4}), "total");
        assert_eq!(total(&field), Some(json!(12)));
        let empty = SnapshotField::new(json!({}), "total");
        assert_eq!(total(&empty), Some(json!(0)));
    }

    #[test]
    fn function_derivations_are_cached() {
        let mut registry = FunctionRegistry::new();
        registry.register_derivation("upper", |context| {
            Ok(json!(context.current_value().and_then(|v| v.as_str()).unwrap_or("").to_uppercase()))
        })
        .unwrap();
        let runtime = FormRuntime::new(registry);
        let derivation = Derivation::Function {
            function_name: "upper".to_string(),
        };
        let first = runtime.compile_derivation(&derivation).unwrap();
        let second = runtime.compile_derivation(&derivation.clone()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first(&SnapshotField::new(json!({"a": "x"}), "a")), Some(json!("X")));
    }
}
