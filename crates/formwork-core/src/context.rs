// crates/formwork-core/src/context.rs
// ============================================================================
// Module: Evaluation Context
// Description: Per-call view of field state exposed to expressions.
// Purpose: Bind field value, form root, path and functions for evaluation.
// Dependencies: formwork-expr, serde_json
// ============================================================================

//! ## Overview
//! An [`EvaluationContext`] is built for one evaluation call and dropped
//! afterwards. It reads from a [`FieldState`] with a fixed [`ReadMode`]:
//! logic functions use tracked contexts, validators use untracked ones.
//! Values are read lazily and at most once per context, so an expression that
//! never mentions `formValue` never reads the form root.
//!
//! The context implements the expression [`Scope`]:
//! - identifiers `fieldValue`, `formValue`, `rootValue`, `path`;
//! - extra bindings such as `response` for remote conditions;
//! - `valueOf(path)` and registered custom functions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use formwork_expr::ExprValue;
use formwork_expr::ExpressionEngine;
use formwork_expr::ExpressionResult;
use formwork_expr::Scope;
use serde_json::Value;

use crate::diagnostics::Diagnostics;
use crate::field::FieldState;
use crate::field::ReadMode;
use crate::pattern::PatternCache;
use crate::registry::FunctionRegistry;
use crate::resolver::ResolverSettings;

// ============================================================================
// SECTION: Services
// ============================================================================

/// Shared collaborators used by every evaluation of one form instance.
#[derive(Debug)]
pub struct EvaluationServices {
    /// Expression engine with its AST memo.
    pub engine: ExpressionEngine,
    /// Registered functions.
    pub functions: Arc<FunctionRegistry>,
    /// Diagnostics hub.
    pub diagnostics: Diagnostics,
    /// Async and remote defaults.
    pub resolver: ResolverSettings,
    /// Compiled regular expressions.
    pub patterns: PatternCache,
}

impl EvaluationServices {
    /// Bundles the collaborators.
    #[must_use]
    pub fn new(
        engine: ExpressionEngine,
        functions: Arc<FunctionRegistry>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            engine,
            functions,
            diagnostics,
            resolver: ResolverSettings::DEFAULT,
            patterns: PatternCache::default(),
        }
    }

    /// Replaces the async and remote defaults.
    #[must_use]
    pub fn with_resolver_settings(mut self, resolver: ResolverSettings) -> Self {
        self.resolver = resolver;
        self
    }
}

impl Default for EvaluationServices {
    fn default() -> Self {
        Self::new(
            ExpressionEngine::default(),
            Arc::new(FunctionRegistry::new()),
            Diagnostics::noop(),
        )
    }
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Evaluation view of one field occurrence.
///
/// # Invariants
/// - Every read goes through `state` with the context's `mode`.
/// - The field value and form root are read at most once per context.
pub struct EvaluationContext<'a> {
    /// Shared collaborators.
    services: &'a EvaluationServices,
    /// Field accessor.
    state: &'a dyn FieldState,
    /// Read mode applied to every read.
    mode: ReadMode,
    /// Lazily read field value.
    current: OnceCell<Option<Value>>,
    /// Lazily read form root.
    root: OnceCell<Value>,
    /// Extra identifier bindings.
    bindings: BTreeMap<String, ExprValue>,
}

impl<'a> EvaluationContext<'a> {
    /// Creates a context with an explicit read mode.
    #[must_use]
    pub fn new(
        services: &'a EvaluationServices,
        state: &'a dyn FieldState,
        mode: ReadMode,
    ) -> Self {
        Self {
            services,
            state,
            mode,
            current: OnceCell::new(),
            root: OnceCell::new(),
            bindings: BTreeMap::new(),
        }
    }

    /// Creates a context whose reads register dependencies.
    #[must_use]
    pub fn tracked(services: &'a EvaluationServices, state: &'a dyn FieldState) -> Self {
        Self::new(services, state, ReadMode::Tracked)
    }

    /// Creates a context whose reads are snapshots.
    #[must_use]
    pub fn untracked(services: &'a EvaluationServices, state: &'a dyn FieldState) -> Self {
        Self::new(services, state, ReadMode::Untracked)
    }

    /// Adds an identifier binding.
    #[must_use]
    pub fn with_binding(mut self, name: impl Into<String>, value: ExprValue) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    /// Returns the read mode.
    #[must_use]
    pub const fn mode(&self) -> ReadMode {
        self.mode
    }

    /// Returns the shared collaborators.
    #[must_use]
    pub const fn services(&self) -> &'a EvaluationServices {
        self.services
    }

    /// Returns the field accessor.
    #[must_use]
    pub fn state(&self) -> &'a dyn FieldState {
        self.state
    }

    /// Returns the field's own value.
    #[must_use]
    pub fn current_value(&self) -> Option<&Value> {
        self.current.get_or_init(|| self.state.current_value(self.mode)).as_ref()
    }

    /// Returns the whole form value.
    #[must_use]
    pub fn root_value(&self) -> &Value {
        self.root.get_or_init(|| self.state.root_value(self.mode))
    }

    /// Returns the value at another form path.
    #[must_use]
    pub fn value_at(&self, path: &str) -> Option<Value> {
        self.state.value_at(path, self.mode)
    }

    /// Returns the field path.
    #[must_use]
    pub fn path(&self) -> String {
        self.state.path()
    }

    /// Evaluates an expression against this context.
    ///
    /// # Errors
    ///
    /// Returns the expression's syntax or runtime error.
    pub fn evaluate(&self, code: &str) -> ExpressionResult<ExprValue> {
        self.services.engine.evaluate(code, self)
    }

    /// Calls a registered custom function, mapping errors to messages.
    fn call_registered(&self, name: &str, args: &[ExprValue]) -> Option<Result<ExprValue, String>> {
        let function = self.services.functions.custom_function(name)?;
        Some(function(self, args).map_err(|err| err.to_string()))
    }
}

impl Scope for EvaluationContext<'_> {
    fn lookup(&self, name: &str) -> Option<ExprValue> {
        match name {
            "fieldValue" => Some(ExprValue::from_json_opt(self.current_value())),
            "formValue" | "rootValue" => Some(ExprValue::from_json(self.root_value())),
            "path" => Some(ExprValue::String(self.path())),
            _ => self.bindings.get(name).cloned(),
        }
    }

    fn call(&self, name: &str, args: &[ExprValue]) -> Option<Result<ExprValue, String>> {
        if name == "valueOf" {
            let path = args.first().map(ExprValue::to_display_string).unwrap_or_default();
            return Some(Ok(ExprValue::from_json_opt(self.value_at(&path).as_ref())));
        }
        self.call_registered(name, args)
    }

    fn call_custom(&self, name: &str, args: &[ExprValue]) -> Option<Result<ExprValue, String>> {
        self.call_registered(name, args)
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
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use formwork_expr::ExprValue;
    use serde_json::Value;
    use serde_json::json;

    use super::EvaluationContext;
    use super::EvaluationServices;
    use crate::field::FieldState;
    use crate::field::ReadMode;
    use crate::field::SnapshotField;
    use crate::registry::FunctionRegistry;

    /// Field accessor counting root reads.
    struct CountingField {
        /// Wrapped snapshot.
        inner: SnapshotField,
        /// Number of root reads.
        root_reads: AtomicUsize,
    }

    impl FieldState for CountingField {
        fn current_value(&self, mode: ReadMode) -> Option<Value> {
            self.inner.current_value(mode)
        }

        fn root_value(&self, mode: ReadMode) -> Value {
            self.root_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.root_value(mode)
        }

        fn value_at(&self, path: &str, mode: ReadMode) -> Option<Value> {
            self.inner.value_at(path, mode)
        }

        fn path(&self) -> String {
            self.inner.path()
        }
    }

    #[test]
    fn binds_field_form_and_value_of() {
        let services = EvaluationServices::default();
        let field = SnapshotField::new(json!({"qty": 3, "price": 4, "note": "x"}), "note");
        let context = EvaluationContext::tracked(&services, &field);
        assert_eq!(
            context.evaluate("(formValue.qty||0)*(formValue.price||0)").unwrap(),
            ExprValue::Number(12.0)
        );
        assert_eq!(context.evaluate("fieldValue + path").unwrap(), ExprValue::from("xnote"));
        assert_eq!(context.evaluate("valueOf('qty')").unwrap(), ExprValue::Number(3.0));
        assert_eq!(context.evaluate("valueOf('missing')").unwrap(), ExprValue::Undefined);
    }

    #[test]
    fn root_is_read_once_per_context() {
        let services = EvaluationServices::default();
        let field = CountingField {
            inner: SnapshotField::new(json!({"a": 1, "b": 2}), "a"),
            root_reads: AtomicUsize::new(0),
        };
        let context = EvaluationContext::untracked(&services, &field);
        assert_eq!(context.evaluate("formValue.a + rootValue.b").unwrap(), ExprValue::Number(3.0));
        assert_eq!(field.root_reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn custom_functions_are_callable_both_ways() {
        let mut registry = FunctionRegistry::new();
        registry
            .register_function("double", |_context, args| {
                Ok(ExprValue::Number(args.first().map_or(0.0, ExprValue::to_number) * 2.0))
            })
            .unwrap();
        let services = EvaluationServices {
            functions: Arc::new(registry),
            ..EvaluationServices::default()
        };
        let field = SnapshotField::new(json!({"n": 4}), "n");
        let context = EvaluationContext::tracked(&services, &field)
            .with_binding("response", ExprValue::from(json!({"ok": true})));
        assert_eq!(context.evaluate("double(fieldValue)").unwrap(), ExprValue::Number(8.0));
        assert_eq!(
            context.evaluate("customFunctions.double(2)").unwrap(),
            ExprValue::Number(4.0)
        );
        assert_eq!(context.evaluate("response.ok").unwrap(), ExprValue::Bool(true));
    }
}
