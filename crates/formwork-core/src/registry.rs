// crates/formwork-core/src/registry.rs
// ============================================================================
// Module: Function Registry
// Description: Named functions referenced by conditions and validators.
// Purpose: Resolve custom, async, validator and derivation functions by name.
// Dependencies: async-trait, formwork-expr, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Form descriptions refer to host code only by name. The registry maps those
//! names to implementations and is frozen (behind an `Arc`) once a form
//! instance is built. Names are unique per function family.
//!
//! Families:
//! - custom functions: synchronous predicates, also callable from expressions;
//! - async condition functions: back `async` conditions;
//! - validators and async validators: back `custom` and `async` validators;
//! - derivation functions: back function-based derived values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use formwork_expr::ExprValue;
use serde_json::Value;
use thiserror::Error;

use crate::context::EvaluationContext;
use crate::validator::ValidationError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Error returned by registered functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FunctionError(pub String);

impl FunctionError {
    /// Creates an error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A named function was not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {family} function: {name}")]
pub struct UnknownFunctionError {
    /// Function family.
    pub family: &'static str,
    /// Requested name.
    pub name: String,
}

/// Registration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The name is already taken within its family.
    #[error("{family} function already registered: {name}")]
    Duplicate {
        /// Function family.
        family: &'static str,
        /// Duplicate name.
        name: String,
    },
}

// ============================================================================
// SECTION: Function Types
// ============================================================================

/// Synchronous custom function.
pub type CustomFunction = Arc<
    dyn Fn(&EvaluationContext<'_>, &[ExprValue]) -> Result<ExprValue, FunctionError> + Send + Sync,
>;

/// Synchronous validator receiving an untracked context and parameters.
pub type ValidatorFunction =
    Arc<dyn Fn(&EvaluationContext<'_>, &Value) -> Option<ValidationError> + Send + Sync>;

/// Function computing a derived value.
pub type DerivationFunction =
    Arc<dyn Fn(&EvaluationContext<'_>) -> Result<Value, FunctionError> + Send + Sync>;

/// Function backing an `async` condition.
#[async_trait]
pub trait AsyncConditionFunction: Send + Sync {
    /// Resolves the condition for a field value and resolved parameters.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError`] when resolution fails.
    async fn resolve(&self, value: Option<Value>, params: Value) -> Result<Value, FunctionError>;
}

/// Adapter turning an async closure into an [`AsyncConditionFunction`].
pub struct AsyncFn<F> {
    /// Wrapped closure.
    function: F,
}

impl<F> AsyncFn<F> {
    /// Wraps a closure.
    pub const fn new(function: F) -> Self {
        Self {
            function,
        }
    }
}

#[async_trait]
impl<F, Fut> AsyncConditionFunction for AsyncFn<F>
where
    F: Fn(Option<Value>, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, FunctionError>> + Send + 'static,
{
    async fn resolve(&self, value: Option<Value>, params: Value) -> Result<Value, FunctionError> {
        (self.function)(value, params).await
    }
}

/// Asynchronous validator with inverted success handling.
///
/// A successful call does not mean the value is valid: `on_success` decides.
/// Failures are routed to `on_error`, which by default lets the value pass.
#[async_trait]
pub trait AsyncValidator: Send + Sync {
    /// Performs the lookup.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError`] when the lookup fails.
    async fn call(&self, value: Option<Value>, params: Value) -> Result<Value, FunctionError>;

    /// Maps a successful lookup to a validation outcome.
    fn on_success(&self, result: &Value, params: &Value) -> Option<ValidationError>;

    /// Maps a failed lookup to a validation outcome.
    fn on_error(&self, error: &FunctionError) -> Option<ValidationError> {
        let _ = error;
        None
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Named function registry.
///
/// # Invariants
/// - Names are unique within each family.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    /// Custom functions.
    custom: BTreeMap<String, CustomFunction>,
    /// Async condition functions.
    async_conditions: BTreeMap<String, Arc<dyn AsyncConditionFunction>>,
    /// Synchronous validators.
    validators: BTreeMap<String, ValidatorFunction>,
    /// Async validators.
    async_validators: BTreeMap<String, Arc<dyn AsyncValidator>>,
    /// Derivation functions.
    derivations: BTreeMap<String, DerivationFunction>,
}

/// Inserts into a family map, rejecting duplicates.
fn insert_unique<T>(
    map: &mut BTreeMap<String, T>,
    family: &'static str,
    name: String,
    value: T,
) -> Result<(), RegistryError> {
    if map.contains_key(&name) {
        return Err(RegistryError::Duplicate {
            family,
            name,
        });
    }
    map.insert(name, value);
    Ok(())
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom function.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken.
    pub fn register_function<F>(
        &mut self,
        name: impl Into<String>,
        function: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&EvaluationContext<'_>, &[ExprValue]) -> Result<ExprValue, FunctionError>
            + Send
            + Sync
            + 'static,
    {
        insert_unique(&mut self.custom, "custom", name.into(), Arc::new(function))
    }

    /// Registers an async condition function.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken.
    pub fn register_async_condition(
        &mut self,
        name: impl Into<String>,
        function: Arc<dyn AsyncConditionFunction>,
    ) -> Result<(), RegistryError> {
        insert_unique(&mut self.async_conditions, "async condition", name.into(), function)
    }

    /// Registers an async closure as a condition function.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken.
    pub fn register_async_fn<F, Fut>(
        &mut self,
        name: impl Into<String>,
        function: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(Option<Value>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FunctionError>> + Send + 'static,
    {
        self.register_async_condition(name, Arc::new(AsyncFn::new(function)))
    }

    /// Registers a synchronous validator.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken.
    pub fn register_validator<F>(
        &mut self,
        name: impl Into<String>,
        function: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&EvaluationContext<'_>, &Value) -> Option<ValidationError> + Send + Sync + 'static,
    {
        insert_unique(&mut self.validators, "validator", name.into(), Arc::new(function))
    }

    /// Registers an async validator.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken.
    pub fn register_async_validator(
        &mut self,
        name: impl Into<String>,
        validator: Arc<dyn AsyncValidator>,
    ) -> Result<(), RegistryError> {
        insert_unique(&mut self.async_validators, "async validator", name.into(), validator)
    }

    /// Registers a derivation function.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken.
    pub fn register_derivation<F>(
        &mut self,
        name: impl Into<String>,
        function: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&EvaluationContext<'_>) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        insert_unique(&mut self.derivations, "derivation", name.into(), Arc::new(function))
    }

    /// Looks up a custom function.
    #[must_use]
    pub fn custom_function(&self, name: &str) -> Option<CustomFunction> {
        self.custom.get(name).cloned()
    }

    /// Looks up an async condition function.
    #[must_use]
    pub fn async_condition(&self, name: &str) -> Option<Arc<dyn AsyncConditionFunction>> {
        self.async_conditions.get(name).cloned()
    }

    /// Looks up a synchronous validator.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownFunctionError`] when the name is not registered.
    pub fn validator(&self, name: &str) -> Result<ValidatorFunction, UnknownFunctionError> {
        self.validators.get(name).cloned().ok_or_else(|| UnknownFunctionError {
            family: "validator",
            name: name.to_string(),
        })
    }

    /// Looks up an async validator.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownFunctionError`] when the name is not registered.
    pub fn async_validator(
        &self,
        name: &str,
    ) -> Result<Arc<dyn AsyncValidator>, UnknownFunctionError> {
        self.async_validators.get(name).cloned().ok_or_else(|| UnknownFunctionError {
            family: "async validator",
            name: name.to_string(),
        })
    }

    /// Looks up a derivation function.
    #[must_use]
    pub fn derivation(&self, name: &str) -> Option<DerivationFunction> {
        self.derivations.get(name).cloned()
    }

    /// Returns every registered name, grouped by family.
    #[must_use]
    pub fn names(&self) -> BTreeMap<&'static str, Vec<String>> {
        let mut names = BTreeMap::new();
        names.insert("custom", self.custom.keys().cloned().collect());
        names.insert("async condition", self.async_conditions.keys().cloned().collect());
        names.insert("validator", self.validators.keys().cloned().collect());
        names.insert("async validator", self.async_validators.keys().cloned().collect());
        names.insert("derivation", self.derivations.keys().cloned().collect());
        names
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry").field("names", &self.names()).finish()
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

    use formwork_expr::ExprValue;
    use serde_json::json;

    use super::FunctionRegistry;
    use super::RegistryError;

    #[test]
    fn duplicate_names_are_rejected_per_family() {
        let mut registry = FunctionRegistry::new();
        registry.register_function("check", |_, _| Ok(ExprValue::Bool(true))).unwrap();
        let err = registry.register_function("check", |_, _| Ok(ExprValue::Bool(false))).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                family: "custom",
                name: "check".to_string()
            }
        );
        registry.register_async_fn("check", |_, _| async { Ok(json!(true)) }).unwrap();
    }

    #[test]
    fn missing_validators_are_reported_by_name() {
        let registry = FunctionRegistry::new();
        let err = registry.validator("unique").err().unwrap();
        assert_eq!(err.to_string(), "unknown validator function: unique");
    }
}
