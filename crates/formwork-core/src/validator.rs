// crates/formwork-core/src/validator.rs
// ============================================================================
// Module: Validator Factory
// Description: Validator descriptions, setup checks and evaluation.
// Purpose: Apply built-in, custom, async and HTTP validators to field paths.
// Dependencies: formwork-expr, regex, serde, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! A [`ValidatorConfig`] describes one rule for one target path. Setup
//! ([`FormRuntime::prepare_validator`]) fails fast on configuration defects:
//! unregistered functions, invalid static patterns and invalid guard shapes.
//! Evaluation never fails: unexpected faults produce no error plus a
//! diagnostic.
//!
//! Every validator reads through untracked contexts. A validator whose guard
//! or predicate references fields other than its own target is marked
//! cross-field and must run in the tree-level pass over a whole-form
//! snapshot, never in the per-field reactive path.
//!
//! Async and HTTP validators use inverted success: a completed lookup still
//! has to be judged (by `on_success` or `validWhen`), and failed lookups fall
//! back to a configurable outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use formwork_expr::ExprValue;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::condition::Condition;
use crate::condition::ConditionShapeError;
use crate::condition::FieldReferences;
use crate::context::EvaluationContext;
use crate::diagnostics::DiagnosticCode;
use crate::evaluator::evaluate_condition;
use crate::field::FieldState;
use crate::field::ReadMode;
use crate::field::SnapshotField;
use crate::path::root_key;
use crate::pattern::anchored;
use crate::registry::AsyncValidator;
use crate::registry::UnknownFunctionError;
use crate::registry::ValidatorFunction;
use crate::resolver::resolve_params;
use crate::resolver::resolve_request;
use crate::runtime::FormRuntime;
use crate::runtime::RuntimeInner;
use crate::schema::Gate;
use crate::transport::HttpRequest;
use crate::transport::RequestSpec;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Validation failure reported for a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Error identifier (`required`, `minLength`, custom kinds).
    pub kind: String,
    /// Target field path.
    pub field: String,
    /// Optional human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl ValidationError {
    /// Creates an error of `kind`; the field is filled in by the caller.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            field: String::new(),
            message: None,
            params: None,
        }
    }

    /// Attaches a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// Configuration defects detected while setting up a form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    /// A named function is not registered.
    #[error(transparent)]
    UnknownFunction(#[from] UnknownFunctionError),
    /// A condition has an invalid shape.
    #[error(transparent)]
    InvalidCondition(#[from] ConditionShapeError),
    /// A static pattern does not compile.
    #[error("invalid pattern `{pattern}` for {field}: {message}")]
    InvalidPattern {
        /// Target field.
        field: String,
        /// Pattern text.
        pattern: String,
        /// Regex error.
        message: String,
    },
    /// A validator guard needs out-of-band resolution.
    #[error("validator guard for {field} cannot be an async or remote condition")]
    AsyncGuard {
        /// Target field.
        field: String,
    },
    /// A custom validator names neither an expression nor a function.
    #[error("custom validator for {field} needs an expression or a function name")]
    EmptyCustom {
        /// Target field.
        field: String,
    },
    /// A schema, field or logic entry is malformed.
    #[error("invalid form definition: {0}")]
    InvalidDefinition(String),
}

// ============================================================================
// SECTION: Descriptions
// ============================================================================

/// Static or computed validator operand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidatorValue {
    /// Value computed by an expression at validation time.
    Dynamic {
        /// Expression text.
        expression: String,
    },
    /// Literal value.
    Static(Value),
}

/// Outcome used when an HTTP validator's request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnError {
    /// Let the value pass.
    #[default]
    Ignore,
    /// Report the validator's error.
    Fail,
}

/// Validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ValidatorRule {
    /// Value must be present and non-empty.
    Required,
    /// Value must look like an e-mail address.
    Email,
    /// Numeric lower bound.
    Min {
        /// Bound.
        value: ValidatorValue,
    },
    /// Numeric upper bound.
    Max {
        /// Bound.
        value: ValidatorValue,
    },
    /// Minimum string or array length.
    MinLength {
        /// Bound.
        value: ValidatorValue,
    },
    /// Maximum string or array length.
    MaxLength {
        /// Bound.
        value: ValidatorValue,
    },
    /// Regular expression the whole string must match.
    Pattern {
        /// Pattern.
        value: ValidatorValue,
    },
    /// Inline expression or registered validator.
    Custom {
        /// Expression returning `true` to pass, `false` or an error kind to fail.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expression: Option<String>,
        /// Registered validator name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        function_name: Option<String>,
        /// Parameters passed to the registered validator.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
        /// Error kind reported when the expression returns `false`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_kind: Option<String>,
    },
    /// Registered async validator.
    Async {
        /// Registered async validator name.
        function_name: String,
        /// Named parameters: name to expression.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        params: BTreeMap<String, String>,
    },
    /// HTTP lookup judged by an expression over `response`.
    Http {
        /// Request to perform.
        request: RequestSpec,
        /// Expression over `response` returning `true` when valid.
        valid_when: String,
        /// Error kind reported on failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_kind: Option<String>,
        /// Outcome when the request fails.
        #[serde(default)]
        on_error: OnError,
    },
}

impl ValidatorRule {
    /// Returns the error kind reported by this rule.
    #[must_use]
    pub fn error_kind(&self) -> String {
        match self {
            Self::Required => "required".to_string(),
            Self::Email => "email".to_string(),
            Self::Min {
                ..
            } => "min".to_string(),
            Self::Max {
                ..
            } => "max".to_string(),
            Self::MinLength {
                ..
            } => "minLength".to_string(),
            Self::MaxLength {
                ..
            } => "maxLength".to_string(),
            Self::Pattern {
                ..
            } => "pattern".to_string(),
            Self::Custom {
                error_kind, ..
            } => error_kind.clone().unwrap_or_else(|| "custom".to_string()),
            Self::Async {
                function_name, ..
            } => function_name.clone(),
            Self::Http {
                error_kind, ..
            } => error_kind.clone().unwrap_or_else(|| "http".to_string()),
        }
    }

    /// Returns true for rules evaluated by `validate_async` only.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(
            self,
            Self::Async {
                ..
            } | Self::Http {
                ..
            }
        )
    }
}

/// Validator description applied to a target path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorConfig {
    /// Rule.
    #[serde(flatten)]
    pub rule: ValidatorRule,
    /// Path relative to the enclosing field or schema target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Guard; the validator is skipped while it is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Condition>,
    /// Message attached to reported errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Declared form paths read by the validator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_references: Vec<String>,
}

impl ValidatorConfig {
    /// Creates a config for a rule with no guard.
    #[must_use]
    pub const fn new(rule: ValidatorRule) -> Self {
        Self {
            rule,
            path: None,
            when: None,
            message: None,
            field_references: Vec::new(),
        }
    }

    /// Adds a guard.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.when = Some(condition);
        self
    }
}

// ============================================================================
// SECTION: Cross-Field Detection
// ============================================================================

/// Collects every form path a validator reads.
#[must_use]
pub fn validator_references(config: &ValidatorConfig) -> FieldReferences {
    let mut refs = FieldReferences::default();
    refs.paths.extend(config.field_references.iter().cloned());
    if let Some(guard) = &config.when {
        refs.extend(guard.field_references());
    }
    match &config.rule {
        ValidatorRule::Required | ValidatorRule::Email => {}
        ValidatorRule::Min {
            value,
        }
        | ValidatorRule::Max {
            value,
        }
        | ValidatorRule::MinLength {
            value,
        }
        | ValidatorRule::MaxLength {
            value,
        }
        | ValidatorRule::Pattern {
            value,
        } => {
            if let ValidatorValue::Dynamic {
                expression,
            } = value
            {
                refs.add_expression(expression);
            }
        }
        ValidatorRule::Custom {
            expression, ..
        } => {
            if let Some(expression) = expression {
                refs.add_expression(expression);
            }
        }
        ValidatorRule::Async {
            params, ..
        } => params.values().for_each(|expression| refs.add_expression(expression)),
        ValidatorRule::Http {
            request,
            valid_when,
            ..
        } => {
            request
                .params
                .values()
                .chain(request.body.values())
                .for_each(|expression| refs.add_expression(expression));
            refs.add_expression(valid_when);
        }
    }
    refs
}

/// Returns the root keys of fields other than `target` read by the validator
/// or by the schema `gates` it inherits.
///
/// Dynamic root access is reported as `*`.
#[must_use]
pub fn cross_field_references(
    config: &ValidatorConfig,
    gates: &[Gate],
    target: &str,
) -> BTreeSet<String> {
    let mut refs = validator_references(config);
    for gate in gates {
        refs.extend(gate.field_references());
    }
    let own = root_key(target);
    let mut others: BTreeSet<String> =
        refs.paths.iter().map(|path| root_key(path)).filter(|key| *key != own).collect();
    if refs.dynamic {
        others.insert("*".to_string());
    }
    others
}

// ============================================================================
// SECTION: Prepared Validators
// ============================================================================

/// Validator bound to a concrete target path, checked at setup.
#[derive(Clone)]
pub struct FieldValidator {
    /// Target path (may contain `[*]` wildcards).
    pub target: String,
    /// Description.
    pub config: ValidatorConfig,
    /// Other fields read by the validator; non-empty means tree-level.
    pub cross_field: BTreeSet<String>,
    /// Precompiled static pattern.
    pattern: Option<Regex>,
    /// Registered synchronous validator.
    function: Option<ValidatorFunction>,
    /// Registered async validator.
    async_validator: Option<Arc<dyn AsyncValidator>>,
}

impl FieldValidator {
    /// Returns true when the validator must run in the tree-level pass.
    #[must_use]
    pub fn is_cross_field(&self) -> bool {
        !self.cross_field.is_empty()
    }

    /// Returns true when the validator only runs asynchronously.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        self.config.rule.is_async()
    }
}

impl std::fmt::Debug for FieldValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldValidator")
            .field("target", &self.target)
            .field("config", &self.config)
            .field("cross_field", &self.cross_field)
            .finish_non_exhaustive()
    }
}

impl FormRuntime {
    /// Checks a validator description and binds it to `target`.
    ///
    /// Cross-field validators are reported with a `cross_field_hoisted`
    /// diagnostic.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] for unregistered functions, invalid static
    /// patterns, invalid or async guards and empty custom validators.
    pub fn prepare_validator(
        &self,
        target: &str,
        config: &ValidatorConfig,
    ) -> Result<FieldValidator, SetupError> {
        self.prepare_gated_validator(target, config, &[])
    }

    /// Checks a schema-contributed validator whose `gates` may read other
    /// fields; such reads also hoist it to tree-level validation.
    ///
    /// # Errors
    ///
    /// As for [`FormRuntime::prepare_validator`].
    pub fn prepare_gated_validator(
        &self,
        target: &str,
        config: &ValidatorConfig,
        gates: &[Gate],
    ) -> Result<FieldValidator, SetupError> {
        let functions = &self.inner.services.functions;
        if let Some(guard) = &config.when {
            guard.validate_shape()?;
            if guard.is_async() {
                return Err(SetupError::AsyncGuard {
                    field: target.to_string(),
                });
            }
        }
        let mut pattern = None;
        let mut function = None;
        let mut async_validator = None;
        match &config.rule {
            ValidatorRule::Pattern {
                value: ValidatorValue::Static(Value::String(text)),
            } => {
                pattern = Some(compile_pattern(text).map_err(|err| SetupError::InvalidPattern {
                    field: target.to_string(),
                    pattern: text.clone(),
                    message: err.to_string(),
                })?);
            }
            ValidatorRule::Custom {
                expression,
                function_name,
                ..
            } => match (expression, function_name) {
                (_, Some(name)) => function = Some(functions.validator(name)?),
                (Some(_), None) => {}
                (None, None) => {
                    return Err(SetupError::EmptyCustom {
                        field: target.to_string(),
                    });
                }
            },
            ValidatorRule::Async {
                function_name, ..
            } => async_validator = Some(functions.async_validator(function_name)?),
            _ => {}
        }
        let cross_field = cross_field_references(config, gates, target);
        if !cross_field.is_empty() {
            self.inner.services.diagnostics.info(
                DiagnosticCode::CrossFieldHoisted,
                target,
                format!(
                    "{} validator reads {} and runs in tree-level validation",
                    config.rule.error_kind(),
                    cross_field.iter().cloned().collect::<Vec<_>>().join(", ")
                ),
            );
        }
        Ok(FieldValidator {
            target: target.to_string(),
            config: config.clone(),
            cross_field,
            pattern,
            function,
            async_validator,
        })
    }

    /// Runs a synchronous validator against a field occurrence.
    ///
    /// Async and HTTP validators are skipped and return `None`.
    #[must_use]
    pub fn run_validator(
        &self,
        validator: &FieldValidator,
        state: &dyn FieldState,
    ) -> Option<ValidationError> {
        let context = EvaluationContext::untracked(&self.inner.services, state);
        if !guard_passes(validator, &context) {
            return None;
        }
        let error = check_sync(validator, &context)?;
        Some(finish(error, validator, &state.path()))
    }

    /// Runs an async or HTTP validator against a field occurrence.
    ///
    /// Synchronous validators are delegated to [`FormRuntime::run_validator`].
    pub async fn run_validator_async(
        &self,
        validator: &FieldValidator,
        state: &dyn FieldState,
    ) -> Option<ValidationError> {
        let job = self.prepare_job(validator, state)?;
        run_job(Arc::clone(&self.inner), job).await
    }

    /// Resolves the owned work of an async validator synchronously.
    pub(crate) fn prepare_job(
        &self,
        validator: &FieldValidator,
        state: &dyn FieldState,
    ) -> Option<AsyncJob> {
        if !validator.is_async() {
            return self.run_validator(validator, state).map(AsyncJob::Done);
        }
        let context = EvaluationContext::untracked(&self.inner.services, state);
        if !guard_passes(validator, &context) {
            return None;
        }
        let field = state.path();
        let kind = validator.config.rule.error_kind();
        let message = validator.config.message.clone();
        match (&validator.config.rule, &validator.async_validator) {
            (
                ValidatorRule::Async {
                    params, ..
                },
                Some(async_validator),
            ) => Some(AsyncJob::Function {
                validator: Arc::clone(async_validator),
                value: context.current_value().cloned(),
                params: resolve_params(params, &context),
                field,
                message,
            }),
            (
                ValidatorRule::Http {
                    request,
                    valid_when,
                    on_error,
                    ..
                },
                _,
            ) => Some(AsyncJob::Http {
                request: resolve_request(request, &context),
                valid_when: valid_when.clone(),
                on_error: *on_error,
                snapshot: SnapshotField::new(state.root_value(ReadMode::Untracked), field.clone()),
                kind,
                field,
                message,
            }),
            _ => None,
        }
    }
}

/// Evaluates the validator's guard.
fn guard_passes(validator: &FieldValidator, context: &EvaluationContext<'_>) -> bool {
    validator.config.when.as_ref().is_none_or(|guard| evaluate_condition(guard, context))
}

/// Fills in the target field and configured message.
fn finish(mut error: ValidationError, validator: &FieldValidator, field: &str) -> ValidationError {
    error.field = field.to_string();
    if error.message.is_none() {
        error.message.clone_from(&validator.config.message);
    }
    error
}

/// Compiles a pattern that must match the whole value.
fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&anchored(pattern))
}

// ============================================================================
// SECTION: Built-in Checks
// ============================================================================

/// True for values that built-ins other than `required` let pass.
fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Resolves a validator operand; expression faults yield `None`.
fn operand(value: &ValidatorValue, context: &EvaluationContext<'_>) -> Option<Value> {
    match value {
        ValidatorValue::Static(value) => Some(value.clone()),
        ValidatorValue::Dynamic {
            expression,
        } => match context.evaluate(expression) {
            Ok(value) => value.to_json(),
            Err(err) => {
                context.services().diagnostics.error(
                    DiagnosticCode::ValidatorFailed,
                    &context.path(),
                    format!("validator operand `{expression}` failed: {err}"),
                );
                None
            }
        },
    }
}

/// Numeric view of a JSON value; `None` when not numeric.
fn numeric(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(_) | Value::String(_) => ExprValue::from_json(value).to_number(),
        _ => return None,
    };
    (!number.is_nan()).then_some(number)
}

/// Length of a string (in characters) or array.
fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(text) => Some(text.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Checks the shape of an e-mail address.
fn looks_like_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !text.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

/// Runs a synchronous rule; `None` means valid.
fn check_sync(
    validator: &FieldValidator,
    context: &EvaluationContext<'_>,
) -> Option<ValidationError> {
    let value = context.current_value();
    match &validator.config.rule {
        ValidatorRule::Required => is_empty(value).then(|| ValidationError::new("required")),
        ValidatorRule::Email => {
            if is_empty(value) {
                return None;
            }
            let valid = value.and_then(Value::as_str).is_some_and(looks_like_email);
            (!valid).then(|| ValidationError::new("email"))
        }
        ValidatorRule::Min {
            value: bound,
        } => check_bound("min", value, operand(bound, context).as_ref(), |actual, limit| {
            actual >= limit
        }),
        ValidatorRule::Max {
            value: bound,
        } => check_bound("max", value, operand(bound, context).as_ref(), |actual, limit| {
            actual <= limit
        }),
        ValidatorRule::MinLength {
            value: bound,
        } => check_length("minLength", value, operand(bound, context).as_ref(), |actual, limit| {
            actual >= limit
        }),
        ValidatorRule::MaxLength {
            value: bound,
        } => check_length("maxLength", value, operand(bound, context).as_ref(), |actual, limit| {
            actual <= limit
        }),
        ValidatorRule::Pattern {
            value: pattern,
        } => check_pattern(validator, value, pattern, context),
        ValidatorRule::Custom {
            expression,
            params,
            error_kind,
            ..
        } => {
            if let Some(function) = &validator.function {
                let params = params.clone().unwrap_or(Value::Null);
                return function(context, &params).map(|mut error| {
                    if error.params.is_none() && !params.is_null() {
                        error.params = Some(params);
                    }
                    error
                });
            }
            let code = expression.as_deref()?;
            check_custom_expression(code, error_kind.as_deref(), context)
        }
        ValidatorRule::Async {
            ..
        }
        | ValidatorRule::Http {
            ..
        } => None,
    }
}

/// Numeric bound check; empty values and non-numeric bounds pass.
fn check_bound(
    kind: &str,
    value: Option<&Value>,
    bound: Option<&Value>,
    within: impl Fn(f64, f64) -> bool,
) -> Option<ValidationError> {
    if is_empty(value) {
        return None;
    }
    let limit = bound.and_then(numeric)?;
    let actual = value.and_then(numeric)?;
    (!within(actual, limit))
        .then(|| ValidationError::new(kind).with_params(json!({ kind: limit, "actual": actual })))
}

/// Length bound check; empty values and non-numeric bounds pass.
fn check_length(
    kind: &str,
    value: Option<&Value>,
    bound: Option<&Value>,
    within: impl Fn(f64, f64) -> bool,
) -> Option<ValidationError> {
    if is_empty(value) {
        return None;
    }
    let limit = bound.and_then(numeric)?;
    let actual = value.and_then(length_of)?;
    let actual_length = u32::try_from(actual).map_or(f64::from(u32::MAX), f64::from);
    (!within(actual_length, limit)).then(|| {
        ValidationError::new(kind)
            .with_params(json!({ "requiredLength": limit, "actualLength": actual }))
    })
}

/// Pattern check; dynamic patterns go through the instance pattern cache.
fn check_pattern(
    validator: &FieldValidator,
    value: Option<&Value>,
    pattern: &ValidatorValue,
    context: &EvaluationContext<'_>,
) -> Option<ValidationError> {
    if is_empty(value) {
        return None;
    }
    let text = value.and_then(Value::as_str).map_or_else(
        || value.map(|value| ExprValue::from_json(value).to_display_string()).unwrap_or_default(),
        str::to_string,
    );
    let source = operand(pattern, context).and_then(|value| value.as_str().map(str::to_string))?;
    let matched = match &validator.pattern {
        Some(regex) => regex.is_match(&text),
        None => match context.services().patterns.compile(&anchored(&source)) {
            Ok(regex) => regex.is_match(&text),
            Err(err) => {
                context.services().diagnostics.error(
                    DiagnosticCode::ValidatorFailed,
                    &context.path(),
                    format!("pattern `{source}` is invalid: {err}"),
                );
                return None;
            }
        },
    };
    (!matched).then(|| {
        ValidationError::new("pattern")
            .with_params(json!({ "requiredPattern": source, "actualValue": text }))
    })
}

/// Inline custom expression: `true` passes, `false` fails with the error
/// kind, and a non-empty string fails with that string as the kind.
fn check_custom_expression(
    code: &str,
    error_kind: Option<&str>,
    context: &EvaluationContext<'_>,
) -> Option<ValidationError> {
    match context.evaluate(code) {
        Ok(ExprValue::String(kind)) if !kind.is_empty() => Some(ValidationError::new(kind)),
        Ok(ExprValue::Undefined | ExprValue::Null) => None,
        Ok(value) => {
            (!value.truthy()).then(|| ValidationError::new(error_kind.unwrap_or("custom")))
        }
        Err(err) => {
            context.services().diagnostics.error(
                DiagnosticCode::ValidatorFailed,
                &context.path(),
                format!("custom validator `{code}` failed: {err}"),
            );
            None
        }
    }
}

// ============================================================================
// SECTION: Async Validation
// ============================================================================

/// Owned async validation work, ready to run on any task.
pub(crate) enum AsyncJob {
    /// Already decided synchronously.
    Done(ValidationError),
    /// Registered async validator call.
    Function {
        /// Validator implementation.
        validator: Arc<dyn AsyncValidator>,
        /// Field value.
        value: Option<Value>,
        /// Resolved parameters.
        params: Value,
        /// Target field path.
        field: String,
        /// Configured message.
        message: Option<String>,
    },
    /// HTTP lookup.
    Http {
        /// Resolved request.
        request: HttpRequest,
        /// Expression over `response`.
        valid_when: String,
        /// Outcome when the request fails.
        on_error: OnError,
        /// Form snapshot for mapping the response.
        snapshot: SnapshotField,
        /// Error kind.
        kind: String,
        /// Target field path.
        field: String,
        /// Configured message.
        message: Option<String>,
    },
}

/// Attaches field and message to an async outcome.
fn attach(
    error: Option<ValidationError>,
    field: String,
    message: Option<String>,
) -> Option<ValidationError> {
    error.map(|mut error| {
        error.field = field;
        if error.message.is_none() {
            error.message = message;
        }
        error
    })
}

/// Runs prepared async validation work.
pub(crate) async fn run_job(inner: Arc<RuntimeInner>, job: AsyncJob) -> Option<ValidationError> {
    match job {
        AsyncJob::Done(error) => Some(error),
        AsyncJob::Function {
            validator,
            value,
            params,
            field,
            message,
        } => {
            let outcome = match validator.call(value, params.clone()).await {
                Ok(result) => validator.on_success(&result, &params),
                Err(err) => {
                    inner.services.diagnostics.warn(
                        DiagnosticCode::ResolutionFailed,
                        &field,
                        format!("async validator failed: {err}"),
                    );
                    validator.on_error(&err)
                }
            };
            attach(outcome, field, message)
        }
        AsyncJob::Http {
            request,
            valid_when,
            on_error,
            snapshot,
            kind,
            field,
            message,
        } => {
            let transport = Arc::clone(&inner.transport);
            let outcome = match transport.perform_request(&request).await {
                Ok(response) => {
                    let context = EvaluationContext::untracked(&inner.services, &snapshot)
                        .with_binding("response", ExprValue::from_json(&response));
                    match context.evaluate(&valid_when) {
                        Ok(value) => (!value.truthy()).then(|| ValidationError::new(kind)),
                        Err(err) => {
                            inner.services.diagnostics.error(
                                DiagnosticCode::ValidatorFailed,
                                &field,
                                format!("validWhen `{valid_when}` failed: {err}"),
                            );
                            None
                        }
                    }
                }
                Err(err) => {
                    inner.services.diagnostics.warn(
                        DiagnosticCode::ResolutionFailed,
                        &field,
                        format!("http validator request failed: {err}"),
                    );
                    match on_error {
                        OnError::Ignore => None,
                        OnError::Fail => Some(ValidationError::new(kind)),
                    }
                }
            };
            attach(outcome, field, message)
        }
    }
}
