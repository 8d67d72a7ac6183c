// crates/formwork-core/src/form.rs
// ============================================================================
// Module: Form Engine
// Description: Form definitions compiled into logic, validators and derivations.
// Purpose: Evaluate field logic and collect validation reports for a form.
// Dependencies: serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! A [`FormDefinition`] lists fields with their validators, logic rules,
//! derivation and schema applications. [`FormEngine::build`] checks the whole
//! definition up front and returns a [`SetupError`] for configuration
//! defects. After setup nothing fails: logic evaluates to booleans, and
//! validation collects every error into a [`ValidationReport`].
//!
//! Validators that read other fields are hoisted out of the per-field path
//! ([`FormEngine::validate_field`]) and only run in the tree-level pass of
//! [`FormEngine::validate`], which reads an untracked snapshot of the form.
//!
//! # Invariants
//! - Report order: field-level errors in declaration order, then
//!   tree-level errors, then async errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;

use crate::condition::Condition;
use crate::derivation::Derivation;
use crate::derivation::DerivationFn;
use crate::diagnostics::DiagnosticCode;
use crate::field::FieldState;
use crate::field::ReadMode;
use crate::field::SnapshotField;
use crate::logic::LogicFn;
use crate::path::expand_path;
use crate::path::join_path;
use crate::path::matches_pattern;
use crate::runtime::FormRuntime;
use crate::schema::Gate;
use crate::schema::SchemaApplication;
use crate::schema::SchemaDefinition;
use crate::schema::SchemaRegistry;
use crate::validator::FieldValidator;
use crate::validator::SetupError;
use crate::validator::ValidationError;
use crate::validator::ValidatorConfig;
use crate::validator::run_job;

// ============================================================================
// SECTION: Descriptions
// ============================================================================

/// Field logic kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogicKind {
    /// Field is hidden.
    Hidden,
    /// Field is disabled.
    Disabled,
    /// Field is read-only.
    Readonly,
    /// Field is required.
    Required,
}

/// Logic rule attached to a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicConfig {
    /// Logic kind.
    #[serde(rename = "type")]
    pub kind: LogicKind,
    /// Condition producing the flag.
    pub condition: Condition,
    /// Optional debounce window for synchronous conditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    /// Path relative to the enclosing field or schema target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Field description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Field path (may contain `[*]` wildcards).
    #[serde(alias = "key")]
    pub path: String,
    /// Validators.
    #[serde(default)]
    pub validators: Vec<ValidatorConfig>,
    /// Logic rules.
    #[serde(default)]
    pub logic: Vec<LogicConfig>,
    /// Derived value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derive: Option<Derivation>,
    /// Schema applications.
    #[serde(default)]
    pub schemas: Vec<SchemaApplication>,
}

/// Form description.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDefinition {
    /// Fields in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Named schemas available to the fields.
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaDefinition>,
}

/// Logic flags of one field occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FieldLogicState {
    /// Field is hidden.
    pub hidden: bool,
    /// Field is disabled.
    pub disabled: bool,
    /// Field is read-only.
    pub readonly: bool,
    /// Field is required.
    pub required: bool,
}

impl FieldLogicState {
    /// Raises the flag for `kind`.
    const fn raise(&mut self, kind: LogicKind) {
        match kind {
            LogicKind::Hidden => self.hidden = true,
            LogicKind::Disabled => self.disabled = true,
            LogicKind::Readonly => self.readonly = true,
            LogicKind::Required => self.required = true,
        }
    }
}

/// Collected validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationReport {
    /// Errors in report order.
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// Returns true when no validator failed.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the errors reported for one field.
    #[must_use]
    pub fn errors_for(&self, field: &str) -> Vec<&ValidationError> {
        self.errors.iter().filter(|error| error.field == field).collect()
    }
}

// ============================================================================
// SECTION: Plans
// ============================================================================

/// Validator with the gates it inherited from schemas.
#[derive(Debug, Clone)]
struct PlannedValidator {
    /// Prepared validator.
    validator: FieldValidator,
    /// Schema gates.
    gates: Vec<Gate>,
}

/// Compiled logic rule.
#[derive(Clone)]
struct PlannedLogic {
    /// Target path pattern.
    target: String,
    /// Logic kind.
    kind: LogicKind,
    /// Function used for field state (debounced when configured).
    function: LogicFn,
    /// Undebounced function used during validation.
    immediate: LogicFn,
    /// Schema gates.
    gates: Vec<Gate>,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Compiled form.
#[derive(Clone)]
pub struct FormEngine {
    /// Cache context.
    runtime: FormRuntime,
    /// Schemas used by the definition.
    schemas: SchemaRegistry,
    /// Field-level validators.
    field_level: Vec<PlannedValidator>,
    /// Hoisted cross-field validators.
    tree_level: Vec<PlannedValidator>,
    /// Logic rules.
    logic: Vec<PlannedLogic>,
    /// Derivations by target pattern.
    derivations: Vec<(String, DerivationFn)>,
}

impl FormEngine {
    /// Compiles a form definition.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] for invalid conditions, unregistered validators,
    /// invalid patterns and malformed definitions.
    pub fn build(definition: &FormDefinition, runtime: FormRuntime) -> Result<Self, SetupError> {
        let schemas = SchemaRegistry::new(runtime.diagnostics().clone());
        Self::build_with_schemas(definition, runtime, schemas)
    }

    /// Compiles a form definition against pre-registered schemas.
    ///
    /// # Errors
    ///
    /// As for [`FormEngine::build`]; also rejects definition schemas whose
    /// names are already registered.
    pub fn build_with_schemas(
        definition: &FormDefinition,
        runtime: FormRuntime,
        mut schemas: SchemaRegistry,
    ) -> Result<Self, SetupError> {
        for (name, schema) in &definition.schemas {
            schemas
                .register(name.clone(), schema.clone())
                .map_err(|err| SetupError::InvalidDefinition(err.to_string()))?;
        }
        let mut field_gates: Vec<(FieldValidator, Vec<Gate>)> = Vec::new();
        let mut logic = Vec::new();
        let mut derivations = Vec::new();
        for field in &definition.fields {
            if field.path.is_empty() {
                return Err(SetupError::InvalidDefinition(
                    "field path must not be empty".to_string(),
                ));
            }
            for config in &field.validators {
                let target = join_path(&field.path, config.path.as_deref().unwrap_or_default());
                field_gates.push((runtime.prepare_validator(&target, config)?, Vec::new()));
            }
            for config in &field.logic {
                let target = join_path(&field.path, config.path.as_deref().unwrap_or_default());
                logic.push(plan_logic(&runtime, target, config, Vec::new())?);
            }
            if let Some(derivation) = &field.derive {
                let function = runtime
                    .compile_derivation(derivation)
                    .map_err(|err| SetupError::InvalidDefinition(err.to_string()))?;
                derivations.push((field.path.clone(), function));
            }
            for application in &field.schemas {
                let rules = schemas.expand(application, &field.path);
                for scoped in rules.validators {
                    let validator = runtime.prepare_gated_validator(
                        &scoped.target,
                        &scoped.config,
                        &scoped.gates,
                    )?;
                    field_gates.push((validator, scoped.gates));
                }
                for scoped in rules.logic {
                    logic.push(plan_logic(&runtime, scoped.target, &scoped.config, scoped.gates)?);
                }
            }
        }
        let mut field_level = Vec::new();
        let mut tree_level = Vec::new();
        for (validator, gates) in field_gates {
            let level = if validator.is_cross_field() { &mut tree_level } else { &mut field_level };
            level.push(PlannedValidator {
                validator,
                gates,
            });
        }
        Ok(Self {
            runtime,
            schemas,
            field_level,
            tree_level,
            logic,
            derivations,
        })
    }

    /// Returns the cache context.
    #[must_use]
    pub const fn runtime(&self) -> &FormRuntime {
        &self.runtime
    }

    /// Returns the schema registry.
    #[must_use]
    pub const fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Returns the targets of validators hoisted to tree-level validation.
    #[must_use]
    pub fn hoisted_targets(&self) -> Vec<&str> {
        self.tree_level.iter().map(|planned| planned.validator.target.as_str()).collect()
    }

    /// Evaluates the logic flags of a field occurrence with tracked reads.
    #[must_use]
    pub fn logic_state(&self, state: &dyn FieldState) -> FieldLogicState {
        let path = state.path();
        let mut flags = FieldLogicState::default();
        let matching: Vec<&PlannedLogic> =
            self.logic.iter().filter(|rule| matches_pattern(&rule.target, &path)).collect();
        if matching.is_empty() {
            return flags;
        }
        let root = state.root_value(ReadMode::Untracked);
        for rule in matching {
            if self.runtime.gates_pass(&rule.gates, &root, &path) && (rule.function)(state) {
                flags.raise(rule.kind);
            }
        }
        flags
    }

    /// Runs the field-level synchronous validators of one occurrence.
    ///
    /// Hoisted cross-field validators are not run here.
    #[must_use]
    pub fn validate_field(&self, state: &dyn FieldState) -> Vec<ValidationError> {
        let path = state.path();
        let root = state.root_value(ReadMode::Untracked);
        self.field_level
            .iter()
            .filter(|planned| matches_pattern(&planned.validator.target, &path))
            .filter(|planned| self.runtime.gates_pass(&planned.gates, &root, &path))
            .filter_map(|planned| self.runtime.run_validator(&planned.validator, state))
            .collect()
    }

    /// Validates a whole form value synchronously.
    ///
    /// Runs field-level validators, logic-driven `required` checks and the
    /// hoisted tree-level validators. Async and HTTP validators are skipped.
    #[must_use]
    pub fn validate(&self, root: &Value) -> ValidationReport {
        let mut report = ValidationReport::default();
        for planned in &self.field_level {
            self.run_planned(planned, root, &mut report);
        }
        self.required_by_logic(root, &mut report);
        for planned in &self.tree_level {
            self.run_planned(planned, root, &mut report);
        }
        report
    }

    /// Validates a whole form value including async and HTTP validators.
    ///
    /// Async work for every occurrence runs concurrently; results are
    /// appended after the synchronous errors in declaration order.
    pub async fn validate_async(&self, root: &Value) -> ValidationReport {
        let mut report = self.validate(root);
        let mut tasks = JoinSet::new();
        let mut index = 0_usize;
        for planned in self.field_level.iter().chain(&self.tree_level) {
            if !planned.validator.is_async() {
                continue;
            }
            for occurrence in expand_path(root, &planned.validator.target) {
                if !self.runtime.gates_pass(&planned.gates, root, &occurrence) {
                    continue;
                }
                let snapshot = SnapshotField::new(root.clone(), occurrence);
                if let Some(job) = self.runtime.prepare_job(&planned.validator, &snapshot) {
                    let inner = Arc::clone(&self.runtime.inner);
                    let position = index;
                    tasks.spawn(async move { (position, run_job(inner, job).await) });
                    index += 1;
                }
            }
        }
        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => self.runtime.diagnostics().error(
                    DiagnosticCode::ValidatorFailed,
                    "form",
                    format!("async validator task failed: {err}"),
                ),
            }
        }
        outcomes.sort_by_key(|(position, _)| *position);
        report.errors.extend(outcomes.into_iter().filter_map(|(_, error)| error));
        report
    }

    /// Computes every derived value of a form value, keyed by occurrence.
    #[must_use]
    pub fn derived_values(&self, root: &Value) -> BTreeMap<String, Value> {
        let mut values = BTreeMap::new();
        for (target, function) in &self.derivations {
            for occurrence in expand_path(root, target) {
                let snapshot = SnapshotField::new(root.clone(), occurrence.clone());
                if let Some(value) = function(&snapshot) {
                    values.insert(occurrence, value);
                }
            }
        }
        values
    }

    /// Runs a synchronous validator for every occurrence of its target.
    fn run_planned(&self, planned: &PlannedValidator, root: &Value, report: &mut ValidationReport) {
        if planned.validator.is_async() {
            return;
        }
        for occurrence in expand_path(root, &planned.validator.target) {
            if !self.runtime.gates_pass(&planned.gates, root, &occurrence) {
                continue;
            }
            let snapshot = SnapshotField::new(root.clone(), occurrence);
            if let Some(error) = self.runtime.run_validator(&planned.validator, &snapshot) {
                report.errors.push(error);
            }
        }
    }

    /// Adds `required` errors for fields made required by logic.
    fn required_by_logic(&self, root: &Value, report: &mut ValidationReport) {
        let mut reported: BTreeSet<String> = report
            .errors
            .iter()
            .filter(|error| error.kind == "required")
            .map(|error| error.field.clone())
            .collect();
        for rule in self.logic.iter().filter(|rule| rule.kind == LogicKind::Required) {
            for occurrence in expand_path(root, &rule.target) {
                if reported.contains(&occurrence)
                    || !self.runtime.gates_pass(&rule.gates, root, &occurrence)
                {
                    continue;
                }
                let snapshot = SnapshotField::new(root.clone(), occurrence.clone());
                let empty = match snapshot.current_value(ReadMode::Untracked) {
                    None | Some(Value::Null) => true,
                    Some(Value::String(text)) => text.is_empty(),
                    Some(Value::Array(items)) => items.is_empty(),
                    Some(_) => false,
                };
                if empty && (rule.immediate)(&snapshot) {
                    let mut error = ValidationError::new("required");
                    error.field.clone_from(&occurrence);
                    report.errors.push(error);
                    reported.insert(occurrence);
                }
            }
        }
    }
}

impl std::fmt::Debug for FormEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormEngine")
            .field("field_level", &self.field_level)
            .field("tree_level", &self.tree_level)
            .field("logic_rules", &self.logic.len())
            .field("derivations", &self.derivations.len())
            .finish_non_exhaustive()
    }
}

/// Compiles a logic rule.
fn plan_logic(
    runtime: &FormRuntime,
    target: String,
    config: &LogicConfig,
    gates: Vec<Gate>,
) -> Result<PlannedLogic, SetupError> {
    let immediate = runtime.compile_logic(&config.condition)?;
    let function = match config.debounce_ms {
        Some(debounce_ms) => runtime.compile_debounced_logic(&config.condition, debounce_ms)?,
        None => Arc::clone(&immediate),
    };
    Ok(PlannedLogic {
        target,
        kind: config.kind,
        function,
        immediate,
        gates,
    })
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

    use serde_json::json;

    use super::FormDefinition;
    use super::FormEngine;
    use crate::field::SnapshotField;
    use crate::runtime::FormRuntime;
    use crate::validator::SetupError;

    fn definition(value: serde_json::Value) -> FormDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn collects_every_error_in_declaration_order() {
        let form = definition(json!({
            "fields": [
                {"key": "name", "validators": [{"type": "required"}, {"type": "minLength", "value": 3}]},
                {"key": "email", "validators": [{"type": "email", "message": "bad address"}]}
            ]
        }));
        let engine = FormEngine::build(&form, FormRuntime::default()).unwrap();
        let report = engine.validate(&json!({"name": "ab", "email": "nope"}));
        let kinds: Vec<&str> = report.errors.iter().map(|error| error.kind.as_str()).collect();
        assert_eq!(kinds, vec!["minLength", "email"]);
        assert_eq!(report.errors_for("email")[0].message.as_deref(), Some("bad address"));
        assert!(engine.validate(&json!({"name": "abc", "email": "a@b.io"})).is_valid());
    }

    #[test]
    fn cross_field_validators_leave_the_field_path() {
        let form = definition(json!({
            "fields": [
                {"key": "password"},
                {"key": "confirm", "validators": [{
                    "type": "custom",
                    "expression": "fieldValue === valueOf('password')",
                    "errorKind": "mismatch"
                }]}
            ]
        }));
        let engine = FormEngine::build(&form, FormRuntime::default()).unwrap();
        assert_eq!(engine.hoisted_targets(), vec!["confirm"]);
        let root = json!({"password": "a", "confirm": "b"});
        assert!(engine.validate_field(&SnapshotField::new(root.clone(), "confirm")).is_empty());
        let report = engine.validate(&root);
        assert_eq!(report.errors[0].kind, "mismatch");
        assert_eq!(report.errors[0].field, "confirm");
    }

    #[test]
    fn logic_flags_and_required_logic() {
        let form = definition(json!({
            "fields": [
                {"key": "accountType"},
                {"key": "company", "logic": [
                    {"type": "hidden", "condition": {"type": "fieldValue", "fieldPath": "accountType", "operator": "notEquals", "value": "business"}},
                    {"type": "required", "condition": {"type": "fieldValue", "fieldPath": "accountType", "operator": "equals", "value": "business"}}
                ]}
            ]
        }));
        let engine = FormEngine::build(&form, FormRuntime::default()).unwrap();
        let personal = json!({"accountType": "personal"});
        let flags = engine.logic_state(&SnapshotField::new(personal.clone(), "company"));
        assert!(flags.hidden);
        assert!(!flags.required);
        assert!(engine.validate(&personal).is_valid());
        let business = json!({"accountType": "business", "company": ""});
        let report = engine.validate(&business);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, "company");
    }

    #[test]
    fn schemas_apply_to_each_element() {
        let form = definition(json!({
            "schemas": {"line": {"validators": [{"type": "min", "value": 1, "path": "qty"}]}},
            "fields": [{"key": "items", "schemas": [{"schema": "line", "strategy": "applyEach"}]}]
        }));
        let engine = FormEngine::build(&form, FormRuntime::default()).unwrap();
        let report = engine.validate(&json!({"items": [{"qty": 2}, {"qty": 0}]}));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, "items[1].qty");
    }

    #[test]
    fn unregistered_validators_fail_setup() {
        let form = definition(json!({
            "fields": [{"key": "name", "validators": [{"type": "custom", "functionName": "missing"}]}]
        }));
        let err = FormEngine::build(&form, FormRuntime::default()).unwrap_err();
        assert!(matches!(err, SetupError::UnknownFunction(_)));
    }

    #[test]
    fn derived_values_follow_the_form() {
        let form = definition(json!({
            "fields": [{"key": "total", "derive": {"type": "expression", "code": "(formValue.qty||0)*(formValue.price||0)"}}]
        }));
        let engine = FormEngine::build(&form, FormRuntime::default()).unwrap();
        let values = engine.derived_values(&json!({"qty": 3, "price": 4}));
        assert_eq!(values.get("total"), Some(&json!(12)));
    }
}
