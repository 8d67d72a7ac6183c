// crates/formwork-core/src/schema.rs
// ============================================================================
// Module: Schema Registry
// Description: Named reusable bundles of validators and logic.
// Purpose: Compose schemas onto target paths with gating strategies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`SchemaDefinition`] bundles validators, logic and nested schema
//! applications. Schemas are registered by name in a [`SchemaRegistry`] or
//! inlined. Applying a schema to a target path flattens it into
//! [`ScopedValidator`] and [`ScopedLogic`] entries, each carrying the
//! [`Gate`]s that must pass before it is used.
//!
//! Strategies:
//! - `apply` applies unconditionally.
//! - `applyWhen` gates on a condition evaluated at the target.
//! - `applyWhenValue` gates on a predicate expression over the target value.
//! - `applyEach` applies once per element of an array-valued target.
//!
//! Unknown schema names never fail: a `schema_not_found` diagnostic lists
//! the registered names and the application is skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

use crate::condition::Condition;
use crate::condition::FieldReferences;
use crate::context::EvaluationContext;
use crate::diagnostics::Diagnostic;
use crate::diagnostics::DiagnosticCode;
use crate::diagnostics::DiagnosticLevel;
use crate::diagnostics::Diagnostics;
use crate::evaluator::coerce_boolean;
use crate::evaluator::evaluate_condition;
use crate::field::ReadMode;
use crate::field::SnapshotField;
use crate::form::LogicConfig;
use crate::path::WILDCARD;
use crate::path::join_path;
use crate::path::path_keys;
use crate::registry::RegistryError;
use crate::runtime::FormRuntime;
use crate::validator::ValidatorConfig;

/// Nesting limit for schema applications.
const MAX_SCHEMA_DEPTH: usize = 32;

// ============================================================================
// SECTION: Descriptions
// ============================================================================

/// Reusable bundle of validators, logic and nested schemas.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    /// Validators; `path` is relative to the schema target.
    #[serde(default)]
    pub validators: Vec<ValidatorConfig>,
    /// Logic rules; `path` is relative to the schema target.
    #[serde(default)]
    pub logic: Vec<LogicConfig>,
    /// Nested applications; `path` is relative to the schema target.
    #[serde(default)]
    pub sub_schemas: Vec<SchemaApplication>,
}

/// Schema named in the registry or given inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaRef {
    /// Registered schema name.
    Named(String),
    /// Inline definition.
    Inline(Box<SchemaDefinition>),
}

/// Application strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ApplyStrategy {
    /// Unconditional.
    Apply,
    /// Gated by a condition evaluated at the target.
    ApplyWhen {
        /// Gate condition.
        condition: Condition,
    },
    /// Gated by an expression over the target value (`fieldValue`).
    ApplyWhenValue {
        /// Predicate expression.
        predicate: String,
    },
    /// Applied to every element of the array at the target.
    ApplyEach,
}

/// Schema applied to a path with a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaApplication {
    /// Schema to apply.
    pub schema: SchemaRef,
    /// Target path relative to the enclosing field or schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Strategy.
    #[serde(flatten)]
    pub strategy: ApplyStrategy,
}

impl SchemaApplication {
    /// Applies a named schema unconditionally at the enclosing target.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            schema: SchemaRef::Named(name.into()),
            path: None,
            strategy: ApplyStrategy::Apply,
        }
    }

    /// Sets the relative target path.
    #[must_use]
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: ApplyStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

// ============================================================================
// SECTION: Gates
// ============================================================================

/// Precondition attached to rules contributed by a gated schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Condition evaluated at the schema target.
    Condition {
        /// Schema target (may contain wildcards).
        path: String,
        /// Gate condition.
        condition: Condition,
    },
    /// Predicate over the schema target's value.
    Value {
        /// Schema target (may contain wildcards).
        path: String,
        /// Predicate expression.
        predicate: String,
    },
}

impl Gate {
    /// Lists the form paths the gate reads besides its own target.
    #[must_use]
    pub fn field_references(&self) -> FieldReferences {
        match self {
            Self::Condition {
                condition, ..
            } => condition.field_references(),
            Self::Value {
                predicate, ..
            } => {
                let mut refs = FieldReferences::default();
                refs.add_expression(predicate);
                refs
            }
        }
    }
}

impl FormRuntime {
    /// Returns true when every gate passes for the rule occurrence at
    /// `occurrence` within `root`. Gates read untracked snapshots.
    #[must_use]
    pub fn gates_pass(&self, gates: &[Gate], root: &serde_json::Value, occurrence: &str) -> bool {
        gates.iter().all(|gate| self.gate_passes(gate, root, occurrence))
    }

    /// Evaluates one gate against a snapshot bound to the occurrence.
    fn gate_passes(&self, gate: &Gate, root: &serde_json::Value, occurrence: &str) -> bool {
        let path = match gate {
            Gate::Condition {
                path, ..
            }
            | Gate::Value {
                path, ..
            } => bind_wildcards(path, occurrence),
        };
        let snapshot = SnapshotField::new(root.clone(), path);
        let context = EvaluationContext::new(self.services(), &snapshot, ReadMode::Untracked);
        match gate {
            Gate::Condition {
                condition, ..
            } => evaluate_condition(condition, &context),
            Gate::Value {
                predicate, ..
            } => match context.evaluate(predicate) {
                Ok(value) => coerce_boolean(&value, predicate, &context),
                Err(err) => {
                    self.diagnostics().error(
                        DiagnosticCode::ExpressionFailed,
                        &context.path(),
                        format!("schema predicate `{predicate}` failed: {err}"),
                    );
                    false
                }
            },
        }
    }
}

/// Replaces wildcards in `pattern` with the indices of `occurrence`.
///
/// `pattern` addresses an ancestor of (or the same node as) `occurrence`.
fn bind_wildcards(pattern: &str, occurrence: &str) -> String {
    let concrete = path_keys(occurrence);
    path_keys(pattern).iter().enumerate().fold(String::new(), |path, (position, key)| {
        let key = if key == WILDCARD { concrete.get(position).unwrap_or(key) } else { key };
        if key.parse::<usize>().is_ok() {
            format!("{path}[{key}]")
        } else {
            join_path(&path, key)
        }
    })
}

// ============================================================================
// SECTION: Scoped Rules
// ============================================================================

/// Validator contributed by a schema to a target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedValidator {
    /// Target path (may contain wildcards).
    pub target: String,
    /// Gates inherited from enclosing applications.
    pub gates: Vec<Gate>,
    /// Validator description.
    pub config: ValidatorConfig,
}

/// Logic rule contributed by a schema to a target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedLogic {
    /// Target path (may contain wildcards).
    pub target: String,
    /// Gates inherited from enclosing applications.
    pub gates: Vec<Gate>,
    /// Logic description.
    pub config: LogicConfig,
}

/// Flattened result of applying schemas.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaRules {
    /// Validators in application order.
    pub validators: Vec<ScopedValidator>,
    /// Logic rules in application order.
    pub logic: Vec<ScopedLogic>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Named schema store.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    /// Schemas by name.
    schemas: BTreeMap<String, SchemaDefinition>,
    /// Diagnostics hub.
    diagnostics: Diagnostics,
}

impl SchemaRegistry {
    /// Creates an empty registry reporting through `diagnostics`.
    #[must_use]
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            schemas: BTreeMap::new(),
            diagnostics,
        }
    }

    /// Registers a schema.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        schema: SchemaDefinition,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.schemas.contains_key(&name) {
            return Err(RegistryError::Duplicate {
                family: "schema",
                name,
            });
        }
        self.schemas.insert(name, schema);
        Ok(())
    }

    /// Returns a registered schema.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SchemaDefinition> {
        self.schemas.get(name)
    }

    /// Returns registered names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    /// Applies a schema at `base` and returns the flattened rules.
    #[must_use]
    pub fn expand(&self, application: &SchemaApplication, base: &str) -> SchemaRules {
        let mut rules = SchemaRules::default();
        self.apply(application, base, &[], &mut rules, 0);
        rules
    }

    /// Applies a schema at `base` into `rules`, inheriting `gates`.
    pub fn apply(
        &self,
        application: &SchemaApplication,
        base: &str,
        gates: &[Gate],
        rules: &mut SchemaRules,
        depth: usize,
    ) {
        let target = join_path(base, application.path.as_deref().unwrap_or_default());
        if depth >= MAX_SCHEMA_DEPTH {
            self.diagnostics.error(
                DiagnosticCode::SchemaTooDeep,
                &target,
                format!("schema nesting exceeds {MAX_SCHEMA_DEPTH} levels; application skipped"),
            );
            return;
        }
        let Some(schema) = self.resolve(&application.schema, &target) else {
            return;
        };
        let mut gates = gates.to_vec();
        let target = match &application.strategy {
            ApplyStrategy::Apply => target,
            ApplyStrategy::ApplyWhen {
                condition,
            } => {
                gates.push(Gate::Condition {
                    path: target.clone(),
                    condition: condition.clone(),
                });
                target
            }
            ApplyStrategy::ApplyWhenValue {
                predicate,
            } => {
                gates.push(Gate::Value {
                    path: target.clone(),
                    predicate: predicate.clone(),
                });
                target
            }
            ApplyStrategy::ApplyEach => join_path(&target, "[*]"),
        };
        for config in &schema.validators {
            rules.validators.push(ScopedValidator {
                target: join_path(&target, config.path.as_deref().unwrap_or_default()),
                gates: gates.clone(),
                config: config.clone(),
            });
        }
        for config in &schema.logic {
            rules.logic.push(ScopedLogic {
                target: join_path(&target, config.path.as_deref().unwrap_or_default()),
                gates: gates.clone(),
                config: config.clone(),
            });
        }
        for nested in &schema.sub_schemas {
            self.apply(nested, &target, &gates, rules, depth + 1);
        }
    }

    /// Resolves a reference, reporting unknown names.
    fn resolve<'s>(&'s self, schema: &'s SchemaRef, target: &str) -> Option<&'s SchemaDefinition> {
        match schema {
            SchemaRef::Inline(definition) => Some(definition),
            SchemaRef::Named(name) => {
                let found = self.schemas.get(name);
                if found.is_none() {
                    let available = self.names();
                    self.diagnostics.emit(
                        &Diagnostic::new(
                            DiagnosticLevel::Warn,
                            DiagnosticCode::SchemaNotFound,
                            target,
                            format!(
                                "schema `{name}` is not registered; available: [{}]",
                                available.join(", ")
                            ),
                        )
                        .with_detail(json!({ "schema": name, "available": available })),
                    );
                }
                found
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
