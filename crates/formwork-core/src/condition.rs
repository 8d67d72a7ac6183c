// crates/formwork-core/src/condition.rs
// ============================================================================
// Module: Condition Model
// Description: Closed set of boolean predicates over form state.
// Purpose: Describe visibility, enablement and guards as serializable data.
// Dependencies: formwork-expr, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A [`Condition`] is plain data: it serializes to and from JSON with a
//! `type` tag and camelCase members, and its canonical serialization is the
//! cache key used by the logic factory. `remote` and `async` conditions need
//! out-of-band resolution, so they may only appear at the top level of a
//! condition tree; [`Condition::validate_shape`] enforces this before any
//! condition is compiled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use formwork_expr::ParseLimits;
use formwork_expr::parse;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::cache_key::CacheKeyError;
use crate::transport::RequestSpec;

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Comparison operator used by field and form conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    /// Structural equality.
    Equals,
    /// Structural inequality.
    NotEquals,
    /// Strictly greater.
    Greater,
    /// Strictly less.
    Less,
    /// Greater or equal.
    GreaterOrEqual,
    /// Less or equal.
    LessOrEqual,
    /// Substring or array membership.
    Contains,
    /// String prefix.
    StartsWith,
    /// String suffix.
    EndsWith,
    /// Regular expression match.
    Matches,
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

/// Remote condition resolved through the injected transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCondition {
    /// Request to perform.
    pub request: RequestSpec,
    /// Expression mapping `response` to a boolean (default: truthiness).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_expression: Option<String>,
    /// Value published until resolution completes (default from settings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_value: Option<bool>,
    /// Response cache lifetime; `0` disables caching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_duration_ms: Option<u64>,
    /// Quiescence window before a lookup is dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

/// Condition resolved by a registered asynchronous function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncCondition {
    /// Registered async function name.
    pub function_name: String,
    /// Named parameters: name to expression.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    /// Value published until resolution completes (default from settings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_value: Option<bool>,
    /// Result cache lifetime; `0` disables caching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_duration_ms: Option<u64>,
    /// Quiescence window before a lookup is dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

/// Boolean predicate over form state.
///
/// # Invariants
/// - `Remote` and `Async` never appear inside `And`/`Or` once
///   [`Condition::validate_shape`] has accepted the tree.
/// - A `value` of `None` means the comparison value was absent, which is
///   distinct from an explicit JSON `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Condition {
    /// Constant result.
    Literal {
        /// Result value.
        value: bool,
    },
    /// Compares the value at `field_path` against `value`.
    FieldValue {
        /// Path of the field to read, relative to the form root.
        field_path: String,
        /// Comparison operator.
        operator: Operator,
        /// Comparison value.
        #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    /// Compares the whole form value against `value`.
    FormValue {
        /// Comparison operator.
        operator: Operator,
        /// Comparison value.
        #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    /// Evaluates an expression and coerces the result to a boolean.
    Expression {
        /// Expression text.
        #[serde(alias = "expression")]
        code: String,
    },
    /// Calls a registered custom predicate.
    Custom {
        /// Registered function name.
        function_name: String,
    },
    /// True when every child is true; empty is true.
    And {
        /// Child conditions.
        conditions: Vec<Self>,
    },
    /// True when any child is true; empty is false.
    Or {
        /// Child conditions.
        conditions: Vec<Self>,
    },
    /// Network-backed predicate.
    Remote(RemoteCondition),
    /// Async-function-backed predicate.
    Async(AsyncCondition),
}

/// Deserializes a present member as `Some`, keeping explicit `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Invalid condition structure detected at setup time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionShapeError {
    /// An async or remote condition was nested inside a composite.
    #[error("{kind} condition cannot be nested inside {parent} (at {location})")]
    NestedAsync {
        /// Nested condition kind.
        kind: &'static str,
        /// Enclosing composite kind.
        parent: &'static str,
        /// Location of the nested condition (`and[1].or[0]`).
        location: String,
    },
    /// The condition could not be turned into a cache key.
    #[error(transparent)]
    Key(#[from] CacheKeyError),
}

// ============================================================================
// SECTION: References
// ============================================================================

/// Static summary of the form paths a condition reads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldReferences {
    /// Form paths read statically.
    pub paths: BTreeSet<String>,
    /// True when the form root is read in a way that cannot be listed.
    pub dynamic: bool,
}

impl FieldReferences {
    /// Merges another reference set into this one.
    pub fn extend(&mut self, other: Self) {
        self.paths.extend(other.paths);
        self.dynamic |= other.dynamic;
    }

    /// Adds the references made by an expression. Unparseable text adds nothing.
    pub fn add_expression(&mut self, code: &str) {
        if let Ok(program) = parse(code, ParseLimits::default()) {
            let refs = program.references();
            self.paths.extend(refs.form_keys);
            self.dynamic |= refs.dynamic_form_access;
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

impl Condition {
    /// Creates a literal condition.
    #[must_use]
    pub const fn literal(value: bool) -> Self {
        Self::Literal {
            value,
        }
    }

    /// Creates a field comparison.
    #[must_use]
    pub fn field(field_path: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self::FieldValue {
            field_path: field_path.into(),
            operator,
            value: Some(value),
        }
    }

    /// Creates a whole-form comparison.
    #[must_use]
    pub const fn form(operator: Operator, value: Value) -> Self {
        Self::FormValue {
            operator,
            value: Some(value),
        }
    }

    /// Creates an expression condition.
    #[must_use]
    pub fn expression(code: impl Into<String>) -> Self {
        Self::Expression {
            code: code.into(),
        }
    }

    /// Creates a custom-function condition.
    #[must_use]
    pub fn custom(function_name: impl Into<String>) -> Self {
        Self::Custom {
            function_name: function_name.into(),
        }
    }

    /// Creates a conjunction.
    #[must_use]
    pub const fn and(conditions: Vec<Self>) -> Self {
        Self::And {
            conditions,
        }
    }

    /// Creates a disjunction.
    #[must_use]
    pub const fn or(conditions: Vec<Self>) -> Self {
        Self::Or {
            conditions,
        }
    }

    /// Returns the serialized `type` tag of this condition.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Literal {
                ..
            } => "literal",
            Self::FieldValue {
                ..
            } => "fieldValue",
            Self::FormValue {
                ..
            } => "formValue",
            Self::Expression {
                ..
            } => "expression",
            Self::Custom {
                ..
            } => "custom",
            Self::And {
                ..
            } => "and",
            Self::Or {
                ..
            } => "or",
            Self::Remote(_) => "remote",
            Self::Async(_) => "async",
        }
    }

    /// Returns true for conditions that need out-of-band resolution.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Async(_))
    }

    /// Checks that no async or remote condition is nested in a composite.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionShapeError::NestedAsync`] for the first offending child.
    pub fn validate_shape(&self) -> Result<(), ConditionShapeError> {
        check_children(self, "")
    }

    /// Lists the form paths this condition reads.
    ///
    /// `fieldValue` reads of the condition's own field are not included.
    #[must_use]
    pub fn field_references(&self) -> FieldReferences {
        let mut refs = FieldReferences::default();
        match self {
            Self::Literal {
                ..
            }
            | Self::Custom {
                ..
            } => {}
            Self::FieldValue {
                field_path, ..
            } => {
                refs.paths.insert(field_path.clone());
            }
            Self::FormValue {
                ..
            } => refs.dynamic = true,
            Self::Expression {
                code,
            } => refs.add_expression(code),
            Self::And {
                conditions,
            }
            | Self::Or {
                conditions,
            } => {
                for child in conditions {
                    refs.extend(child.field_references());
                }
            }
            Self::Remote(remote) => {
                for expression in remote.request.params.values().chain(remote.request.body.values())
                {
                    refs.add_expression(expression);
                }
            }
            Self::Async(condition) => {
                for expression in condition.params.values() {
                    refs.add_expression(expression);
                }
            }
        }
        refs
    }
}

/// Walks composite children, rejecting async members.
fn check_children(condition: &Condition, prefix: &str) -> Result<(), ConditionShapeError> {
    let (parent, conditions) = match condition {
        Condition::And {
            conditions,
        } => ("and", conditions),
        Condition::Or {
            conditions,
        } => ("or", conditions),
        _ => return Ok(()),
    };
    for (index, child) in conditions.iter().enumerate() {
        let location = format!("{prefix}{parent}[{index}]");
        if child.is_async() {
            return Err(ConditionShapeError::NestedAsync {
                kind: child.kind(),
                parent,
                location,
            });
        }
        check_children(child, &format!("{location}."))?;
    }
    Ok(())
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

    use serde_json::Value;
    use serde_json::json;

    use super::AsyncCondition;
    use super::Condition;
    use super::ConditionShapeError;
    use super::Operator;

    #[test]
    fn deserializes_tagged_camel_case() {
        let condition: Condition = serde_json::from_value(json!({
            "type": "fieldValue",
            "fieldPath": "accountType",
            "operator": "notEquals",
            "value": "business"
        }))
        .unwrap();
        assert_eq!(condition, Condition::field("accountType", Operator::NotEquals, json!("business")));
    }

    #[test]
    fn explicit_null_differs_from_absent_value() {
        let null: Condition =
            serde_json::from_value(json!({"type": "formValue", "operator": "equals", "value": null}))
                .unwrap();
        let absent: Condition =
            serde_json::from_value(json!({"type": "formValue", "operator": "equals"})).unwrap();
        assert_eq!(
            null,
            Condition::FormValue {
                operator: Operator::Equals,
                value: Some(Value::Null)
            }
        );
        assert_ne!(null, absent);
    }

    #[test]
    fn expression_accepts_code_alias() {
        let condition: Condition =
            serde_json::from_value(json!({"type": "expression", "expression": "fieldValue > 1"}))
                .unwrap();
        assert_eq!(condition, Condition::expression("fieldValue > 1"));
    }

    #[test]
    fn nested_async_is_rejected_with_location() {
        let nested = Condition::and(vec![
            Condition::literal(true),
            Condition::or(vec![Condition::Async(AsyncCondition {
                function_name: "check".to_string(),
                params: std::collections::BTreeMap::new(),
                pending_value: None,
                cache_duration_ms: None,
                debounce_ms: None,
            })]),
        ]);
        let err = nested.validate_shape().unwrap_err();
        assert_eq!(
            err,
            ConditionShapeError::NestedAsync {
                kind: "async",
                parent: "or",
                location: "and[1].or[0]".to_string(),
            }
        );
    }

    #[test]
    fn references_cover_paths_and_expressions() {
        let condition = Condition::or(vec![
            Condition::field("country", Operator::Equals, json!("NO")),
            Condition::expression("valueOf('address.zip') && formValue.age > 18"),
        ]);
        let refs = condition.field_references();
        assert!(refs.paths.contains("country"));
        assert!(refs.paths.contains("address.zip"));
        assert!(refs.paths.contains("age"));
        assert!(!refs.dynamic);
    }
}
