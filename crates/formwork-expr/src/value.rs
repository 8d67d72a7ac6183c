// crates/formwork-expr/src/value.rs
// ============================================================================
// Module: Expression Values
// Description: Runtime value model for the restricted expression language.
// Purpose: Represent JSON data plus `undefined` with script-like coercions.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`ExprValue`] is the evaluator's value domain. It mirrors JSON with one
//! addition, `Undefined`, so that missing properties, absent fields and
//! explicit `null` stay distinguishable. Coercions (truthiness, numeric and
//! string conversion, loose equality) follow the familiar scripting rules the
//! form authors expect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

// ============================================================================
// SECTION: Value Definition
// ============================================================================

/// Runtime value produced and consumed by the expression evaluator.
///
/// # Invariants
/// - `Object` keys are kept sorted (`BTreeMap`) so iteration is deterministic.
/// - Structural equality is used for arrays and objects.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ExprValue {
    /// Absent value (missing property, unset field).
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value (IEEE-754 double).
    Number(f64),
    /// String value.
    String(String),
    /// Ordered list of values.
    Array(Vec<ExprValue>),
    /// Key/value record.
    Object(BTreeMap<String, ExprValue>),
}

impl ExprValue {
    /// Builds a value from an optional JSON value (`None` becomes `Undefined`).
    #[must_use]
    pub fn from_json_opt(value: Option<&Value>) -> Self {
        value.map_or(Self::Undefined, Self::from_json)
    }

    /// Builds a value from JSON.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(*flag),
            Value::Number(number) => Self::Number(number.as_f64().unwrap_or(f64::NAN)),
            Value::String(text) => Self::String(text.clone()),
            Value::Array(items) => Self::Array(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Object(
                map.iter().map(|(key, value)| (key.clone(), Self::from_json(value))).collect(),
            ),
        }
    }

    /// Converts to JSON; top-level `Undefined` becomes `None`.
    ///
    /// Nested `Undefined` values inside arrays become `null` and are dropped
    /// from objects, matching JSON serialization of script values.
    #[must_use]
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Undefined => None,
            Self::Null => Some(Value::Null),
            Self::Bool(flag) => Some(Value::Bool(*flag)),
            Self::Number(number) => Some(number_to_json(*number)),
            Self::String(text) => Some(Value::String(text.clone())),
            Self::Array(items) => Some(Value::Array(
                items.iter().map(|item| item.to_json().unwrap_or(Value::Null)).collect(),
            )),
            Self::Object(map) => {
                let mut out = Map::new();
                for (key, value) in map {
                    if let Some(json) = value.to_json() {
                        out.insert(key.clone(), json);
                    }
                }
                Some(Value::Object(out))
            }
        }
    }

    /// Returns true for `undefined` and `null`.
    #[must_use]
    pub const fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Returns true when this value is a boolean.
    #[must_use]
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    /// Script truthiness.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(flag) => *flag,
            Self::Number(number) => *number != 0.0 && !number.is_nan(),
            Self::String(text) => !text.is_empty(),
            Self::Array(_) | Self::Object(_) => true,
        }
    }

    /// Numeric conversion (`Number(x)` semantics).
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined | Self::Object(_) => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(flag) => f64::from(u8::from(*flag)),
            Self::Number(number) => *number,
            Self::String(text) => parse_numeric_string(text),
            Self::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
        }
    }

    /// String conversion (`String(x)` semantics).
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(flag) => flag.to_string(),
            Self::Number(number) => format_number(*number),
            Self::String(text) => text.clone(),
            Self::Array(items) => items
                .iter()
                .map(|item| {
                    if item.is_nullish() { String::new() } else { item.to_display_string() }
                })
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object Object]".to_string(),
        }
    }

    /// Returns the `typeof` label for this value.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null | Self::Array(_) | Self::Object(_) => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }

    /// Strict equality (`===`), structural for arrays and objects.
    #[must_use]
    pub fn strict_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(left), Self::Number(right)) => left == right,
            _ => self == other,
        }
    }

    /// Loose equality (`==`).
    #[must_use]
    pub fn loose_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (left, right) if left.is_nullish() && right.is_nullish() => true,
            (left, right) if left.is_nullish() || right.is_nullish() => false,
            (Self::Number(_), Self::String(_) | Self::Bool(_))
            | (Self::String(_) | Self::Bool(_), Self::Number(_))
            | (Self::Bool(_), Self::String(_))
            | (Self::String(_), Self::Bool(_)) => {
                let left = self.to_number();
                let right = other.to_number();
                left == right
            }
            _ => self.strict_equals(other),
        }
    }

    /// Reads a named property; missing properties yield `Undefined`.
    #[must_use]
    pub fn property(&self, name: &str) -> Self {
        match self {
            Self::Object(map) => map.get(name).cloned().unwrap_or_default(),
            Self::Array(items) => {
                if name == "length" {
                    return Self::Number(len_as_f64(items.len()));
                }
                name.parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index).cloned())
                    .unwrap_or_default()
            }
            Self::String(text) => {
                if name == "length" {
                    return Self::Number(len_as_f64(text.chars().count()));
                }
                name.parse::<usize>()
                    .ok()
                    .and_then(|index| text.chars().nth(index))
                    .map_or(Self::Undefined, |ch| Self::String(ch.to_string()))
            }
            _ => Self::Undefined,
        }
    }

    /// Reads a computed property (`value[key]`).
    #[must_use]
    pub fn index(&self, key: &Self) -> Self {
        match key {
            Self::Number(number) if number.fract() == 0.0 && *number >= 0.0 => {
                self.property(&format_number(*number))
            }
            other => self.property(&other.to_display_string()),
        }
    }
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<bool> for ExprValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for ExprValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ExprValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ExprValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Value> for ExprValue {
    fn from(value: Value) -> Self {
        Self::from_json(&value)
    }
}

impl From<&Value> for ExprValue {
    fn from(value: &Value) -> Self {
        Self::from_json(value)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts a length into a float without lossy casts for realistic sizes.
#[must_use]
pub fn len_as_f64(len: usize) -> f64 {
    u32::try_from(len).map_or(f64::from(u32::MAX), f64::from)
}

/// Formats a number the way script engines print it.
#[must_use]
pub fn format_number(number: f64) -> String {
    if number.is_nan() {
        return "NaN".to_string();
    }
    if number.is_infinite() {
        return if number > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if number == 0.0 {
        return "0".to_string();
    }
    if number.fract() == 0.0 && number.abs() < 1e21 {
        return format!("{number:.0}");
    }
    format!("{number}")
}

/// Parses a string using `Number(string)` rules.
fn parse_numeric_string(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => {
            if trimmed.contains(|ch: char| ch.is_ascii_alphabetic() && ch != 'e' && ch != 'E') {
                return f64::NAN;
            }
            trimmed.parse::<f64>().unwrap_or(f64::NAN)
        }
    }
}

/// Converts a float to a JSON number, preferring integers when exact.
fn number_to_json(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < 9.007_199_254_740_992e15 {
        let text = format!("{number:.0}");
        if let Ok(integer) = text.parse::<i64>() {
            return Value::Number(Number::from(integer));
        }
    }
    Number::from_f64(number).map_or(Value::Null, Value::Number)
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
        clippy::float_cmp,
        reason = "Test-only assertions are permitted."
    )]

    use serde_json::json;

    use super::ExprValue;

    #[test]
    fn json_round_trip_keeps_integers() {
        let value = ExprValue::from_json(&json!({"qty": 3, "price": 4.5, "tags": ["a", null]}));
        assert_eq!(value.to_json(), Some(json!({"qty": 3, "price": 4.5, "tags": ["a", null]})));
    }

    #[test]
    fn undefined_and_null_are_distinct() {
        assert_ne!(ExprValue::Undefined, ExprValue::Null);
        assert!(ExprValue::Undefined.loose_equals(&ExprValue::Null));
        assert!(!ExprValue::Undefined.strict_equals(&ExprValue::Null));
        assert_eq!(ExprValue::Undefined.to_json(), None);
    }

    #[test]
    fn coercions_follow_script_rules() {
        assert_eq!(ExprValue::from("  12 ").to_number(), 12.0);
        assert!(ExprValue::from("abc").to_number().is_nan());
        assert_eq!(ExprValue::Null.to_number(), 0.0);
        assert!(!ExprValue::from("").truthy());
        assert!(ExprValue::Array(vec![]).truthy());
        assert_eq!(ExprValue::Number(3.0).to_display_string(), "3");
        assert!(ExprValue::Number(1.0).loose_equals(&ExprValue::from("1")));
    }

    #[test]
    fn property_access_is_lenient() {
        let value = ExprValue::from_json(&json!({"a": {"b": [10, 20]}}));
        assert_eq!(value.property("a").property("b").property("1"), ExprValue::Number(20.0));
        assert_eq!(value.property("missing").property("deeper"), ExprValue::Undefined);
        assert_eq!(ExprValue::from("abc").property("length"), ExprValue::Number(3.0));
    }
}
