// crates/formwork-core/src/comparator.rs
// ============================================================================
// Module: Operator Comparator
// Description: Operator application for field and form conditions.
// Purpose: Compare a possibly absent value against a configured operand.
// Dependencies: formwork-expr, serde_json
// ============================================================================

//! ## Overview
//! Comparison is total: mismatched types, absent values and invalid regular
//! expressions produce `false` rather than an error. Equality is structural.
//! `matches` searches anywhere in the value, like a `RegExp` test; patterns
//! are compiled through the form instance's [`PatternCache`].
//! Ordering compares strings lexicographically when both sides are strings
//! and numerically otherwise; nullish or non-numeric operands never order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;

use formwork_expr::ExprValue;
use serde_json::Value;

use crate::condition::Operator;
use crate::pattern::PatternCache;

// ============================================================================
// SECTION: Comparator Evaluation
// ============================================================================

/// Applies `operator` to `actual` (left) and `expected` (right).
#[must_use]
pub fn apply_operator(
    operator: Operator,
    actual: Option<&Value>,
    expected: Option<&Value>,
    patterns: &PatternCache,
) -> bool {
    let left = ExprValue::from_json_opt(actual);
    let right = ExprValue::from_json_opt(expected);
    match operator {
        Operator::Equals => left.strict_equals(&right),
        Operator::NotEquals => !left.strict_equals(&right),
        Operator::Greater => compare_ordering(&left, &right) == Some(Ordering::Greater),
        Operator::Less => compare_ordering(&left, &right) == Some(Ordering::Less),
        Operator::GreaterOrEqual => {
            matches!(compare_ordering(&left, &right), Some(Ordering::Greater | Ordering::Equal))
        }
        Operator::LessOrEqual => {
            matches!(compare_ordering(&left, &right), Some(Ordering::Less | Ordering::Equal))
        }
        Operator::Contains => compare_contains(&left, &right),
        Operator::StartsWith => compare_affix(&left, &right, true),
        Operator::EndsWith => compare_affix(&left, &right, false),
        Operator::Matches => compare_matches(&left, &right, patterns),
    }
}

/// Orders two values; `None` when they are not comparable.
fn compare_ordering(left: &ExprValue, right: &ExprValue) -> Option<Ordering> {
    match (left, right) {
        (ExprValue::String(left), ExprValue::String(right)) => Some(left.cmp(right)),
        (left, right) if orderable(left) && orderable(right) => {
            left.to_number().partial_cmp(&right.to_number())
        }
        _ => None,
    }
}

/// True for values that take part in numeric ordering.
const fn orderable(value: &ExprValue) -> bool {
    matches!(value, ExprValue::Number(_) | ExprValue::String(_) | ExprValue::Bool(_))
}

/// Substring test for strings, membership test for arrays.
fn compare_contains(left: &ExprValue, right: &ExprValue) -> bool {
    match (left, right) {
        (ExprValue::String(haystack), ExprValue::String(needle)) => {
            haystack.contains(needle.as_str())
        }
        (ExprValue::String(haystack), ExprValue::Number(_) | ExprValue::Bool(_)) => {
            haystack.contains(right.to_display_string().as_str())
        }
        (ExprValue::Array(items), needle) => items.iter().any(|item| item.strict_equals(needle)),
        _ => false,
    }
}

/// Prefix or suffix test over strings.
fn compare_affix(left: &ExprValue, right: &ExprValue, prefix: bool) -> bool {
    let (ExprValue::String(value), ExprValue::String(affix)) = (left, right) else {
        return false;
    };
    if prefix { value.starts_with(affix.as_str()) } else { value.ends_with(affix.as_str()) }
}

/// Regular expression match; an invalid pattern never matches.
fn compare_matches(left: &ExprValue, right: &ExprValue, patterns: &PatternCache) -> bool {
    let (ExprValue::String(value), ExprValue::String(pattern)) = (left, right) else {
        return false;
    };
    patterns.compile(pattern).is_ok_and(|regex| regex.is_match(value))
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

    use super::apply_operator;
    use crate::condition::Operator;
    use crate::pattern::PatternCache;

    /// Applies an operator with a fresh pattern cache.
    fn check(operator: Operator, actual: Option<&Value>, expected: &Value) -> bool {
        apply_operator(operator, actual, Some(expected), &PatternCache::default())
    }

    #[test]
    fn equality_is_structural_and_distinguishes_absence() {
        assert!(check(Operator::Equals, Some(&json!({"a": [1]})), &json!({"a": [1]})));
        assert!(check(Operator::NotEquals, None, &json!(null)));
        assert!(apply_operator(Operator::Equals, None, None, &PatternCache::default()));
    }

    #[test]
    fn ordering_requires_comparable_operands() {
        assert!(check(Operator::Greater, Some(&json!(5)), &json!(3)));
        assert!(check(Operator::LessOrEqual, Some(&json!("5")), &json!(5)));
        assert!(check(Operator::Less, Some(&json!("apple")), &json!("banana")));
        assert!(!check(Operator::Greater, None, &json!(0)));
        assert!(!check(Operator::GreaterOrEqual, Some(&json!(null)), &json!(0)));
        assert!(!check(Operator::Less, Some(&json!("abc")), &json!(1)));
    }

    #[test]
    fn string_and_array_operators() {
        assert!(check(Operator::Contains, Some(&json!("hello")), &json!("ell")));
        assert!(check(Operator::Contains, Some(&json!(["a", 2])), &json!(2)));
        assert!(check(Operator::StartsWith, Some(&json!("hello")), &json!("he")));
        assert!(check(Operator::EndsWith, Some(&json!("hello")), &json!("lo")));
        assert!(!check(Operator::StartsWith, Some(&json!(12)), &json!("1")));
    }

    #[test]
    fn invalid_regex_never_matches() {
        assert!(check(Operator::Matches, Some(&json!("a-12")), &json!("^a-\\d+$")));
        assert!(!check(Operator::Matches, Some(&json!("a")), &json!("(")));
    }

    #[test]
    fn matches_searches_with_metacharacters() {
        let patterns = PatternCache::default();
        let postcode = json!("^[A-Z]{1,2}\\d[A-Z\\d]? ?\\d[A-Z]{2}$");
        let matches = |value: Value, pattern: &Value| {
            apply_operator(Operator::Matches, Some(&value), Some(pattern), &patterns)
        };
        assert!(matches(json!("SW1A 1AA"), &postcode));
        assert!(!matches(json!("SW1A 1AA!"), &postcode));
        assert!(matches(json!("order #42 shipped"), &json!("#\\d+")));
        assert!(!matches(json!("a.c"), &json!("^a\\.b")));
        assert!(matches(json!("a.b.c"), &json!("a\\.b")));
        assert!(matches(json!("cat|dog"), &json!("(cat|bird)")));
        assert!(!matches(json!(42), &json!("\\d+")));
        assert_eq!(patterns.len(), 5);
    }
}
