// crates/formwork-core/src/path.rs
// ============================================================================
// Module: Field Paths
// Description: Dot/bracket path parsing and tolerant JSON traversal.
// Purpose: Resolve `a.b[0].c` style field paths against form values.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Paths address values inside the form root. Segments are separated by `.`
//! and may use brackets for indices or quoted keys (`items[0]`,
//! `map['odd.key']`). Traversal is tolerant: a missing intermediate key
//! yields `None` instead of an error.

use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Segments
// ============================================================================

/// One path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object key.
    Key(String),
    /// Array index.
    Index(usize),
}

impl PathSegment {
    /// Returns the segment as a key string.
    #[must_use]
    pub fn as_key(&self) -> String {
        match self {
            Self::Key(key) => key.clone(),
            Self::Index(index) => index.to_string(),
        }
    }
}

/// Splits a path into segments. Empty input yields no segments (the root).
#[must_use]
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '.' => flush(&mut current, &mut segments),
            '[' => {
                flush(&mut current, &mut segments);
                let mut inner = String::new();
                for next in chars.by_ref() {
                    if next == ']' {
                        break;
                    }
                    inner.push(next);
                }
                let inner = inner.trim();
                let unquoted = inner
                    .strip_prefix('\'')
                    .and_then(|rest| rest.strip_suffix('\''))
                    .or_else(|| inner.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')));
                match unquoted {
                    Some(key) => segments.push(PathSegment::Key(key.to_string())),
                    None => segments.push(
                        inner.parse::<usize>().map_or_else(
                            |_| PathSegment::Key(inner.to_string()),
                            PathSegment::Index,
                        ),
                    ),
                }
            }
            _ => current.push(ch),
        }
    }
    flush(&mut current, &mut segments);
    segments
}

/// Pushes a pending key segment.
fn flush(current: &mut String, segments: &mut Vec<PathSegment>) {
    if !current.is_empty() {
        segments.push(PathSegment::Key(std::mem::take(current)));
    }
}

/// Returns the first key of a path (`"a"` for `a.b[0]`), or `""` for the root.
#[must_use]
pub fn root_key(path: &str) -> String {
    parse_path(path).first().map(PathSegment::as_key).unwrap_or_default()
}

/// Returns the segments of a path as strings (`a.b[0]` gives `a`, `b`, `0`).
#[must_use]
pub fn path_keys(path: &str) -> Vec<String> {
    parse_path(path).iter().map(PathSegment::as_key).collect()
}

// ============================================================================
// SECTION: Traversal
// ============================================================================

/// Resolves a path against a value.
#[must_use]
pub fn resolve_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = root;
    for segment in parse_path(path) {
        current = match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get(&key)?,
            (Value::Object(map), PathSegment::Index(index)) => map.get(&index.to_string())?,
            (Value::Array(items), PathSegment::Index(index)) => items.get(index)?,
            (Value::Array(items), PathSegment::Key(key)) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Returns false when `keys` step through an array element, or below one,
/// that `root` no longer holds. Absent object members alone never count.
#[must_use]
pub fn elements_exist(root: &Value, keys: &[String]) -> bool {
    let mut current = root;
    for (position, key) in keys.iter().enumerate() {
        let next = match current {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return !keys[position ..].iter().any(|key| key.parse::<usize>().is_ok()),
        }
    }
    true
}

/// Writes `value` at `path`, creating intermediate objects and padding
/// arrays with `null` as needed. Returns `false` when a scalar blocks the path.
pub fn set_path(root: &mut Value, path: &str, value: Value) -> bool {
    let segments = parse_path(path);
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return true;
    };
    let mut current = root;
    for segment in parents {
        if current.is_null() {
            *current = match segment {
                PathSegment::Key(_) => Value::Object(Map::new()),
                PathSegment::Index(_) => Value::Array(Vec::new()),
            };
        }
        let Some(next) = child_mut(current, segment) else {
            return false;
        };
        current = next;
    }
    if current.is_null() {
        *current = match last {
            PathSegment::Key(_) => Value::Object(Map::new()),
            PathSegment::Index(_) => Value::Array(Vec::new()),
        };
    }
    match child_mut(current, last) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

/// Returns a mutable child slot, creating it when absent.
fn child_mut<'v>(value: &'v mut Value, segment: &PathSegment) -> Option<&'v mut Value> {
    match (value, segment) {
        (Value::Object(map), segment) => Some(map.entry(segment.as_key()).or_insert(Value::Null)),
        (Value::Array(items), PathSegment::Index(index)) => {
            if items.len() <= *index {
                items.resize(index + 1, Value::Null);
            }
            items.get_mut(*index)
        }
        _ => None,
    }
}

// ============================================================================
// SECTION: Patterns
// ============================================================================

/// Wildcard segment matching every array index (`items[*].name`).
pub const WILDCARD: &str = "*";

/// Joins a relative path onto a base path.
#[must_use]
pub fn join_path(base: &str, relative: &str) -> String {
    match (base.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (false, true) => base.to_string(),
        (false, false) if relative.starts_with('[') => format!("{base}{relative}"),
        (false, false) => format!("{base}.{relative}"),
    }
}

/// Returns true when `path` is an occurrence of `pattern`.
#[must_use]
pub fn matches_pattern(pattern: &str, path: &str) -> bool {
    let pattern = path_keys(pattern);
    let path = path_keys(path);
    pattern.len() == path.len()
        && pattern.iter().zip(&path).all(|(want, have)| {
            want == have || (want == WILDCARD && have.parse::<usize>().is_ok())
        })
}

/// Expands `[*]` segments against the indices present in `root`.
///
/// Paths without wildcards are returned as-is even when absent.
#[must_use]
pub fn expand_path(root: &Value, pattern: &str) -> Vec<String> {
    let mut prefixes = vec![String::new()];
    for segment in parse_path(pattern) {
        prefixes = match segment {
            PathSegment::Key(key) if key == WILDCARD => prefixes
                .into_iter()
                .flat_map(|prefix| {
                    let count = match resolve_path(root, &prefix) {
                        Some(Value::Array(items)) => items.len(),
                        _ => 0,
                    };
                    (0 .. count).map(move |index| format!("{prefix}[{index}]"))
                })
                .collect(),
            PathSegment::Key(key) => prefixes
                .into_iter()
                .map(|prefix| {
                    let plain = !key.is_empty()
                        && key.chars().all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '$');
                    if plain {
                        join_path(&prefix, &key)
                    } else {
                        format!("{prefix}['{key}']")
                    }
                })
                .collect(),
            PathSegment::Index(index) => {
                prefixes.into_iter().map(|prefix| format!("{prefix}[{index}]")).collect()
            }
        };
    }
    prefixes
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

    use super::PathSegment;
    use super::elements_exist;
    use super::expand_path;
    use super::join_path;
    use super::matches_pattern;
    use super::parse_path;
    use super::path_keys;
    use super::resolve_path;
    use super::root_key;
    use super::set_path;

    #[test]
    fn parses_dots_and_brackets() {
        assert_eq!(
            parse_path("items[2].name['odd.key']"),
            vec![
                PathSegment::Key("items".to_string()),
                PathSegment::Index(2),
                PathSegment::Key("name".to_string()),
                PathSegment::Key("odd.key".to_string()),
            ]
        );
        assert!(parse_path("").is_empty());
        assert_eq!(root_key("address.city"), "address");
    }

    #[test]
    fn resolution_tolerates_missing_keys() {
        let value = json!({"a": {"b": [10, {"c": true}]}});
        assert_eq!(resolve_path(&value, "a.b[1].c"), Some(&json!(true)));
        assert_eq!(resolve_path(&value, "a.b.0"), Some(&json!(10)));
        assert_eq!(resolve_path(&value, "a.x.y"), None);
        assert_eq!(resolve_path(&value, ""), Some(&value));
    }

    #[test]
    fn set_creates_intermediate_containers() {
        let mut value = json!({});
        assert!(set_path(&mut value, "address.city", json!("Oslo")));
        assert!(set_path(&mut value, "tags[1]", json!("b")));
        assert_eq!(value, json!({"address": {"city": "Oslo"}, "tags": [null, "b"]}));
        assert!(!set_path(&mut value, "address.city.zip", json!(1)));
    }

    #[test]
    fn wildcards_expand_against_present_items() {
        let value = json!({"items": [{"qty": 1}, {"qty": 2}], "empty": []});
        assert_eq!(expand_path(&value, "items[*].qty"), vec!["items[0].qty", "items[1].qty"]);
        assert!(expand_path(&value, "empty[*]").is_empty());
        assert_eq!(expand_path(&value, "name"), vec!["name"]);
        assert!(matches_pattern("items[*].qty", "items[1].qty"));
        assert!(!matches_pattern("items[*].qty", "items.qty"));
        assert_eq!(join_path("items[*]", "qty"), "items[*].qty");
        assert_eq!(join_path("", "qty"), "qty");
        assert_eq!(join_path("items", "[*]"), "items[*]");
    }

    #[test]
    fn removed_elements_are_detected_but_absent_members_are_not() {
        let keys = path_keys;
        let root = json!({"items": [{"isbn": "1"}], "email": null});
        assert!(elements_exist(&root, &keys("items[0].isbn")));
        assert!(!elements_exist(&root, &keys("items[1].isbn")));
        assert!(elements_exist(&root, &keys("username")));
        assert!(elements_exist(&root, &keys("email")));
        assert!(!elements_exist(&json!({}), &keys("items[0].isbn")));
    }
}
