// crates/formwork-core/src/pattern.rs
// ============================================================================
// Module: Regular Expression Patterns
// Description: Compiled-pattern memo and whole-string anchoring.
// Purpose: Compile each pattern once per form instance.
// Dependencies: regex
// ============================================================================

//! ## Overview
//! Conditions using `matches` and dynamic `pattern` validators are evaluated
//! on every change, so compiled regular expressions are memoized per form
//! instance in a [`PatternCache`]. Compile failures are memoized too. The
//! memo is cleared when it reaches capacity.
//!
//! `matches` searches anywhere in the value. Validator patterns must match
//! the whole value; [`anchored`] wraps them so both ends are anchored
//! regardless of which anchors the author wrote.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use regex::Regex;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of memoized patterns per form instance.
pub const DEFAULT_PATTERN_CACHE_CAPACITY: usize = 256;

// ============================================================================
// SECTION: Anchoring
// ============================================================================

/// Rewrites `pattern` so that it must match the whole input.
///
/// Existing leading `^` and trailing unescaped `$` anchors are dropped before
/// wrapping, so `^[0-9]+`, `[0-9]+$` and `[0-9]+` all become `^(?:[0-9]+)$`.
#[must_use]
pub fn anchored(pattern: &str) -> String {
    let body = pattern.strip_prefix('^').unwrap_or(pattern);
    let body = match body.strip_suffix('$') {
        Some(rest) if !ends_with_escape(rest) => rest,
        _ => body,
    };
    format!("^(?:{body})$")
}

/// True when `text` ends in an odd run of backslashes.
fn ends_with_escape(text: &str) -> bool {
    text.chars().rev().take_while(|ch| *ch == '\\').count() % 2 == 1
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Per-instance memo of compiled regular expressions keyed by source.
#[derive(Debug)]
pub struct PatternCache {
    /// Maximum memoized entries before the memo is cleared.
    capacity: usize,
    /// Source text to compile result.
    compiled: Mutex<HashMap<String, Result<Regex, regex::Error>>>,
}

impl PatternCache {
    /// Creates an empty cache holding at most `capacity` patterns.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            compiled: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the compiled form of `source`, compiling it on a miss.
    ///
    /// # Errors
    ///
    /// Returns the (memoized) [`regex::Error`] when `source` is invalid.
    pub fn compile(&self, source: &str) -> Result<Regex, regex::Error> {
        let mut compiled = self.compiled.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = compiled.get(source) {
            return existing.clone();
        }
        if compiled.len() >= self.capacity {
            compiled.clear();
        }
        let result = Regex::new(source);
        compiled.insert(source.to_string(), result.clone());
        result
    }

    /// Number of memoized patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.compiled.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when nothing is memoized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_CACHE_CAPACITY)
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

    use super::PatternCache;
    use super::anchored;

    #[test]
    fn anchors_are_added_independently() {
        assert_eq!(anchored("[0-9]+"), "^(?:[0-9]+)$");
        assert_eq!(anchored("^[0-9]+"), "^(?:[0-9]+)$");
        assert_eq!(anchored("[0-9]+$"), "^(?:[0-9]+)$");
        assert_eq!(anchored("^a|b$"), "^(?:a|b)$");
        assert_eq!(anchored(r"cost\$"), r"^(?:cost\$)$");
    }

    #[test]
    fn compiled_patterns_and_failures_are_memoized() {
        let cache = PatternCache::new(2);
        assert!(cache.compile("a+").unwrap().is_match("caab"));
        assert!(cache.compile("(").is_err());
        assert!(cache.compile("(").is_err());
        assert_eq!(cache.len(), 2);
        assert!(cache.compile("b").is_ok());
        assert_eq!(cache.len(), 1);
    }
}
