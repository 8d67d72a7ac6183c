// crates/formwork-core/src/cache_key.rs
// ============================================================================
// Module: Cache Keys
// Description: Deterministic serialization of structured data into keys.
// Purpose: Turn conditions, requests and parameters into stable lookup keys.
// Dependencies: serde, serde_jcs, serde_json, sha2
// ============================================================================

//! ## Overview
//! Keys are RFC 8785 (JCS) canonical JSON: object members are sorted
//! recursively and arrays keep their order, so structurally equal values
//! always produce the same key regardless of property order. Absent values
//! (`undefined`) are encoded with a sentinel that can never collide with
//! canonical JSON, keeping `undefined` and `null` distinct.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while building cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheKeyError {
    /// Canonicalization failed.
    #[error("failed to canonicalize cache key: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Key emitted for absent values.
pub const UNDEFINED_KEY: &str = "~undefined";

/// Returns the canonical key for a serializable value.
///
/// # Errors
///
/// Returns [`CacheKeyError::Canonicalization`] when serialization fails.
pub fn cache_key<T: Serialize + ?Sized>(value: &T) -> Result<String, CacheKeyError> {
    serde_jcs::to_string(value).map_err(|err| CacheKeyError::Canonicalization(err.to_string()))
}

/// Returns the canonical key for a possibly absent JSON value.
#[must_use]
pub fn value_key(value: Option<&Value>) -> String {
    // JSON values built by serde_json always canonicalize.
    value.map_or_else(
        || UNDEFINED_KEY.to_string(),
        |value| cache_key(value).unwrap_or_else(|_| value.to_string()),
    )
}

/// Returns a short SHA-256 fingerprint of a key, used to label diagnostic sites.
#[must_use]
pub fn fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut out = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
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

    use super::cache_key;
    use super::fingerprint;
    use super::value_key;

    #[test]
    fn key_order_is_irrelevant() {
        let left = cache_key(&json!({"a": 1, "b": {"y": [1, 2], "x": null}})).unwrap();
        let right = cache_key(&json!({"b": {"x": null, "y": [1, 2]}, "a": 1})).unwrap();
        assert_eq!(left, right);
        assert_eq!(left, r#"{"a":1,"b":{"x":null,"y":[1,2]}}"#);
    }

    #[test]
    fn array_order_matters() {
        assert_ne!(cache_key(&json!([1, 2])).unwrap(), cache_key(&json!([2, 1])).unwrap());
    }

    #[test]
    fn undefined_differs_from_null() {
        assert_ne!(value_key(None), value_key(Some(&json!(null))));
        assert_eq!(value_key(Some(&json!(null))), "null");
    }

    #[test]
    fn fingerprints_are_stable_and_short() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_eq!(fingerprint("abc").len(), 16);
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }
}
