// crates/formwork-core/src/ttl_cache.rs
// ============================================================================
// Module: TTL Response Cache
// Description: Expiring boolean cache for resolved remote and async lookups.
// Purpose: Short-circuit repeated lookups of identical resolved requests.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Entries are `(value, expires_at)` pairs keyed by the canonical key of the
//! resolved request or parameters. Expiry is lazy: an expired entry is
//! removed by the read that observes it. A lifetime of zero stores nothing,
//! which disables caching for that lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::clock::Clock;

/// Cached lookup result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheEntry {
    /// Resolved boolean.
    value: bool,
    /// Expiry time in clock milliseconds.
    expires_at: u64,
}

/// Expiring boolean cache shared by the async/remote sites of one form.
///
/// # Invariants
/// - `get` never returns an entry whose expiry time has been reached.
pub struct HttpConditionCache {
    /// Entries by key.
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl HttpConditionCache {
    /// Creates an empty cache reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Returns the cached value, evicting it when expired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<bool> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = *entries.get(key)?;
        if now >= entry.expires_at {
            entries.remove(key);
            return None;
        }
        Some(entry.value)
    }

    /// Stores a value for `ttl_ms` milliseconds. A zero lifetime stores nothing.
    pub fn set(&self, key: impl Into<String>, value: bool, ttl_ms: u64) {
        if ttl_ms == 0 {
            return;
        }
        let expires_at = self.clock.now_ms().saturating_add(ttl_ms);
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).insert(
            key.into(),
            CacheEntry {
                value,
                expires_at,
            },
        );
    }

    /// Removes an entry.
    pub fn remove(&self, key: &str) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
    }

    /// Returns the number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl std::fmt::Debug for HttpConditionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConditionCache").field("entries", &self.len()).finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
