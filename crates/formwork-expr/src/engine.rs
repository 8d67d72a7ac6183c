// crates/formwork-expr/src/engine.rs
// ============================================================================
// Module: Expression Engine
// Description: Limit-aware compiler with a per-instance program cache.
// Purpose: Compile each distinct expression once and evaluate it many times.
// Dependencies: crate::{ast, error, eval, parser, value}
// ============================================================================

//! ## Overview
//! [`ExpressionEngine`] owns the parse limits and a memo of compiled
//! programs keyed by source text. Compile failures are memoized too, so a
//! broken expression is parsed once no matter how often it is evaluated.
//! Engines are owned by a form instance; two forms never share a memo.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::ast::Program;
use crate::error::ExpressionError;
use crate::error::ExpressionResult;
use crate::eval::Scope;
use crate::eval::evaluate;
use crate::parser::DEFAULT_MAX_EXPRESSION_BYTES;
use crate::parser::DEFAULT_MAX_NESTING;
use crate::parser::ParseLimits;
use crate::parser::parse;
use crate::value::ExprValue;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Default number of compiled programs kept per engine.
pub const DEFAULT_AST_CACHE_CAPACITY: usize = 1024;

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Parser limits.
    pub limits: ParseLimits,
    /// Maximum memoized programs; the memo is cleared when full.
    pub cache_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            limits: ParseLimits {
                max_bytes: DEFAULT_MAX_EXPRESSION_BYTES,
                max_nesting: DEFAULT_MAX_NESTING,
            },
            cache_capacity: DEFAULT_AST_CACHE_CAPACITY,
        }
    }
}

/// Snapshot of memo counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramCacheStats {
    /// Entries currently memoized (including memoized failures).
    pub entries: usize,
    /// Lookups answered from the memo.
    pub hits: u64,
    /// Lookups that required parsing.
    pub misses: u64,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Memoized compiled program or compile failure.
type Compiled = Result<Arc<Program>, ExpressionError>;

/// Expression compiler and evaluator.
///
/// # Invariants
/// - Equal source text always yields the same `Arc<Program>` while memoized.
/// - The memo never holds more than `cache_capacity` entries.
#[derive(Debug, Default)]
pub struct ExpressionEngine {
    /// Engine settings.
    settings: EngineSettings,
    /// Source text to compiled program.
    memo: Mutex<HashMap<String, Compiled>>,
    /// Memo hits.
    hits: AtomicU64,
    /// Memo misses.
    misses: AtomicU64,
}

impl ExpressionEngine {
    /// Creates an engine with the given settings.
    #[must_use]
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            memo: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the engine settings.
    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Compiles source text, reusing a memoized result when present.
    ///
    /// # Errors
    ///
    /// Returns the (possibly memoized) syntax or limit error.
    pub fn compile(&self, source: &str) -> ExpressionResult<Arc<Program>> {
        let Ok(mut memo) = self.memo.lock() else {
            // Poisoned memo: compile without caching.
            self.misses.fetch_add(1, Ordering::Relaxed);
            return parse(source, self.settings.limits).map(Arc::new);
        };
        if let Some(entry) = memo.get(source) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return entry.clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = parse(source, self.settings.limits).map(Arc::new);
        if memo.len() >= self.settings.cache_capacity {
            memo.clear();
        }
        if self.settings.cache_capacity > 0 {
            memo.insert(source.to_string(), compiled.clone());
        }
        drop(memo);
        compiled
    }

    /// Compiles (or reuses) and evaluates source text against a scope.
    ///
    /// # Errors
    ///
    /// Returns compile errors or [`ExpressionError::Runtime`].
    pub fn evaluate(&self, source: &str, scope: &dyn Scope) -> ExpressionResult<ExprValue> {
        let program = self.compile(source)?;
        evaluate(&program, scope)
    }

    /// Returns memo counters.
    #[must_use]
    pub fn stats(&self) -> ProgramCacheStats {
        let entries = self.memo.lock().map_or(0, |memo| memo.len());
        ProgramCacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drops every memoized program.
    pub fn clear(&self) {
        if let Ok(mut memo) = self.memo.lock() {
            memo.clear();
        }
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

    use std::sync::Arc;

    use super::EngineSettings;
    use super::ExpressionEngine;
    use crate::eval::MapScope;
    use crate::value::ExprValue;

    #[test]
    fn memoizes_programs_and_failures() {
        let engine = ExpressionEngine::new(EngineSettings::default());
        let first = engine.compile("a + 1").unwrap();
        let second = engine.compile("a + 1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(engine.compile("a +").is_err());
        assert!(engine.compile("a +").is_err());

        let stats = engine.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn clears_memo_when_full() {
        let engine = ExpressionEngine::new(EngineSettings {
            cache_capacity: 2,
            ..EngineSettings::default()
        });
        engine.compile("1").unwrap();
        engine.compile("2").unwrap();
        engine.compile("3").unwrap();
        assert_eq!(engine.stats().entries, 1);
    }

    #[test]
    fn evaluates_through_memo() {
        let engine = ExpressionEngine::new(EngineSettings::default());
        let scope = MapScope::new().with("a", 2.0);
        let value = engine.evaluate("a * 21", &scope).unwrap();
        assert_eq!(value, ExprValue::Number(42.0));
    }
}
