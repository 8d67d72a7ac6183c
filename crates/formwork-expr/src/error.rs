// crates/formwork-expr/src/error.rs
// ============================================================================
// Module: Expression Errors
// Description: Structured diagnostics for expression parsing and evaluation.
// Purpose: Separate syntax faults, limit violations and runtime faults.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Syntax-class errors are produced while compiling an expression and are
//! cached alongside successful programs. Runtime errors come from evaluation
//! (calling a method on `undefined`, unknown functions, rebinding a name).

use thiserror::Error;

// ============================================================================
// SECTION: Error Type
// ============================================================================

/// Errors raised by the expression language.
///
/// # Invariants
/// - Positions are byte offsets into the original expression text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// Input was empty or whitespace only.
    #[error("expression is empty")]
    Empty,
    /// Input exceeded the configured size limit.
    #[error("expression exceeds size limit: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual input length in bytes.
        actual_bytes: usize,
    },
    /// Input exceeded the configured nesting depth.
    #[error("expression nesting exceeds limit: depth {actual_depth} (max {max_depth}) at {position}")]
    TooDeep {
        /// Maximum allowed nesting depth.
        max_depth: usize,
        /// Depth reached when the error occurred.
        actual_depth: usize,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Malformed expression text.
    #[error("syntax error at {position}: {message}")]
    Syntax {
        /// Description of the fault.
        message: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Evaluation failed.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ExpressionError {
    /// Creates a syntax error at the given position.
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    /// Creates a runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Returns true for errors raised while compiling (syntax and limits).
    #[must_use]
    pub const fn is_syntax(&self) -> bool {
        !matches!(self, Self::Runtime(_))
    }
}

/// Result alias for expression operations.
pub type ExpressionResult<T> = Result<T, ExpressionError>;
