// crates/formwork-expr/src/lib.rs
// ============================================================================
// Module: Formwork Expressions
// Description: Restricted expression language for declarative forms.
// Purpose: Parse and evaluate form expressions without a host script engine.
// Dependencies: serde_json, smallvec, thiserror
// ============================================================================

//! ## Overview
//! This crate implements the expression language used by form conditions,
//! validators and derivations. Expressions are parsed into an immutable
//! [`Program`] once (see [`ExpressionEngine`]) and evaluated against a
//! host-provided [`Scope`].
//! Invariants:
//! - Evaluation is a pure function of the program and the scope.
//! - Expression input is untrusted; size, nesting and chain length are bounded.
//! - There is no access to globals beyond the fixed built-in library and what
//!   the scope exposes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod ast;
pub mod engine;
pub mod error;
pub mod eval;
mod lexer;
pub mod parser;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use ast::Program;
pub use ast::References;
pub use engine::DEFAULT_AST_CACHE_CAPACITY;
pub use engine::EngineSettings;
pub use engine::ExpressionEngine;
pub use engine::ProgramCacheStats;
pub use error::ExpressionError;
pub use error::ExpressionResult;
pub use eval::MapScope;
pub use eval::Scope;
pub use eval::evaluate;
pub use parser::DEFAULT_MAX_EXPRESSION_BYTES;
pub use parser::DEFAULT_MAX_NESTING;
pub use parser::ParseLimits;
pub use parser::parse;
pub use value::ExprValue;
