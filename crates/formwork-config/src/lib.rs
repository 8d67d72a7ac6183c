// crates/formwork-config/src/lib.rs
// ============================================================================
// Module: Formwork Config Library
// Description: Configuration model and loader for formwork hosts.
// Purpose: Single source of truth for formwork.toml semantics.
// Dependencies: formwork-core, formwork-expr, formwork-providers, serde, toml
// ============================================================================

//! ## Overview
//! `formwork-config` loads `formwork.toml` with strict, fail-closed
//! validation and converts it into the settings the core and the HTTP
//! transport consume. The core itself never reads files or environment
//! variables.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
