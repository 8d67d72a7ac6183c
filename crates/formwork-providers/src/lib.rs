// crates/formwork-providers/src/lib.rs
// ============================================================================
// Module: Formwork Providers
// Description: Concrete network transports for remote conditions.
// Purpose: Supply the `Transport` capability the core leaves injectable.
// Dependencies: formwork-core, reqwest, url
// ============================================================================

//! ## Overview
//! The core describes requests declaratively and never talks to the network.
//! This crate ships [`ReqwestTransport`], a bounded HTTP client implementing
//! [`formwork_core::Transport`].
//! Invariants:
//! - Cleartext HTTP is refused unless explicitly allowed.
//! - Redirects are never followed.
//! - Response bodies are bounded by a configured byte limit.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod http;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use http::HttpTransportConfig;
pub use http::ReqwestTransport;
