// crates/formwork-core/src/lib.rs
// ============================================================================
// Module: Formwork Core
// Description: Evaluation core for declarative form logic.
// Purpose: Compile conditions, validators, derivations and schemas into
//          stable, per-form-cached functions.
// Dependencies: async-trait, formwork-expr, regex, serde, serde_jcs,
//               serde_json, sha2, thiserror, tokio
// ============================================================================

//! ## Overview
//! Formwork turns plain-data form descriptions into functions of field
//! state. Conditions become logic functions, validator descriptions become
//! prepared validators, and schemas flatten onto target paths. Every cache
//! lives in a [`FormRuntime`], the cache context of one form instance.
//! Invariants:
//! - Logic, validation and derivation never fail at evaluation time; faults
//!   become fallback values plus [`Diagnostic`] records.
//! - Configuration defects are reported at setup through typed errors.
//! - Async and remote lookups never block: the current published value is
//!   returned and updates arrive through [`FormRuntime::resolution_updates`].
//! - Validators read untracked snapshots; cross-field validators run in the
//!   tree-level pass only.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache_key;
pub mod clock;
pub mod comparator;
pub mod condition;
pub mod context;
pub mod derivation;
pub mod diagnostics;
pub mod evaluator;
pub mod field;
pub mod form;
pub mod logic;
pub mod path;
pub mod pattern;
pub mod reactive;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod schema;
pub mod transport;
pub mod ttl_cache;
pub mod validator;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache_key::CacheKeyError;
pub use cache_key::cache_key;
pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::MonotonicClock;
pub use condition::AsyncCondition;
pub use condition::Condition;
pub use condition::ConditionShapeError;
pub use condition::FieldReferences;
pub use condition::Operator;
pub use condition::RemoteCondition;
pub use context::EvaluationContext;
pub use context::EvaluationServices;
pub use derivation::Derivation;
pub use derivation::DerivationFn;
pub use diagnostics::Diagnostic;
pub use diagnostics::DiagnosticCode;
pub use diagnostics::DiagnosticLevel;
pub use diagnostics::DiagnosticSink;
pub use diagnostics::Diagnostics;
pub use diagnostics::FileDiagnosticSink;
pub use diagnostics::MemoryDiagnosticSink;
pub use diagnostics::NoopDiagnosticSink;
pub use diagnostics::StderrDiagnosticSink;
pub use evaluator::evaluate_condition;
pub use field::FieldState;
pub use field::ReadMode;
pub use field::SnapshotField;
pub use form::FieldDefinition;
pub use form::FieldLogicState;
pub use form::FormDefinition;
pub use form::FormEngine;
pub use form::LogicConfig;
pub use form::LogicKind;
pub use form::ValidationReport;
pub use logic::LogicFn;
pub use pattern::PatternCache;
pub use reactive::Derived;
pub use reactive::FieldHandle;
pub use reactive::FormModel;
pub use registry::AsyncConditionFunction;
pub use registry::AsyncValidator;
pub use registry::FunctionError;
pub use registry::FunctionRegistry;
pub use registry::RegistryError;
pub use registry::UnknownFunctionError;
pub use resolver::DEFAULT_DEBOUNCE_MS;
pub use resolver::ResolverSettings;
pub use runtime::CacheStats;
pub use runtime::FormRuntime;
pub use runtime::FormRuntimeBuilder;
pub use runtime::RuntimeSettings;
pub use schema::ApplyStrategy;
pub use schema::SchemaApplication;
pub use schema::SchemaDefinition;
pub use schema::SchemaRef;
pub use schema::SchemaRegistry;
pub use transport::HttpMethod;
pub use transport::HttpRequest;
pub use transport::RequestSpec;
pub use transport::Transport;
pub use transport::TransportError;
pub use ttl_cache::HttpConditionCache;
pub use validator::OnError;
pub use validator::SetupError;
pub use validator::ValidationError;
pub use validator::ValidatorConfig;
pub use validator::ValidatorRule;
pub use validator::ValidatorValue;
