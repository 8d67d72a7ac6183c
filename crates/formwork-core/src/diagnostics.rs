// crates/formwork-core/src/diagnostics.rs
// ============================================================================
// Module: Diagnostics
// Description: Structured diagnostic records and sinks.
// Purpose: Report downgraded runtime faults without a global logger.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Condition, logic and validator evaluation never propagate faults; they
//! fall back to a safe value and record a [`Diagnostic`]. Records are JSON
//! lines routed through a [`DiagnosticSink`], so embedders can forward them
//! to their own logging pipeline. Each form instance owns one
//! [`Diagnostics`] hub, which also remembers one-time-per-site warnings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Codes
// ============================================================================

/// Stable diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    /// Expression failed to compile or evaluate.
    ExpressionFailed,
    /// Expression produced a non-boolean value that was coerced.
    NonBooleanResult,
    /// Named custom function is not registered.
    CustomFunctionMissing,
    /// Custom function returned an error.
    CustomFunctionFailed,
    /// Async or remote resolution failed.
    ResolutionFailed,
    /// Schema reference could not be resolved.
    SchemaNotFound,
    /// Schema applications nested past the depth limit.
    SchemaTooDeep,
    /// Validator faulted while running.
    ValidatorFailed,
    /// No async runtime was available for background resolution.
    RuntimeUnavailable,
    /// Validator was moved to tree-level validation.
    CrossFieldHoisted,
}

impl DiagnosticCode {
    /// Returns the stable snake_case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExpressionFailed => "expression_failed",
            Self::NonBooleanResult => "non_boolean_result",
            Self::CustomFunctionMissing => "custom_function_missing",
            Self::CustomFunctionFailed => "custom_function_failed",
            Self::ResolutionFailed => "resolution_failed",
            Self::SchemaNotFound => "schema_not_found",
            Self::SchemaTooDeep => "schema_too_deep",
            Self::ValidatorFailed => "validator_failed",
            Self::RuntimeUnavailable => "runtime_unavailable",
            Self::CrossFieldHoisted => "cross_field_hoisted",
        }
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    /// Informational record.
    Info,
    /// Recoverable problem.
    Warn,
    /// Fault downgraded to a fallback value.
    Error,
}

// ============================================================================
// SECTION: Record
// ============================================================================

/// Diagnostic record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Severity.
    pub level: DiagnosticLevel,
    /// Stable code.
    pub code: DiagnosticCode,
    /// Site label (field path, expression fingerprint, schema name).
    pub site: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl Diagnostic {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        level: DiagnosticLevel,
        code: DiagnosticCode,
        site: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event: "formwork_diagnostic",
            timestamp_ms: now_millis(),
            level,
            code,
            site: site.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Milliseconds since the Unix epoch.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |duration| duration.as_millis())
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for diagnostic records.
pub trait DiagnosticSink: Send + Sync {
    /// Records a diagnostic.
    fn record(&self, diagnostic: &Diagnostic);
}

/// Sink that logs JSON lines to stderr.
pub struct StderrDiagnosticSink;

impl DiagnosticSink for StderrDiagnosticSink {
    fn record(&self, diagnostic: &Diagnostic) {
        if let Ok(payload) = serde_json::to_string(diagnostic) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that logs JSON lines to a file.
pub struct FileDiagnosticSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileDiagnosticSink {
    /// Opens the diagnostics file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl DiagnosticSink for FileDiagnosticSink {
    fn record(&self, diagnostic: &Diagnostic) {
        if let Ok(payload) = serde_json::to_string(diagnostic)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op sink.
pub struct NoopDiagnosticSink;

impl DiagnosticSink for NoopDiagnosticSink {
    fn record(&self, _diagnostic: &Diagnostic) {}
}

/// Sink that keeps records in memory.
#[derive(Default)]
pub struct MemoryDiagnosticSink {
    /// Recorded diagnostics in arrival order.
    records: Mutex<Vec<Diagnostic>>,
}

impl MemoryDiagnosticSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded diagnostics.
    #[must_use]
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.lock().map(|records| records.clone()).unwrap_or_default()
    }

    /// Returns the recorded codes in arrival order.
    #[must_use]
    pub fn codes(&self) -> Vec<DiagnosticCode> {
        self.records().iter().map(|record| record.code).collect()
    }
}

impl DiagnosticSink for MemoryDiagnosticSink {
    fn record(&self, diagnostic: &Diagnostic) {
        if let Ok(mut records) = self.records.lock() {
            records.push(diagnostic.clone());
        }
    }
}

// ============================================================================
// SECTION: Hub
// ============================================================================

/// Per-form diagnostics hub.
///
/// # Invariants
/// - `warn_once` records at most one diagnostic per `(code, site)` pair.
#[derive(Clone)]
pub struct Diagnostics {
    /// Destination sink.
    sink: Arc<dyn DiagnosticSink>,
    /// `(code, site)` pairs already reported by `warn_once`.
    reported: Arc<Mutex<HashSet<(DiagnosticCode, String)>>>,
}

impl Diagnostics {
    /// Creates a hub over a sink.
    #[must_use]
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            reported: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Creates a hub that discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopDiagnosticSink))
    }

    /// Records a prepared diagnostic.
    pub fn emit(&self, diagnostic: &Diagnostic) {
        self.sink.record(diagnostic);
    }

    /// Records an informational diagnostic.
    pub fn info(&self, code: DiagnosticCode, site: &str, message: impl Into<String>) {
        self.emit(&Diagnostic::new(DiagnosticLevel::Info, code, site, message));
    }

    /// Records a warning.
    pub fn warn(&self, code: DiagnosticCode, site: &str, message: impl Into<String>) {
        self.emit(&Diagnostic::new(DiagnosticLevel::Warn, code, site, message));
    }

    /// Records an error that was downgraded to a fallback.
    pub fn error(&self, code: DiagnosticCode, site: &str, message: impl Into<String>) {
        self.emit(&Diagnostic::new(DiagnosticLevel::Error, code, site, message));
    }

    /// Records a warning once per `(code, site)`.
    pub fn warn_once(&self, code: DiagnosticCode, site: &str, message: impl Into<String>) {
        let first = self
            .reported
            .lock()
            .map(|mut reported| reported.insert((code, site.to_string())))
            .unwrap_or(true);
        if first {
            self.warn(code, site, message);
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::noop()
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
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

    use super::DiagnosticCode;
    use super::Diagnostics;
    use super::MemoryDiagnosticSink;

    #[test]
    fn warn_once_deduplicates_per_site() {
        let sink = Arc::new(MemoryDiagnosticSink::new());
        let diagnostics = Diagnostics::new(sink.clone());
        diagnostics.warn_once(DiagnosticCode::NonBooleanResult, "a", "coerced");
        diagnostics.warn_once(DiagnosticCode::NonBooleanResult, "a", "coerced");
        diagnostics.warn_once(DiagnosticCode::NonBooleanResult, "b", "coerced");
        assert_eq!(sink.records().len(), 2);
    }

    #[test]
    fn records_serialize_as_json_lines() {
        let sink = Arc::new(MemoryDiagnosticSink::new());
        let diagnostics = Diagnostics::new(sink.clone());
        diagnostics.error(DiagnosticCode::ResolutionFailed, "email", "timeout");
        let payload = serde_json::to_value(&sink.records()[0]).unwrap();
        assert_eq!(payload["code"], "resolution_failed");
        assert_eq!(payload["level"], "error");
        assert_eq!(payload["site"], "email");
        assert!(payload.get("detail").is_none());
    }
}
