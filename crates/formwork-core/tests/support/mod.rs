// crates/formwork-core/tests/support/mod.rs
// ============================================================================
// Module: Test Support
// Description: Shared result helpers and fakes for core integration tests.
// ============================================================================
//! ## Overview
//! Shared test helpers for consistent Result-based assertions.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::error::Error;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use formwork_core::HttpRequest;
use formwork_core::Transport;
use formwork_core::TransportError;
use serde_json::Value;

// ========================================================================
// Test Result Helpers
// ========================================================================

/// Standard result type used across core integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// Lightweight error type for test assertions.
#[derive(Debug)]
struct TestError {
    /// Human-readable failure message.
    message: String,
}

impl fmt::Display for TestError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.message)
    }
}

impl Error for TestError {}

/// Returns an error when a test condition fails.
///
/// # Errors
/// Returns a `TestError` when the condition is false.
pub fn ensure(condition: bool, message: impl Into<String>) -> TestResult {
    if condition {
        Ok(())
    } else {
        Err(Box::new(TestError {
            message: message.into(),
        }))
    }
}

// ========================================================================
// Fake Transport
// ========================================================================

/// Transport answering every request with a fixed outcome after a delay.
pub struct ScriptedTransport {
    /// Outcome returned for every request.
    outcome: Result<Value, TransportError>,
    /// Simulated latency.
    delay: Duration,
    /// Number of requests performed.
    calls: AtomicUsize,
    /// Requests seen, in order.
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    /// Creates a transport that answers with `response`.
    pub fn responding(response: Value) -> Self {
        Self::with_outcome(Ok(response))
    }

    /// Creates a transport that fails every request.
    pub fn failing() -> Self {
        Self::with_outcome(Err(TransportError::Network("connection refused".to_string())))
    }

    /// Creates a transport with an explicit outcome.
    pub fn with_outcome(outcome: Result<Value, TransportError>) -> Self {
        Self {
            outcome,
            delay: Duration::from_millis(10),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of requests performed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the requests seen so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform_request(&self, request: &HttpRequest) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.delay).await;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}
