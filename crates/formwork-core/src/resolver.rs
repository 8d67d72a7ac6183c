// crates/formwork-core/src/resolver.rs
// ============================================================================
// Module: Async and Remote Resolver
// Description: Per-occurrence resolution pipeline for async conditions.
// Purpose: Turn out-of-band lookups into a synchronous, never-blocking read.
// Dependencies: formwork-expr, serde_json, tokio
// ============================================================================

//! ## Overview
//! Each field occurrence evaluating an async or remote condition owns a
//! slot: a trigger channel carrying the latest resolved request and
//! a result channel carrying the published boolean. A background task per
//! slot runs the pipeline:
//!
//! trigger, debounce, distinct, switch-to-latest lookup, map to boolean,
//! write through to the TTL cache, publish.
//!
//! The synchronous side never waits. It resolves the request from the field
//! state, returns a TTL cache hit directly, pushes a trigger only when the
//! request snapshot changed, and returns the currently published value
//! (initially the pending value).
//!
//! Superseded lookups are dropped, so their results are never published.
//! Failures publish the pending value and record a diagnostic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;
use std::time::Duration;

use formwork_expr::ExprValue;
use serde_json::Map;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::time::sleep_until;

use crate::cache_key::cache_key;
use crate::cache_key::fingerprint;
use crate::cache_key::value_key;
use crate::condition::AsyncCondition;
use crate::condition::Condition;
use crate::condition::RemoteCondition;
use crate::context::EvaluationContext;
use crate::diagnostics::DiagnosticCode;
use crate::evaluator::coerce_boolean;
use crate::evaluator::evaluate_condition;
use crate::field::FieldState;
use crate::field::ReadMode;
use crate::field::SnapshotField;
use crate::registry::AsyncConditionFunction;
use crate::runtime::RuntimeInner;
use crate::runtime::SlotKey;
use crate::transport::HttpRequest;
use crate::transport::RequestSpec;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Default debounce window for async and remote conditions.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Defaults applied when a condition leaves a member unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Debounce window in milliseconds.
    pub default_debounce_ms: u64,
    /// Result cache lifetime in milliseconds (`0` disables caching).
    pub default_cache_duration_ms: u64,
    /// Value published before resolution completes.
    pub default_pending_value: bool,
}

impl ResolverSettings {
    /// Built-in defaults.
    pub const DEFAULT: Self = Self {
        default_debounce_ms: DEFAULT_DEBOUNCE_MS,
        default_cache_duration_ms: 0,
        default_pending_value: false,
    };
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Evaluates a parameter expression to JSON; faults become `null`.
fn resolve_param(expression: &str, context: &EvaluationContext<'_>) -> Value {
    match context.evaluate(expression) {
        Ok(value) => value.to_json().unwrap_or(Value::Null),
        Err(err) => {
            context.services().diagnostics.error(
                DiagnosticCode::ExpressionFailed,
                &context.path(),
                format!("parameter expression `{expression}` failed: {err}"),
            );
            Value::Null
        }
    }
}

/// Evaluates named parameter expressions into a JSON object.
#[must_use]
pub fn resolve_params(params: &BTreeMap<String, String>, context: &EvaluationContext<'_>) -> Value {
    let object: Map<String, Value> = params
        .iter()
        .map(|(name, expression)| (name.clone(), resolve_param(expression, context)))
        .collect();
    Value::Object(object)
}

/// Resolves a request description against a context.
///
/// Query parameters that evaluate to `null` or `undefined` are omitted.
#[must_use]
pub fn resolve_request(spec: &RequestSpec, context: &EvaluationContext<'_>) -> HttpRequest {
    let mut query = BTreeMap::new();
    for (name, expression) in &spec.params {
        match resolve_param(expression, context) {
            Value::Null => {}
            Value::String(text) => {
                query.insert(name.clone(), text);
            }
            other => {
                query.insert(name.clone(), ExprValue::from_json(&other).to_display_string());
            }
        }
    }
    let body = if spec.body.is_empty() { None } else { Some(resolve_params(&spec.body, context)) };
    HttpRequest {
        method: spec.method,
        url: spec.url.clone(),
        query,
        body,
        headers: spec.headers.clone(),
    }
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Resolved lookup, ready to run.
enum Lookup {
    /// Network request.
    Remote {
        /// Resolved request.
        request: HttpRequest,
        /// Optional response mapping expression.
        response_expression: Option<String>,
    },
    /// Registered async function call.
    Async {
        /// Function implementation.
        function: Arc<dyn AsyncConditionFunction>,
        /// Field value at trigger time.
        value: Option<Value>,
        /// Resolved parameters.
        params: Value,
    },
}

/// One triggered resolution.
struct Dispatch {
    /// Canonical snapshot of the resolved lookup; also the TTL cache key.
    snapshot: String,
    /// Work to perform.
    lookup: Lookup,
    /// Field snapshot used to map the response.
    field: SnapshotField,
}

/// Per-slot pipeline parameters.
#[derive(Debug, Clone)]
struct SlotSettings {
    /// Debounce window.
    debounce: Duration,
    /// Fallback published on failure.
    pending_value: bool,
    /// TTL for successful results.
    cache_duration_ms: u64,
    /// Diagnostic site label.
    site: String,
}

/// Resolution state of one field occurrence.
///
/// # Invariants
/// - Only the slot's own pipeline task writes `result`.
/// - `last_snapshot` is the snapshot most recently pushed to `trigger`.
pub(crate) struct AsyncSlot {
    /// Snapshot most recently pushed to the trigger channel.
    last_snapshot: Mutex<Option<String>>,
    /// Trigger cell.
    trigger: watch::Sender<Option<Arc<Dispatch>>>,
    /// Published result cell.
    result: watch::Receiver<bool>,
}

impl AsyncSlot {
    /// Returns the currently published value.
    #[must_use]
    pub(crate) fn current(&self) -> bool {
        *self.result.borrow()
    }
}

/// Request half of a resolution, computed synchronously.
struct Prepared {
    /// Canonical snapshot.
    snapshot: String,
    /// Lookup to run when the snapshot changed.
    lookup: Lookup,
    /// Pipeline parameters.
    settings: SlotSettings,
}

/// Resolves the lookup described by an async or remote condition.
fn prepare(
    inner: &RuntimeInner,
    condition: &Condition,
    context: &EvaluationContext<'_>,
) -> Option<Prepared> {
    let defaults = inner.services.resolver;
    let site = context.path();
    match condition {
        Condition::Remote(RemoteCondition {
            request,
            response_expression,
            pending_value,
            cache_duration_ms,
            debounce_ms,
        }) => {
            let request = resolve_request(request, context);
            let request_key = cache_key(&request).ok()?;
            let mapping = response_expression.as_deref().map(fingerprint).unwrap_or_default();
            Some(Prepared {
                snapshot: format!("remote:{mapping}:{request_key}"),
                lookup: Lookup::Remote {
                    request,
                    response_expression: response_expression.clone(),
                },
                settings: SlotSettings {
                    debounce: Duration::from_millis(
                        debounce_ms.unwrap_or(defaults.default_debounce_ms),
                    ),
                    pending_value: pending_value.unwrap_or(defaults.default_pending_value),
                    cache_duration_ms: cache_duration_ms
                        .unwrap_or(defaults.default_cache_duration_ms),
                    site,
                },
            })
        }
        Condition::Async(AsyncCondition {
            function_name,
            params,
            pending_value,
            cache_duration_ms,
            debounce_ms,
        }) => {
            let pending = pending_value.unwrap_or(defaults.default_pending_value);
            let Some(function) = inner.services.functions.async_condition(function_name) else {
                inner.services.diagnostics.warn_once(
                    DiagnosticCode::CustomFunctionMissing,
                    &site,
                    format!("async function `{function_name}` is not registered"),
                );
                return None;
            };
            let value = context.current_value().cloned();
            let params = resolve_params(params, context);
            let snapshot = format!(
                "async:{function_name}:{}:{}",
                value_key(value.as_ref()),
                cache_key(&params).ok()?
            );
            Some(Prepared {
                snapshot,
                lookup: Lookup::Async {
                    function,
                    value,
                    params,
                },
                settings: SlotSettings {
                    debounce: Duration::from_millis(
                        debounce_ms.unwrap_or(defaults.default_debounce_ms),
                    ),
                    pending_value: pending,
                    cache_duration_ms: cache_duration_ms
                        .unwrap_or(defaults.default_cache_duration_ms),
                    site,
                },
            })
        }
        _ => None,
    }
}

/// Returns the pending value of an async or remote condition.
pub(crate) fn pending_of(inner: &RuntimeInner, condition: &Condition) -> bool {
    let explicit = match condition {
        Condition::Remote(remote) => remote.pending_value,
        Condition::Async(condition) => condition.pending_value,
        _ => None,
    };
    explicit.unwrap_or(inner.services.resolver.default_pending_value)
}

// ============================================================================
// SECTION: Synchronous Entry
// ============================================================================

/// Returns the current value of an async or remote condition for one field
/// occurrence, scheduling a lookup when the resolved request changed.
pub(crate) fn resolve_logic(
    inner: &Arc<RuntimeInner>,
    logic_key: &str,
    condition: &Condition,
    state: &dyn FieldState,
) -> bool {
    let context = EvaluationContext::tracked(&inner.services, state);
    let Some(prepared) = prepare(inner, condition, &context) else {
        return pending_of(inner, condition);
    };
    if let Some(hit) = inner.ttl.get(&prepared.snapshot) {
        return hit;
    }
    let slot_key: SlotKey = (logic_key.to_string(), state.path_keys());
    let Some(slot) = slot_for(inner, slot_key, &prepared.settings) else {
        return prepared.settings.pending_value;
    };
    let changed = {
        let mut last = slot.last_snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_deref() == Some(prepared.snapshot.as_str()) {
            false
        } else {
            *last = Some(prepared.snapshot.clone());
            true
        }
    };
    if changed {
        let field = SnapshotField::new(state.root_value(ReadMode::Untracked), state.path());
        let _ = slot.trigger.send_replace(Some(Arc::new(Dispatch {
            snapshot: prepared.snapshot,
            lookup: prepared.lookup,
            field,
        })));
    }
    slot.current()
}

/// Returns the slot for a field occurrence, starting its pipeline on first use.
fn slot_for(
    inner: &Arc<RuntimeInner>,
    key: SlotKey,
    settings: &SlotSettings,
) -> Option<Arc<AsyncSlot>> {
    let mut slots = inner.async_slots.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(slot) = slots.get(&key) {
        return Some(Arc::clone(slot));
    }
    let Ok(handle) = Handle::try_current() else {
        drop(slots);
        inner.services.diagnostics.warn_once(
            DiagnosticCode::RuntimeUnavailable,
            &settings.site,
            "no async runtime available; publishing the pending value",
        );
        return None;
    };
    let (trigger_tx, trigger_rx) = watch::channel(None);
    let (result_tx, result_rx) = watch::channel(settings.pending_value);
    handle.spawn(run_pipeline(Arc::downgrade(inner), trigger_rx, result_tx, settings.clone()));
    let slot = Arc::new(AsyncSlot {
        last_snapshot: Mutex::new(None),
        trigger: trigger_tx,
        result: result_rx,
    });
    slots.insert(key, Arc::clone(&slot));
    Some(slot)
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Completed lookup.
type Outcome = (Arc<Dispatch>, Result<bool, String>);

/// Boxed in-flight lookup.
type InFlight = Pin<Box<dyn Future<Output = Outcome> + Send>>;

/// Awaits the in-flight lookup, if any.
async fn next_outcome(in_flight: &mut Option<InFlight>) -> Option<Outcome> {
    match in_flight {
        Some(future) => Some(future.await),
        None => None,
    }
}

/// Slot pipeline: debounce, distinct, switch-to-latest, publish.
///
/// Ends when the slot (and with it the trigger sender) is dropped.
async fn run_pipeline(
    inner: Weak<RuntimeInner>,
    mut trigger: watch::Receiver<Option<Arc<Dispatch>>>,
    result: watch::Sender<bool>,
    settings: SlotSettings,
) {
    let mut deadline: Option<Instant> = None;
    let mut in_flight: Option<InFlight> = None;
    let mut published: Option<String> = None;
    loop {
        tokio::select! {
            changed = trigger.changed() => {
                if changed.is_err() {
                    return;
                }
                in_flight = None;
                deadline = Some(Instant::now() + settings.debounce);
            }
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                let latest = trigger.borrow_and_update().clone();
                if let Some(dispatch) = latest
                    && published.as_deref() != Some(dispatch.snapshot.as_str())
                {
                    in_flight = Some(Box::pin(perform(inner.clone(), dispatch)));
                }
            }
            Some((dispatch, outcome)) = next_outcome(&mut in_flight), if in_flight.is_some() => {
                in_flight = None;
                match outcome {
                    Ok(value) => {
                        if let Some(inner) = inner.upgrade() {
                            let ttl_ms = settings.cache_duration_ms;
                            inner.ttl.set(dispatch.snapshot.clone(), value, ttl_ms);
                            inner.notify_resolution();
                        }
                        published = Some(dispatch.snapshot.clone());
                        let _ = result.send_replace(value);
                    }
                    Err(message) => {
                        if let Some(inner) = inner.upgrade() {
                            inner.services.diagnostics.error(
                                DiagnosticCode::ResolutionFailed,
                                &settings.site,
                                message,
                            );
                            inner.notify_resolution();
                        }
                        published = None;
                        let _ = result.send_replace(settings.pending_value);
                    }
                }
            }
        }
    }
}

/// Runs one lookup and maps its raw result to a boolean.
async fn perform(inner: Weak<RuntimeInner>, dispatch: Arc<Dispatch>) -> Outcome {
    let raw = match &dispatch.lookup {
        Lookup::Remote {
            request, ..
        } => {
            let Some(transport) = inner.upgrade().map(|inner| Arc::clone(&inner.transport)) else {
                return (dispatch, Err("form runtime dropped".to_string()));
            };
            transport.perform_request(request).await.map_err(|err| err.to_string())
        }
        Lookup::Async {
            function,
            value,
            params,
        } => function.resolve(value.clone(), params.clone()).await.map_err(|err| err.to_string()),
    };
    let outcome = match raw {
        Ok(raw) => map_response(&inner, &dispatch, &raw),
        Err(message) => Err(message),
    };
    (dispatch, outcome)
}

/// Maps a raw lookup result to a boolean.
fn map_response(
    inner: &Weak<RuntimeInner>,
    dispatch: &Dispatch,
    raw: &Value,
) -> Result<bool, String> {
    let Lookup::Remote {
        response_expression: Some(code),
        ..
    } = &dispatch.lookup
    else {
        return Ok(ExprValue::from_json(raw).truthy());
    };
    let inner = inner.upgrade().ok_or_else(|| "form runtime dropped".to_string())?;
    let context = EvaluationContext::untracked(&inner.services, &dispatch.field)
        .with_binding("response", ExprValue::from_json(raw));
    let value = context.evaluate(code).map_err(|err| format!("response expression failed: {err}"))?;
    Ok(coerce_boolean(&value, code, &context))
}

// ============================================================================
// SECTION: Direct Resolution
// ============================================================================

/// Resolves an async or remote condition immediately, without debounce or
/// slot state. Other conditions are evaluated synchronously.
pub(crate) async fn resolve_now(
    inner: &Arc<RuntimeInner>,
    condition: &Condition,
    state: &dyn FieldState,
) -> bool {
    let prepared = {
        let context = EvaluationContext::untracked(&inner.services, state);
        if !condition.is_async() {
            return evaluate_condition(condition, &context);
        }
        prepare(inner, condition, &context)
    };
    let Some(prepared) = prepared else {
        return pending_of(inner, condition);
    };
    if let Some(hit) = inner.ttl.get(&prepared.snapshot) {
        return hit;
    }
    let dispatch = Arc::new(Dispatch {
        snapshot: prepared.snapshot,
        lookup: prepared.lookup,
        field: SnapshotField::new(state.root_value(ReadMode::Untracked), state.path()),
    });
    let (dispatch, outcome) = perform(Arc::downgrade(inner), dispatch).await;
    match outcome {
        Ok(value) => {
            inner.ttl.set(dispatch.snapshot.clone(), value, prepared.settings.cache_duration_ms);
            value
        }
        Err(message) => {
            let site = &prepared.settings.site;
            inner.services.diagnostics.error(DiagnosticCode::ResolutionFailed, site, message);
            prepared.settings.pending_value
        }
    }
}
