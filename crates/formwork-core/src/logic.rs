// crates/formwork-core/src/logic.rs
// ============================================================================
// Module: Logic Function Factory
// Description: Compilation of conditions into cached logic functions.
// Purpose: Give the host stable functions from field state to booleans.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! [`FormRuntime::compile_logic`] turns a condition into a [`LogicFn`]. The
//! cache key is the canonical serialization of the condition, so
//! structurally equal conditions (in any member order) return the same
//! `Arc`, and hosts can rely on function identity to avoid re-subscribing.
//!
//! - Synchronous conditions build a tracked context per call and delegate
//!   to the condition evaluator.
//! - Async and remote conditions delegate to the resolver.
//! - The debounced variant publishes a value only after it has been stable
//!   for the debounce window, and reads `false` until then.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::cache_key::cache_key;
use crate::condition::Condition;
use crate::condition::ConditionShapeError;
use crate::context::EvaluationContext;
use crate::diagnostics::DiagnosticCode;
use crate::evaluator::evaluate_condition;
use crate::field::FieldState;
use crate::resolver::pending_of;
use crate::resolver::resolve_logic;
use crate::resolver::resolve_now;
use crate::runtime::FormRuntime;
use crate::runtime::RuntimeInner;
use crate::runtime::SlotKey;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Compiled logic function.
pub type LogicFn = Arc<dyn Fn(&dyn FieldState) -> bool + Send + Sync>;

/// Debounce state of one field occurrence.
///
/// # Invariants
/// - `settled` only changes after `immediate` has been quiet for the window.
pub(crate) struct DebounceSlot {
    /// Latest computed value.
    immediate: watch::Sender<Option<bool>>,
    /// Debounced value.
    settled: watch::Receiver<bool>,
}

// ============================================================================
// SECTION: Factory
// ============================================================================

impl FormRuntime {
    /// Compiles a condition into a cached logic function.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionShapeError`] when an async or remote condition is
    /// nested inside a composite, or the condition cannot be keyed.
    pub fn compile_logic(&self, condition: &Condition) -> Result<LogicFn, ConditionShapeError> {
        condition.validate_shape()?;
        let key = format!("logic:{}", cache_key(condition)?);
        Ok(self.cached_logic(key, |weak, key| {
            let condition = condition.clone();
            if condition.is_async() {
                let pending = pending_of(&self.inner, &condition);
                Arc::new(move |state: &dyn FieldState| {
                    weak.upgrade()
                        .map_or(pending, |inner| resolve_logic(&inner, &key, &condition, state))
                })
            } else {
                Arc::new(move |state: &dyn FieldState| {
                    weak.upgrade().is_some_and(|inner| {
                        let context = EvaluationContext::tracked(&inner.services, state);
                        evaluate_condition(&condition, &context)
                    })
                })
            }
        }))
    }

    /// Compiles a condition into a debounced logic function.
    ///
    /// The returned function reads `false` until the computed value has been
    /// stable for `debounce_ms`. Async and remote conditions carry their own
    /// debounce and compile as in [`FormRuntime::compile_logic`].
    ///
    /// # Errors
    ///
    /// Returns [`ConditionShapeError`] as for [`FormRuntime::compile_logic`].
    pub fn compile_debounced_logic(
        &self,
        condition: &Condition,
        debounce_ms: u64,
    ) -> Result<LogicFn, ConditionShapeError> {
        if condition.is_async() {
            return self.compile_logic(condition);
        }
        let immediate = self.compile_logic(condition)?;
        let key = format!("debounced:{debounce_ms}:{}", cache_key(condition)?);
        Ok(self.cached_logic(key, |weak, key| {
            let delay = Duration::from_millis(debounce_ms);
            Arc::new(move |state: &dyn FieldState| {
                let value = immediate(state);
                weak.upgrade()
                    .is_some_and(|inner| debounced_value(&inner, &key, delay, state, value))
            })
        }))
    }

    /// Evaluates a condition once, awaiting async and remote lookups directly.
    ///
    /// Bypasses debounce and slot state; results still go through the TTL
    /// cache. Used for one-shot evaluation outside a reactive host.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionShapeError`] for invalid condition trees.
    pub async fn resolve_condition(
        &self,
        condition: &Condition,
        state: &dyn FieldState,
    ) -> Result<bool, ConditionShapeError> {
        condition.validate_shape()?;
        Ok(resolve_now(&self.inner, condition, state).await)
    }

    /// Returns the cached function for `key`, building it on a miss.
    fn cached_logic<F>(&self, key: String, build: F) -> LogicFn
    where
        F: FnOnce(Weak<RuntimeInner>, String) -> LogicFn,
    {
        let mut cache = self.inner.logic.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = cache.get(&key) {
            return Arc::clone(existing);
        }
        let function = build(Arc::downgrade(&self.inner), key.clone());
        cache.insert(key, Arc::clone(&function));
        function
    }
}

// ============================================================================
// SECTION: Debounce
// ============================================================================

/// Feeds `value` into the occurrence's debounce slot and returns the settled
/// value. Without an async runtime the value is returned undebounced.
fn debounced_value(
    inner: &Arc<RuntimeInner>,
    key: &str,
    delay: Duration,
    state: &dyn FieldState,
    value: bool,
) -> bool {
    let slot_key: SlotKey = (key.to_string(), state.path_keys());
    let slot = {
        let mut slots = inner.debounced.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(&slot_key) {
            Arc::clone(slot)
        } else {
            let Ok(handle) = Handle::try_current() else {
                drop(slots);
                inner.services.diagnostics.warn_once(
                    DiagnosticCode::RuntimeUnavailable,
                    &state.path(),
                    "no async runtime available; logic is not debounced",
                );
                return value;
            };
            let (immediate, immediate_rx) = watch::channel(None);
            let (settled_tx, settled) = watch::channel(false);
            handle.spawn(run_debounce(Arc::downgrade(inner), immediate_rx, settled_tx, delay));
            let slot = Arc::new(DebounceSlot {
                immediate,
                settled,
            });
            slots.insert(slot_key, Arc::clone(&slot));
            slot
        }
    };
    let _ = slot.immediate.send_if_modified(|current| {
        if *current == Some(value) {
            false
        } else {
            *current = Some(value);
            true
        }
    });
    *slot.settled.borrow()
}

/// Publishes the immediate value once it has been quiet for `delay`.
///
/// Ends when the slot is dropped.
async fn run_debounce(
    inner: Weak<RuntimeInner>,
    mut immediate: watch::Receiver<Option<bool>>,
    settled: watch::Sender<bool>,
    delay: Duration,
) {
    loop {
        if immediate.changed().await.is_err() {
            return;
        }
        loop {
            tokio::select! {
                changed = immediate.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                () = tokio::time::sleep(delay) => break,
            }
        }
        let latest = *immediate.borrow_and_update();
        if let Some(value) = latest
            && settled.send_if_modified(|current| {
                let modified = *current != value;
                *current = value;
                modified
            })
            && let Some(inner) = inner.upgrade()
        {
            inner.notify_resolution();
        }
    }
}
