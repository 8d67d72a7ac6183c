// crates/formwork-core/src/runtime.rs
// ============================================================================
// Module: Form Runtime
// Description: Per-form-instance cache context and collaborators.
// Purpose: Scope every cache to one form instance.
// Dependencies: formwork-expr, serde_json, tokio
// ============================================================================

//! ## Overview
//! A [`FormRuntime`] is the cache context of one form instance. It owns the
//! compiled logic and derivation caches, the debounce and async slot stores,
//! the TTL response cache and the expression AST memo. Nothing is process
//! global: two runtimes never share state, so concurrent form instances
//! (one per request on a server) cannot observe each other.
//!
//! Compiled functions hold only weak references back to the runtime. Once
//! the runtime is dropped they return their fallback values and all
//! background pipelines stop.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use formwork_expr::EngineSettings;
use formwork_expr::ExpressionEngine;
use serde_json::Value;
use tokio::sync::watch;

use crate::clock::Clock;
use crate::clock::MonotonicClock;
use crate::context::EvaluationServices;
use crate::derivation::DerivationFn;
use crate::diagnostics::Diagnostics;
use crate::logic::DebounceSlot;
use crate::logic::LogicFn;
use crate::path::elements_exist;
use crate::registry::FunctionRegistry;
use crate::resolver::AsyncSlot;
use crate::resolver::ResolverSettings;
use crate::transport::Transport;
use crate::transport::UnavailableTransport;
use crate::ttl_cache::HttpConditionCache;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeSettings {
    /// Expression engine limits and memo capacity.
    pub engine: EngineSettings,
    /// Async and remote defaults.
    pub resolver: ResolverSettings,
}

/// Cache sizes of one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Compiled logic functions.
    pub logic_functions: usize,
    /// Compiled derivation functions.
    pub derivations: usize,
    /// Debounced logic slots.
    pub debounced_slots: usize,
    /// Async and remote slots.
    pub async_slots: usize,
    /// TTL cache entries.
    pub ttl_entries: usize,
    /// Memoized expression programs.
    pub programs: usize,
}

// ============================================================================
// SECTION: Inner State
// ============================================================================

/// Slot identity: compiled function key plus field occurrence path keys.
pub(crate) type SlotKey = (String, Vec<String>);

/// Shared state behind a [`FormRuntime`].
pub(crate) struct RuntimeInner {
    /// Evaluation collaborators.
    pub(crate) services: EvaluationServices,
    /// Network capability.
    pub(crate) transport: Arc<dyn Transport>,
    /// TTL response cache.
    pub(crate) ttl: HttpConditionCache,
    /// Compiled logic functions by key.
    pub(crate) logic: Mutex<HashMap<String, LogicFn>>,
    /// Compiled derivations by key.
    pub(crate) derivations: Mutex<HashMap<String, DerivationFn>>,
    /// Debounced logic slots.
    pub(crate) debounced: Mutex<HashMap<SlotKey, Arc<DebounceSlot>>>,
    /// Async and remote slots.
    pub(crate) async_slots: Mutex<HashMap<SlotKey, Arc<AsyncSlot>>>,
    /// Counter bumped whenever a background value is published.
    resolutions: watch::Sender<u64>,
}

impl RuntimeInner {
    /// Signals that a debounced or async value was published.
    pub(crate) fn notify_resolution(&self) {
        self.resolutions.send_modify(|count| *count = count.wrapping_add(1));
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for [`FormRuntime`].
pub struct FormRuntimeBuilder {
    /// Runtime settings.
    settings: RuntimeSettings,
    /// Registered functions.
    functions: FunctionRegistry,
    /// Diagnostics hub.
    diagnostics: Diagnostics,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Network capability.
    transport: Arc<dyn Transport>,
}

impl FormRuntimeBuilder {
    /// Sets the runtime settings.
    #[must_use]
    pub fn settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the function registry.
    #[must_use]
    pub fn functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Sets the diagnostics hub.
    #[must_use]
    pub fn diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Sets the time source.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the network capability.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Builds the runtime.
    #[must_use]
    pub fn build(self) -> FormRuntime {
        let services = EvaluationServices::new(
            ExpressionEngine::new(self.settings.engine),
            Arc::new(self.functions),
            self.diagnostics,
        )
        .with_resolver_settings(self.settings.resolver);
        let (resolutions, _) = watch::channel(0);
        FormRuntime {
            inner: Arc::new(RuntimeInner {
                services,
                transport: self.transport,
                ttl: HttpConditionCache::new(self.clock),
                logic: Mutex::new(HashMap::new()),
                derivations: Mutex::new(HashMap::new()),
                debounced: Mutex::new(HashMap::new()),
                async_slots: Mutex::new(HashMap::new()),
                resolutions,
            }),
        }
    }
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Cache context of one form instance.
///
/// # Invariants
/// - Caches are never shared between runtimes.
/// - Clones share the same caches.
#[derive(Clone)]
pub struct FormRuntime {
    /// Shared state.
    pub(crate) inner: Arc<RuntimeInner>,
}

impl FormRuntime {
    /// Starts a builder with default settings, no functions, no diagnostics
    /// output, a monotonic clock and no transport.
    #[must_use]
    pub fn builder() -> FormRuntimeBuilder {
        FormRuntimeBuilder {
            settings: RuntimeSettings::default(),
            functions: FunctionRegistry::new(),
            diagnostics: Diagnostics::noop(),
            clock: Arc::new(MonotonicClock::new()),
            transport: Arc::new(UnavailableTransport),
        }
    }

    /// Creates a runtime with defaults and the given functions.
    #[must_use]
    pub fn new(functions: FunctionRegistry) -> Self {
        Self::builder().functions(functions).build()
    }

    /// Returns the evaluation collaborators.
    #[must_use]
    pub fn services(&self) -> &EvaluationServices {
        &self.inner.services
    }

    /// Returns the diagnostics hub.
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.services.diagnostics
    }

    /// Returns the TTL response cache.
    #[must_use]
    pub fn response_cache(&self) -> &HttpConditionCache {
        &self.inner.ttl
    }

    /// Subscribes to background publications.
    ///
    /// The value changes whenever a debounced or async result is published;
    /// hosts re-run their logic functions on change.
    #[must_use]
    pub fn resolution_updates(&self) -> watch::Receiver<u64> {
        self.inner.resolutions.subscribe()
    }

    /// Returns cache sizes.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = &self.inner;
        CacheStats {
            logic_functions: inner.logic.lock().unwrap_or_else(PoisonError::into_inner).len(),
            derivations: inner.derivations.lock().unwrap_or_else(PoisonError::into_inner).len(),
            debounced_slots: inner.debounced.lock().unwrap_or_else(PoisonError::into_inner).len(),
            async_slots: inner.async_slots.lock().unwrap_or_else(PoisonError::into_inner).len(),
            ttl_entries: inner.ttl.len(),
            programs: inner.services.engine.stats().entries,
        }
    }

    /// Drops debounce and async slots for array elements `root` no longer
    /// holds, stopping their background tasks. Returns the number removed.
    ///
    /// Hosts call this after removing elements from an `applyEach` array.
    pub fn prune_slots(&self, root: &Value) -> usize {
        let stale = |key: &SlotKey| !elements_exist(root, &key.1);
        let mut removed = 0;
        {
            let mut slots = self.inner.debounced.lock().unwrap_or_else(PoisonError::into_inner);
            let before = slots.len();
            slots.retain(|key, _| !stale(key));
            removed += before - slots.len();
        }
        let mut slots = self.inner.async_slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|key, _| !stale(key));
        removed += before - slots.len();
        removed
    }

    /// Returns true when both handles share the same caches.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for FormRuntime {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for FormRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormRuntime").field("stats", &self.stats()).finish_non_exhaustive()
    }
}
