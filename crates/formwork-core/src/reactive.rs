// crates/formwork-core/src/reactive.rs
// ============================================================================
// Module: Reactive Form Model
// Description: Minimal reactive substrate for hosts without a UI runtime.
// Purpose: Provide tracked field state, dependency recording and memoized
//          derived values.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`FormModel`] holds one shared form value with a version counter.
//! [`FieldHandle`] implements [`FieldState`] over it: tracked reads are
//! recorded by every [`FormModel::track`] scope active on the calling
//! thread, untracked reads never are. [`Derived`] memoizes a computation and
//! recomputes only when a value it read through a tracked read has changed.
//!
//! Compiled logic functions plug in directly:
//! `model.derive(move || logic(&handle))`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread::ThreadId;

use serde_json::Value;

use crate::cache_key::value_key;
use crate::field::FieldState;
use crate::field::ReadMode;
use crate::path::resolve_path;
use crate::path::set_path;

// ============================================================================
// SECTION: Model
// ============================================================================

/// Shared state behind a [`FormModel`].
struct ModelInner {
    /// Form value.
    value: RwLock<Value>,
    /// Bumped on every effective write.
    version: AtomicU64,
    /// Active recording scopes per thread, innermost last.
    recorders: Mutex<HashMap<ThreadId, Vec<BTreeSet<String>>>>,
}

/// Shared mutable form value.
///
/// # Invariants
/// - `version` increases on every write that changes the value.
#[derive(Clone)]
pub struct FormModel {
    /// Shared state.
    inner: Arc<ModelInner>,
}

impl FormModel {
    /// Creates a model over an initial value.
    #[must_use]
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                value: RwLock::new(initial),
                version: AtomicU64::new(0),
                recorders: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the current version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Returns a copy of the whole value without recording.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.inner.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns the value at `path` without recording.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        let value = self.inner.value.read().unwrap_or_else(PoisonError::into_inner);
        resolve_path(&value, path).cloned()
    }

    /// Writes `value` at `path`. Returns `false` when a scalar blocks the path.
    pub fn set(&self, path: &str, value: Value) -> bool {
        let mut root = self.inner.value.write().unwrap_or_else(PoisonError::into_inner);
        if resolve_path(&root, path) == Some(&value) {
            return true;
        }
        let written = set_path(&mut root, path, value);
        if written {
            self.inner.version.fetch_add(1, Ordering::AcqRel);
        }
        written
    }

    /// Returns an accessor for one field occurrence.
    #[must_use]
    pub fn field(&self, path: impl Into<String>) -> FieldHandle {
        FieldHandle {
            model: self.clone(),
            path: path.into(),
        }
    }

    /// Runs `f` and returns the paths it read through tracked reads.
    ///
    /// `""` in the result stands for the whole form.
    pub fn track<T>(&self, f: impl FnOnce() -> T) -> (T, BTreeSet<String>) {
        let scope = RecordingScope::enter(self);
        let value = f();
        let paths = scope.exit();
        (value, paths)
    }

    /// Memoizes `compute` over its tracked dependencies.
    #[must_use]
    pub fn derive<T, F>(&self, compute: F) -> Derived<T>
    where
        T: Clone,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Derived {
            model: self.clone(),
            compute: Box::new(compute),
            memo: Mutex::new(None),
            recomputations: AtomicU64::new(0),
        }
    }

    /// Records a tracked read in every scope active on this thread.
    fn record(&self, path: &str) {
        let id = std::thread::current().id();
        let mut recorders = self.inner.recorders.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(scopes) = recorders.get_mut(&id) {
            for scope in scopes {
                scope.insert(path.to_string());
            }
        }
    }
}

impl std::fmt::Debug for FormModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormModel").field("version", &self.version()).finish_non_exhaustive()
    }
}

/// Dependency recording scope; popped on drop so panics cannot leak it.
struct RecordingScope<'m> {
    /// Model being recorded.
    model: &'m FormModel,
    /// Set once the scope has been popped.
    closed: bool,
}

impl<'m> RecordingScope<'m> {
    /// Pushes a new scope for the current thread.
    fn enter(model: &'m FormModel) -> Self {
        let id = std::thread::current().id();
        model
            .inner
            .recorders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .push(BTreeSet::new());
        Self {
            model,
            closed: false,
        }
    }

    /// Pops the scope and returns the recorded paths.
    fn exit(mut self) -> BTreeSet<String> {
        self.closed = true;
        self.pop()
    }

    /// Removes the innermost scope of the current thread.
    fn pop(&self) -> BTreeSet<String> {
        let id = std::thread::current().id();
        let mut recorders =
            self.model.inner.recorders.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(scopes) = recorders.get_mut(&id) else {
            return BTreeSet::new();
        };
        let paths = scopes.pop().unwrap_or_default();
        if scopes.is_empty() {
            recorders.remove(&id);
        }
        paths
    }
}

impl Drop for RecordingScope<'_> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.pop();
        }
    }
}

// ============================================================================
// SECTION: Field Handle
// ============================================================================

/// Field accessor over a [`FormModel`].
#[derive(Debug, Clone)]
pub struct FieldHandle {
    /// Backing model.
    model: FormModel,
    /// Field path.
    path: String,
}

impl FieldState for FieldHandle {
    fn current_value(&self, mode: ReadMode) -> Option<Value> {
        if mode == ReadMode::Tracked {
            self.model.record(&self.path);
        }
        self.model.get(&self.path)
    }

    fn root_value(&self, mode: ReadMode) -> Value {
        if mode == ReadMode::Tracked {
            self.model.record("");
        }
        self.model.snapshot()
    }

    fn value_at(&self, path: &str, mode: ReadMode) -> Option<Value> {
        if mode == ReadMode::Tracked {
            self.model.record(path);
        }
        self.model.get(path)
    }

    fn path(&self) -> String {
        self.path.clone()
    }
}

// ============================================================================
// SECTION: Derived
// ============================================================================

/// Last computed value with the dependency values it saw.
struct Memo<T> {
    /// Computed value.
    value: T,
    /// Model version the memo was validated against.
    version: u64,
    /// Dependency paths with the canonical keys of the values read.
    dependencies: Vec<(String, String)>,
}

/// Memoized computation over tracked reads.
pub struct Derived<T> {
    /// Backing model.
    model: FormModel,
    /// Computation.
    compute: Box<dyn Fn() -> T + Send + Sync>,
    /// Last result.
    memo: Mutex<Option<Memo<T>>>,
    /// Number of times `compute` ran.
    recomputations: AtomicU64,
}

impl<T: Clone> Derived<T> {
    /// Returns the value, recomputing only when a dependency changed.
    pub fn get(&self) -> T {
        let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
        let version = self.model.version();
        if let Some(current) = memo.as_mut() {
            let unchanged = current.version == version
                || current
                    .dependencies
                    .iter()
                    .all(|(path, key)| value_key(self.model.get(path).as_ref()) == *key);
            if unchanged {
                current.version = version;
                return current.value.clone();
            }
        }
        let (value, paths) = self.model.track(|| (self.compute)());
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        let dependencies = paths
            .into_iter()
            .map(|path| {
                let key = value_key(self.model.get(&path).as_ref());
                (path, key)
            })
            .collect();
        *memo = Some(Memo {
            value: value.clone(),
            version,
            dependencies,
        });
        value
    }

    /// Returns how many times the computation ran.
    #[must_use]
    pub fn recomputations(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("recomputations", &self.recomputations.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
