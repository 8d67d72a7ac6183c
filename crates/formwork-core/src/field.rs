// crates/formwork-core/src/field.rs
// ============================================================================
// Module: Field State
// Description: Field occurrence accessor contract and read modes.
// Purpose: Expose field values to evaluation with explicit tracking control.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! A [`FieldState`] is one field occurrence as seen by the evaluation core.
//! Every read names its [`ReadMode`]: tracked reads register a reactive
//! dependency with the host, untracked reads take a snapshot. Validators use
//! untracked reads so that reading a sibling field can never re-trigger the
//! validator that read it.

use serde_json::Value;

use crate::path::path_keys;
use crate::path::resolve_path;

// ============================================================================
// SECTION: Read Modes
// ============================================================================

/// How a read interacts with the host's dependency tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadMode {
    /// Register a dependency on the value read.
    Tracked,
    /// Read a snapshot without registering a dependency.
    Untracked,
}

// ============================================================================
// SECTION: Field State
// ============================================================================

/// Accessor for one field occurrence.
pub trait FieldState: Send + Sync {
    /// Returns the field's own value (`None` when absent).
    fn current_value(&self, mode: ReadMode) -> Option<Value>;

    /// Returns the whole form value.
    fn root_value(&self, mode: ReadMode) -> Value;

    /// Returns the value at another path of the form (`None` when absent).
    fn value_at(&self, path: &str, mode: ReadMode) -> Option<Value>;

    /// Returns the field's path.
    fn path(&self) -> String;

    /// Returns the structural identity of this occurrence.
    ///
    /// Two accessors for the same occurrence return equal keys even when
    /// they are different objects.
    fn path_keys(&self) -> Vec<String> {
        path_keys(&self.path())
    }
}

/// Field accessor over a fixed form value.
///
/// Both read modes behave identically because nothing is tracked.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotField {
    /// Whole form value.
    root: Value,
    /// Field path within the form.
    path: String,
}

impl SnapshotField {
    /// Creates a snapshot accessor for `path` within `root`.
    #[must_use]
    pub fn new(root: Value, path: impl Into<String>) -> Self {
        Self {
            root,
            path: path.into(),
        }
    }
}

impl FieldState for SnapshotField {
    fn current_value(&self, _mode: ReadMode) -> Option<Value> {
        resolve_path(&self.root, &self.path).cloned()
    }

    fn root_value(&self, _mode: ReadMode) -> Value {
        self.root.clone()
    }

    fn value_at(&self, path: &str, _mode: ReadMode) -> Option<Value> {
        resolve_path(&self.root, path).cloned()
    }

    fn path(&self) -> String {
        self.path.clone()
    }
}
