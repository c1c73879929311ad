// ABOUTME: Stack run state marker types for the type state pattern.
// ABOUTME: States carry the data the next transition needs, so it cannot be missing.

use crate::provider::{OperationHandle, Outputs, StackState};

use super::StackAction;

/// Initial state: planned, nothing checked yet.
/// Available actions: `verify_template()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Planned;

/// Template located on disk.
/// Available actions: `check_exists()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Verified;

/// Stack absent at the provider.
/// Available actions: `submit()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Creating;

/// Stack present at the provider.
/// Available actions: `submit()`
#[derive(Debug, Clone)]
pub struct Updating {
    pub(crate) existing: StackState,
}

/// Create or update submitted.
/// Available actions: `converge()`
#[derive(Debug, Clone)]
pub struct Converging {
    pub(crate) action: StackAction,
    pub(crate) handle: OperationHandle,
}

/// Provider reached a stable state.
/// Available actions: `collect_outputs()`
#[derive(Debug, Clone)]
pub struct Converged {
    pub(crate) action: StackAction,
    /// Outputs already known without another describe (no-change updates).
    pub(crate) outputs: Option<Outputs>,
}
