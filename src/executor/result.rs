// ABOUTME: Immutable per-stack outcome produced by the executor.
// ABOUTME: Records the action taken, final status, outputs, duration and failure.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use super::StackFailure;
use crate::plan::PlannedStack;
use crate::provider::Outputs;
use crate::types::StackName;

/// What the executor asked the provider to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StackAction {
    Create,
    Update,
    NoChange,
}

impl StackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackAction::Create => "create",
            StackAction::Update => "update",
            StackAction::NoChange => "no_change",
        }
    }
}

impl fmt::Display for StackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    Succeeded,
    Failed,
    RolledBack,
}

impl StackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackStatus::Succeeded => "succeeded",
            StackStatus::Failed => "failed",
            StackStatus::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackRunResult {
    pub stack_name: StackName,
    pub physical_name: String,
    /// Absent when nothing was attempted against the provider.
    pub action: Option<StackAction>,
    pub status: StackStatus,
    pub outputs: Outputs,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub error: Option<StackFailure>,
}

impl StackRunResult {
    pub fn succeeded(
        stack: &PlannedStack,
        action: StackAction,
        outputs: Outputs,
        duration: Duration,
    ) -> Self {
        Self {
            stack_name: stack.name().clone(),
            physical_name: stack.physical_name.clone(),
            action: Some(action),
            status: StackStatus::Succeeded,
            outputs,
            duration,
            error: None,
        }
    }

    pub fn failed(
        stack: &PlannedStack,
        action: Option<StackAction>,
        failure: StackFailure,
        duration: Duration,
    ) -> Self {
        let status = if failure.is_rollback() {
            StackStatus::RolledBack
        } else {
            StackStatus::Failed
        };
        Self {
            stack_name: stack.name().clone(),
            physical_name: stack.physical_name.clone(),
            action,
            status,
            outputs: Outputs::new(),
            duration,
            error: Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StackStatus::Succeeded
    }
}
