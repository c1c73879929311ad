// ABOUTME: Stack-scoped failures recorded in run results and the manifest.
// ABOUTME: Each failure ends one stack; the orchestrator decides what happens to the rest.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::provider::ProviderError;
use crate::types::StackName;

/// Why a stack did not reach `succeeded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StackFailure {
    #[error("template not found: {}", path.display())]
    TemplateNotFound { path: PathBuf },

    #[error("stack creation failed: {reason}")]
    CreateFailed { reason: String },

    #[error("stack update failed: {reason}")]
    UpdateFailed { reason: String },

    #[error("stack rolled back: {reason}")]
    RolledBack { reason: String },

    #[error("stack did not converge within {}", humantime_serde::re::humantime::format_duration(*after))]
    Timeout {
        #[serde(with = "humantime_serde")]
        after: Duration,
    },

    #[error("deployment was not approved")]
    ApprovalDenied,

    /// The provider reported a conflict the executor cannot safely resolve.
    #[error("ambiguous provider state: {reason}")]
    Ambiguous { reason: String },

    #[error("not attempted: upstream stack {upstream} failed")]
    UpstreamFailure { upstream: StackName },

    #[error("parameter {parameter} references {stack}.{output}, which is not available")]
    UnresolvedReference {
        parameter: String,
        stack: StackName,
        output: String,
    },

    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("cancelled while waiting for the provider")]
    Cancelled,
}

impl StackFailure {
    /// Whether the failure leaves the stack rolled back rather than failed.
    pub fn is_rollback(&self) -> bool {
        matches!(self, StackFailure::RolledBack { .. })
    }

    /// Whether the provider was asked to change the stack before this failure.
    pub fn after_mutation(&self) -> bool {
        matches!(
            self,
            StackFailure::CreateFailed { .. }
                | StackFailure::UpdateFailed { .. }
                | StackFailure::RolledBack { .. }
                | StackFailure::Timeout { .. }
                | StackFailure::Cancelled
        )
    }
}

impl From<ProviderError> for StackFailure {
    fn from(err: ProviderError) -> Self {
        StackFailure::Provider {
            message: err.to_string(),
        }
    }
}
