// ABOUTME: Abstract stack-management API consumed by the executor.
// ABOUTME: Defines the StackProvider trait, its data types and backend selection.

mod bicep;
mod cloudformation;
mod command;
mod error;
mod retry;
mod terraform;

pub use bicep::BicepProvider;
pub use cloudformation::CloudFormationProvider;
pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use error::ProviderError;
pub use retry::RetryPolicy;
pub use terraform::TerraformProvider;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::types::IacSource;

/// Stack outputs keyed by output name.
pub type Outputs = BTreeMap<String, String>;

/// Identifies a stack to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTarget {
    /// Physical stack name.
    pub name: String,
    pub template: PathBuf,
}

/// A create or update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRequest {
    pub target: StackTarget,
    pub parameters: BTreeMap<String, String>,
    pub capabilities: Vec<String>,
}

/// Coarse classification of a provider status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StackHealth {
    Stable,
    InProgress,
    Failed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackState {
    /// Provider's own status string (e.g. `UPDATE_COMPLETE`).
    pub status: String,
    pub health: StackHealth,
    pub outputs: Outputs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackDescription {
    Absent,
    Present(StackState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Update,
}

/// Handle to an in-flight create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub id: String,
    pub stack_name: String,
    pub kind: OperationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed(String),
    RolledBack(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Started(OperationHandle),
    /// The provider found nothing to change.
    NoUpdates,
}

/// A provider-side event, used to explain failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEvent {
    pub timestamp: Option<String>,
    pub resource_type: String,
    pub logical_id: String,
    pub status: String,
    pub reason: Option<String>,
}

/// Stack-management capability of a cloud provider.
#[async_trait]
pub trait StackProvider: Send + Sync {
    async fn describe_stack(&self, target: &StackTarget)
    -> Result<StackDescription, ProviderError>;

    async fn create_stack(&self, request: &StackRequest) -> Result<OperationHandle, ProviderError>;

    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateOutcome, ProviderError>;

    async fn poll_operation(
        &self,
        handle: &OperationHandle,
    ) -> Result<OperationStatus, ProviderError>;

    /// Most recent events for a stack, newest first.
    async fn recent_events(
        &self,
        _target: &StackTarget,
        _limit: usize,
    ) -> Result<Vec<StackEvent>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Connection settings handed to whichever backend a run selects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSettings {
    pub region: String,
    /// Named AWS CLI profile.
    pub profile: Option<String>,
    /// S3 bucket CloudFormation templates are staged in.
    pub template_bucket: Option<String>,
    /// Azure resource group Bicep deployments target.
    pub resource_group: String,
}

/// Backend driving the given IaC technology.
pub fn backend_for(
    source: IacSource,
    settings: &BackendSettings,
    runner: Arc<dyn CommandRunner>,
) -> Arc<dyn StackProvider> {
    match source {
        IacSource::CloudFormation => Arc::new(
            CloudFormationProvider::new(runner, &settings.region)
                .with_profile(settings.profile.clone())
                .with_template_bucket(settings.template_bucket.clone()),
        ),
        IacSource::Terraform | IacSource::GcpTerraform => Arc::new(TerraformProvider::new(runner)),
        IacSource::Bicep => Arc::new(BicepProvider::new(runner, &settings.resource_group)),
    }
}
