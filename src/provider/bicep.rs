// ABOUTME: Bicep backend driving `az deployment group` in one resource group.
// ABOUTME: Each stack is a named deployment; what-if decides whether an update is needed.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{
    CommandRunner, CommandSpec, OperationHandle, OperationKind, OperationStatus, Outputs,
    ProviderError, StackDescription, StackEvent, StackHealth, StackProvider, StackRequest,
    StackState, StackTarget, UpdateOutcome,
};

const AZ: &str = "az";
const NOT_FOUND: &[&str] = &["DeploymentNotFound", "could not be found"];

/// What-if change types that leave a resource as it is.
const UNCHANGED: &[&str] = &["NoChange", "Ignore"];

pub struct BicepProvider {
    runner: Arc<dyn CommandRunner>,
    resource_group: String,
}

impl BicepProvider {
    pub fn new(runner: Arc<dyn CommandRunner>, resource_group: &str) -> Self {
        Self {
            runner,
            resource_group: resource_group.to_string(),
        }
    }

    fn command(&self, scope: &[&str], args: Vec<String>) -> CommandSpec {
        let mut all: Vec<String> = scope.iter().map(|s| s.to_string()).collect();
        all.extend([
            "--resource-group".to_string(),
            self.resource_group.clone(),
            "--output".to_string(),
            "json".to_string(),
        ]);
        all.extend(args);
        CommandSpec::new(AZ, all)
    }

    async fn call(&self, scope: &[&str], args: Vec<String>) -> Result<String, ProviderError> {
        let output = self.runner.run(&self.command(scope, args)).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(ProviderError::from_stderr(&output.stderr))
        }
    }

    async fn show(&self, name: &str) -> Result<Option<DeploymentProperties>, ProviderError> {
        let args = vec!["--name".to_string(), name.to_string()];
        let stdout = match self.call(&["deployment", "group", "show"], args).await {
            Ok(stdout) => stdout,
            Err(ProviderError::Rejected(msg)) if NOT_FOUND.iter().any(|m| msg.contains(m)) => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let deployment: Deployment =
            serde_json::from_str(&stdout).map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(Some(deployment.properties))
    }

    fn template_args(request: &StackRequest) -> Vec<String> {
        let mut args = vec![
            "--name".to_string(),
            request.target.name.clone(),
            "--template-file".to_string(),
            request.target.template.display().to_string(),
        ];
        if !request.parameters.is_empty() {
            args.push("--parameters".to_string());
            args.extend(
                request
                    .parameters
                    .iter()
                    .map(|(key, value)| format!("{key}={value}")),
            );
        }
        args
    }

    async fn submit(
        &self,
        request: &StackRequest,
        kind: OperationKind,
    ) -> Result<OperationHandle, ProviderError> {
        let mut args = Self::template_args(request);
        args.push("--no-wait".to_string());
        self.call(&["deployment", "group", "create"], args).await?;
        tracing::debug!(
            "submitted deployment {} to {}",
            request.target.name,
            self.resource_group
        );
        Ok(OperationHandle {
            id: request.target.name.clone(),
            stack_name: request.target.name.clone(),
            kind,
        })
    }

    /// `true` when what-if reports at least one resource change.
    async fn has_changes(&self, request: &StackRequest) -> Result<bool, ProviderError> {
        let mut args = Self::template_args(request);
        args.push("--no-pretty-print".to_string());
        let stdout = self.call(&["deployment", "group", "what-if"], args).await?;
        let what_if: WhatIfResult =
            serde_json::from_str(&stdout).map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(what_if
            .changes
            .iter()
            .any(|c| !UNCHANGED.contains(&c.change_type.as_str())))
    }
}

/// Operation outcome for an Azure provisioning state.
pub(crate) fn operation_status(properties: &DeploymentProperties) -> OperationStatus {
    match properties.provisioning_state.as_str() {
        "Succeeded" => OperationStatus::Succeeded,
        "Failed" => OperationStatus::Failed(
            properties
                .error
                .as_ref()
                .map(ErrorDetail::summary)
                .unwrap_or_else(|| "deployment failed".to_string()),
        ),
        "Canceled" => OperationStatus::Failed("deployment was canceled".to_string()),
        _ => OperationStatus::InProgress,
    }
}

pub(crate) fn health(provisioning_state: &str) -> StackHealth {
    match provisioning_state {
        "Succeeded" => StackHealth::Stable,
        "Failed" | "Canceled" => StackHealth::Failed,
        _ => StackHealth::InProgress,
    }
}

#[async_trait]
impl StackProvider for BicepProvider {
    async fn describe_stack(
        &self,
        target: &StackTarget,
    ) -> Result<StackDescription, ProviderError> {
        Ok(match self.show(&target.name).await? {
            None => StackDescription::Absent,
            Some(properties) => StackDescription::Present(StackState {
                health: health(&properties.provisioning_state),
                outputs: properties
                    .outputs
                    .into_iter()
                    .map(|(key, output)| (key, output.flatten()))
                    .collect::<Outputs>(),
                status: properties.provisioning_state,
            }),
        })
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<OperationHandle, ProviderError> {
        self.submit(request, OperationKind::Create).await
    }

    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateOutcome, ProviderError> {
        if !self.has_changes(request).await? {
            return Ok(UpdateOutcome::NoUpdates);
        }
        Ok(UpdateOutcome::Started(
            self.submit(request, OperationKind::Update).await?,
        ))
    }

    async fn poll_operation(
        &self,
        handle: &OperationHandle,
    ) -> Result<OperationStatus, ProviderError> {
        match self.show(&handle.stack_name).await? {
            // Not visible yet right after submission.
            None => Ok(OperationStatus::InProgress),
            Some(properties) => Ok(operation_status(&properties)),
        }
    }

    async fn recent_events(
        &self,
        target: &StackTarget,
        limit: usize,
    ) -> Result<Vec<StackEvent>, ProviderError> {
        let args = vec!["--name".to_string(), target.name.clone()];
        let stdout = self
            .call(&["deployment", "operation", "group", "list"], args)
            .await?;
        let mut operations: Vec<DeploymentOperation> =
            serde_json::from_str(&stdout).map_err(|e| ProviderError::Decode(e.to_string()))?;
        operations.sort_by(|a, b| b.properties.timestamp.cmp(&a.properties.timestamp));

        Ok(operations
            .into_iter()
            .take(limit)
            .map(|op| {
                let resource = op.properties.target_resource.unwrap_or_default();
                StackEvent {
                    timestamp: op.properties.timestamp,
                    resource_type: resource.resource_type.unwrap_or_default(),
                    logical_id: resource.resource_name.unwrap_or_default(),
                    status: op.properties.provisioning_state,
                    reason: op.properties.status_message.map(|m| match m {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    }),
                }
            })
            .collect())
    }
}

// CLI response shapes

#[derive(Debug, Deserialize)]
struct Deployment {
    properties: DeploymentProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeploymentProperties {
    provisioning_state: String,
    #[serde(default)]
    outputs: BTreeMap<String, DeploymentOutput>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct DeploymentOutput {
    value: serde_json::Value,
}

impl DeploymentOutput {
    fn flatten(self) -> String {
        match self.value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

impl ErrorDetail {
    /// Innermost message; Azure wraps the useful one in `details`.
    fn summary(&self) -> String {
        if let Some(inner) = self.details.first() {
            return inner.summary();
        }
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "deployment failed".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WhatIfResult {
    #[serde(default)]
    changes: Vec<WhatIfChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhatIfChange {
    change_type: String,
}

#[derive(Debug, Deserialize)]
struct DeploymentOperation {
    properties: OperationProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationProperties {
    #[serde(default)]
    provisioning_state: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    status_message: Option<serde_json::Value>,
    #[serde(default)]
    target_resource: Option<TargetResource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetResource {
    resource_type: Option<String>,
    resource_name: Option<String>,
}
