// ABOUTME: CloudFormation backend driving the `aws cloudformation` CLI.
// ABOUTME: Maps stack statuses to operation outcomes and extracts stack outputs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::{
    CommandRunner, CommandSpec, OperationHandle, OperationKind, OperationStatus, Outputs,
    ProviderError, StackDescription, StackEvent, StackHealth, StackProvider, StackRequest,
    StackState, StackTarget, UpdateOutcome,
};

const AWS: &str = "aws";
const NO_UPDATES: &str = "No updates are to be performed";
const DOES_NOT_EXIST: &str = "does not exist";
const TEMPLATE_PREFIX: &str = "templates/";

pub struct CloudFormationProvider {
    runner: Arc<dyn CommandRunner>,
    region: String,
    profile: Option<String>,
    /// S3 bucket templates are staged in before create/update.
    template_bucket: Option<String>,
}

impl CloudFormationProvider {
    pub fn new(runner: Arc<dyn CommandRunner>, region: &str) -> Self {
        Self {
            runner,
            region: region.to_string(),
            profile: None,
            template_bucket: None,
        }
    }

    /// Use a named AWS CLI profile for every call.
    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    /// Upload templates to this bucket and pass them by URL instead of inline.
    pub fn with_template_bucket(mut self, bucket: Option<String>) -> Self {
        self.template_bucket = bucket;
        self
    }

    fn aws(&self, service: &str, operation: &str, args: Vec<String>) -> CommandSpec {
        let mut all = vec![
            service.to_string(),
            operation.to_string(),
            "--region".to_string(),
            self.region.clone(),
        ];
        if let Some(profile) = &self.profile {
            all.push("--profile".to_string());
            all.push(profile.clone());
        }
        all.extend(args);
        CommandSpec::new(AWS, all)
    }

    fn command(&self, operation: &str, args: Vec<String>) -> CommandSpec {
        let mut all = vec!["--output".to_string(), "json".to_string()];
        all.extend(args);
        self.aws("cloudformation", operation, all)
    }

    /// Run a CLI call; failures are classified from stderr.
    async fn call(&self, operation: &str, args: Vec<String>) -> Result<String, ProviderError> {
        let output = self.runner.run(&self.command(operation, args)).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(ProviderError::from_stderr(&output.stderr))
        }
    }

    async fn describe(&self, stack_name: &str) -> Result<Option<CfnStack>, ProviderError> {
        let args = vec!["--stack-name".to_string(), stack_name.to_string()];
        let stdout = match self.call("describe-stacks", args).await {
            Ok(stdout) => stdout,
            Err(ProviderError::Rejected(msg)) if msg.contains(DOES_NOT_EXIST) => return Ok(None),
            Err(e) => return Err(e),
        };

        let response: DescribeStacksResponse =
            serde_json::from_str(&stdout).map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(response
            .stacks
            .into_iter()
            .next()
            .filter(|stack| stack.stack_status != "DELETE_COMPLETE"))
    }

    /// Stage the template in the template bucket, returning its URL.
    async fn upload_template(
        &self,
        bucket: &str,
        template: &Path,
    ) -> Result<String, ProviderError> {
        let file_name = template
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ProviderError::Rejected(format!("invalid template path {}", template.display()))
            })?;
        let key = format!("{TEMPLATE_PREFIX}{file_name}");

        let spec = self.aws(
            "s3",
            "cp",
            vec![
                template.display().to_string(),
                format!("s3://{bucket}/{key}"),
                "--content-type".to_string(),
                "text/yaml".to_string(),
            ],
        );
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Err(ProviderError::from_stderr(&output.stderr));
        }

        tracing::debug!("uploaded {} to s3://{}/{}", template.display(), bucket, key);
        Ok(format!("https://{bucket}.s3.{}.amazonaws.com/{key}", self.region))
    }

    async fn mutation_args(&self, request: &StackRequest) -> Result<Vec<String>, ProviderError> {
        let parameters: Vec<CfnParameter<'_>> = request
            .parameters
            .iter()
            .map(|(key, value)| CfnParameter {
                parameter_key: key,
                parameter_value: value,
            })
            .collect();
        let parameters =
            serde_json::to_string(&parameters).map_err(|e| ProviderError::Decode(e.to_string()))?;

        let template = match &self.template_bucket {
            Some(bucket) => [
                "--template-url".to_string(),
                self.upload_template(bucket, &request.target.template).await?,
            ],
            None => [
                "--template-body".to_string(),
                format!("file://{}", request.target.template.display()),
            ],
        };

        let mut args = vec!["--stack-name".to_string(), request.target.name.clone()];
        args.extend(template);
        args.push("--parameters".to_string());
        args.push(parameters);
        if !request.capabilities.is_empty() {
            args.push("--capabilities".to_string());
            args.extend(request.capabilities.iter().cloned());
        }
        Ok(args)
    }

    fn handle(stdout: &str, stack_name: &str, kind: OperationKind) -> OperationHandle {
        let id = serde_json::from_str::<StackIdResponse>(stdout)
            .map(|r| r.stack_id)
            .unwrap_or_else(|_| stack_name.to_string());
        OperationHandle {
            id,
            stack_name: stack_name.to_string(),
            kind,
        }
    }
}

/// Operation outcome for a CloudFormation stack status.
pub(crate) fn operation_status(status: &str, reason: Option<&str>) -> OperationStatus {
    let explain = || reason.unwrap_or(status).to_string();
    match status {
        // The update has landed; only superseded resources are being removed.
        "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => OperationStatus::Succeeded,
        "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS" => OperationStatus::RolledBack(explain()),
        s if s.ends_with("_IN_PROGRESS") => OperationStatus::InProgress,
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "IMPORT_COMPLETE" => OperationStatus::Succeeded,
        "ROLLBACK_COMPLETE" | "UPDATE_ROLLBACK_COMPLETE" | "IMPORT_ROLLBACK_COMPLETE" => {
            OperationStatus::RolledBack(explain())
        }
        s if s.ends_with("_FAILED") => OperationStatus::Failed(explain()),
        "DELETE_COMPLETE" => OperationStatus::Failed("stack was deleted".to_string()),
        other => {
            tracing::warn!("unknown stack status {}, still waiting", other);
            OperationStatus::InProgress
        }
    }
}

pub(crate) fn health(status: &str) -> StackHealth {
    let settled = status.ends_with("_COMPLETE_CLEANUP_IN_PROGRESS");
    if status.ends_with("_IN_PROGRESS") && !settled {
        StackHealth::InProgress
    } else if status.ends_with("_FAILED") {
        StackHealth::Failed
    } else if status.contains("ROLLBACK") {
        StackHealth::RolledBack
    } else if status.contains("COMPLETE") {
        StackHealth::Stable
    } else {
        StackHealth::Failed
    }
}

#[async_trait]
impl StackProvider for CloudFormationProvider {
    async fn describe_stack(
        &self,
        target: &StackTarget,
    ) -> Result<StackDescription, ProviderError> {
        Ok(match self.describe(&target.name).await? {
            None => StackDescription::Absent,
            Some(stack) => StackDescription::Present(StackState {
                health: health(&stack.stack_status),
                outputs: stack
                    .outputs
                    .into_iter()
                    .map(|o| (o.output_key, o.output_value))
                    .collect::<Outputs>(),
                status: stack.stack_status,
            }),
        })
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<OperationHandle, ProviderError> {
        let stdout = self
            .call("create-stack", self.mutation_args(request).await?)
            .await?;
        Ok(Self::handle(
            &stdout,
            &request.target.name,
            OperationKind::Create,
        ))
    }

    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateOutcome, ProviderError> {
        match self
            .call("update-stack", self.mutation_args(request).await?)
            .await
        {
            Ok(stdout) => Ok(UpdateOutcome::Started(Self::handle(
                &stdout,
                &request.target.name,
                OperationKind::Update,
            ))),
            Err(ProviderError::Rejected(msg)) if msg.contains(NO_UPDATES) => {
                Ok(UpdateOutcome::NoUpdates)
            }
            Err(e) => Err(e),
        }
    }

    async fn poll_operation(
        &self,
        handle: &OperationHandle,
    ) -> Result<OperationStatus, ProviderError> {
        match self.describe(&handle.stack_name).await? {
            // Not visible yet right after submission.
            None => Ok(OperationStatus::InProgress),
            Some(stack) => Ok(operation_status(
                &stack.stack_status,
                stack.stack_status_reason.as_deref(),
            )),
        }
    }

    async fn recent_events(
        &self,
        target: &StackTarget,
        limit: usize,
    ) -> Result<Vec<StackEvent>, ProviderError> {
        let args = vec![
            "--stack-name".to_string(),
            target.name.clone(),
            "--max-items".to_string(),
            limit.to_string(),
        ];
        let stdout = self.call("describe-stack-events", args).await?;
        let response: StackEventsResponse =
            serde_json::from_str(&stdout).map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(response
            .stack_events
            .into_iter()
            .take(limit)
            .map(|e| StackEvent {
                timestamp: e.timestamp,
                resource_type: e.resource_type.unwrap_or_default(),
                logical_id: e.logical_resource_id.unwrap_or_default(),
                status: e.resource_status.unwrap_or_default(),
                reason: e.resource_status_reason,
            })
            .collect())
    }
}

// CLI response shapes

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacksResponse {
    #[serde(default)]
    stacks: Vec<CfnStack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CfnStack {
    stack_status: String,
    #[serde(default)]
    stack_status_reason: Option<String>,
    #[serde(default)]
    outputs: Vec<CfnOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CfnOutput {
    output_key: String,
    output_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackIdResponse {
    stack_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackEventsResponse {
    #[serde(default)]
    stack_events: Vec<CfnEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CfnEvent {
    timestamp: Option<String>,
    resource_type: Option<String>,
    logical_resource_id: Option<String>,
    resource_status: Option<String>,
    resource_status_reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CfnParameter<'a> {
    parameter_key: &'a str,
    parameter_value: &'a str,
}
