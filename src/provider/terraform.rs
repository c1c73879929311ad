// ABOUTME: Terraform backend: one workspace per physical stack name.
// ABOUTME: Applies run as background tasks so they can be polled like any other operation.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;

use super::{
    CommandOutput, CommandRunner, CommandSpec, OperationHandle, OperationKind, OperationStatus,
    Outputs, ProviderError, StackDescription, StackHealth, StackProvider, StackRequest,
    StackState, StackTarget, UpdateOutcome,
};

const TERRAFORM: &str = "terraform";
const WORKSPACE_MISSING: &[&str] = &["doesn't exist", "does not exist"];

/// Status reported when the last apply in this process failed.
const STATUS_APPLY_FAILED: &str = "APPLY_FAILED";
/// Status reported when the workspace tracks no resources.
const STATUS_EMPTY: &str = "EMPTY";
const STATUS_APPLIED: &str = "APPLIED";

/// `plan -detailed-exitcode` result meaning "changes present".
const PLAN_HAS_CHANGES: i32 = 2;

type ApplyTask = JoinHandle<Result<CommandOutput, ProviderError>>;

pub struct TerraformProvider {
    runner: Arc<dyn CommandRunner>,
    initialized: Mutex<HashSet<PathBuf>>,
    applies: Mutex<HashMap<String, ApplyTask>>,
    /// Failure summary of the last apply per stack, cleared by a successful one.
    failed_applies: Mutex<HashMap<String, String>>,
    next_id: AtomicU64,
}

impl TerraformProvider {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            initialized: Mutex::new(HashSet::new()),
            applies: Mutex::new(HashMap::new()),
            failed_applies: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The template is either the module directory itself or a file inside it.
    fn module_dir(template: &Path) -> PathBuf {
        if template.is_dir() {
            return template.to_path_buf();
        }
        match template.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn command<I, S>(dir: &Path, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut all = vec![format!("-chdir={}", dir.display())];
        all.extend(args.into_iter().map(Into::into));
        CommandSpec::new(TERRAFORM, all)
    }

    async fn call(&self, spec: CommandSpec) -> Result<String, ProviderError> {
        let output = self.runner.run(&spec).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(ProviderError::from_stderr(&output.stderr))
        }
    }

    async fn ensure_init(&self, dir: &Path) -> Result<(), ProviderError> {
        if self.initialized.lock().contains(dir) {
            return Ok(());
        }
        self.call(Self::command(dir, ["init", "-input=false", "-no-color"]))
            .await?;
        self.initialized.lock().insert(dir.to_path_buf());
        Ok(())
    }

    /// Select the stack's workspace; `false` when it does not exist.
    async fn select_workspace(&self, dir: &Path, name: &str) -> Result<bool, ProviderError> {
        let output = self
            .runner
            .run(&Self::command(dir, ["workspace", "select", "-no-color", name]))
            .await?;
        if output.success() {
            Ok(true)
        } else if WORKSPACE_MISSING.iter().any(|m| output.stderr.contains(m)) {
            Ok(false)
        } else {
            Err(ProviderError::from_stderr(&output.stderr))
        }
    }

    async fn outputs(&self, dir: &Path) -> Result<Outputs, ProviderError> {
        let stdout = self
            .call(Self::command(dir, ["output", "-json", "-no-color"]))
            .await?;
        parse_outputs(&stdout)
    }

    /// Number of resources tracked in the selected workspace's state.
    async fn resource_count(&self, dir: &Path) -> Result<usize, ProviderError> {
        let stdout = self
            .call(Self::command(dir, ["state", "list", "-no-color"]))
            .await?;
        Ok(stdout.lines().filter(|l| !l.trim().is_empty()).count())
    }

    fn var_args(parameters: &BTreeMap<String, String>) -> Vec<String> {
        parameters
            .iter()
            .flat_map(|(key, value)| ["-var".to_string(), format!("{key}={value}")])
            .collect()
    }

    fn start_apply(&self, dir: &Path, request: &StackRequest, kind: OperationKind) -> OperationHandle {
        let mut args = vec![
            "apply".to_string(),
            "-auto-approve".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
        ];
        args.extend(Self::var_args(&request.parameters));
        let spec = Self::command(dir, args);

        let id = format!(
            "{}#{}",
            request.target.name,
            self.next_id.fetch_add(1, Ordering::Relaxed)
        );
        let runner = Arc::clone(&self.runner);
        let task = tokio::spawn(async move { runner.run(&spec).await });
        self.applies.lock().insert(id.clone(), task);

        tracing::debug!("started terraform apply {}", id);
        OperationHandle {
            id,
            stack_name: request.target.name.clone(),
            kind,
        }
    }
}

#[async_trait]
impl StackProvider for TerraformProvider {
    async fn describe_stack(
        &self,
        target: &StackTarget,
    ) -> Result<StackDescription, ProviderError> {
        let dir = Self::module_dir(&target.template);
        self.ensure_init(&dir).await?;
        if !self.select_workspace(&dir, &target.name).await? {
            return Ok(StackDescription::Absent);
        }

        let failed = self.failed_applies.lock().get(&target.name).cloned();
        let (status, health) = if let Some(reason) = failed {
            tracing::debug!("last apply of {} failed: {}", target.name, reason);
            (STATUS_APPLY_FAILED, StackHealth::Failed)
        } else if self.resource_count(&dir).await? == 0 {
            (STATUS_EMPTY, StackHealth::Failed)
        } else {
            (STATUS_APPLIED, StackHealth::Stable)
        };

        Ok(StackDescription::Present(StackState {
            status: status.to_string(),
            health,
            outputs: self.outputs(&dir).await?,
        }))
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<OperationHandle, ProviderError> {
        let dir = Self::module_dir(&request.target.template);
        self.ensure_init(&dir).await?;
        self.call(Self::command(
            &dir,
            ["workspace", "new", "-no-color", request.target.name.as_str()],
        ))
        .await?;
        Ok(self.start_apply(&dir, request, OperationKind::Create))
    }

    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateOutcome, ProviderError> {
        let dir = Self::module_dir(&request.target.template);
        self.ensure_init(&dir).await?;
        if !self.select_workspace(&dir, &request.target.name).await? {
            return Err(ProviderError::Rejected(format!(
                "workspace {} does not exist",
                request.target.name
            )));
        }

        let mut args = vec![
            "plan".to_string(),
            "-detailed-exitcode".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
        ];
        args.extend(Self::var_args(&request.parameters));
        let output = self.runner.run(&Self::command(&dir, args)).await?;

        match output.exit_code {
            Some(0) => Ok(UpdateOutcome::NoUpdates),
            Some(PLAN_HAS_CHANGES) => Ok(UpdateOutcome::Started(self.start_apply(
                &dir,
                request,
                OperationKind::Update,
            ))),
            _ => Err(ProviderError::from_stderr(&output.stderr)),
        }
    }

    async fn poll_operation(
        &self,
        handle: &OperationHandle,
    ) -> Result<OperationStatus, ProviderError> {
        let task = {
            let mut applies = self.applies.lock();
            let finished = match applies.get(&handle.id) {
                None => return Err(ProviderError::UnknownOperation(handle.id.clone())),
                Some(task) => task.is_finished(),
            };
            if !finished {
                return Ok(OperationStatus::InProgress);
            }
            applies.remove(&handle.id)
        };
        let Some(task) = task else {
            return Err(ProviderError::UnknownOperation(handle.id.clone()));
        };

        let status = match task.await {
            Ok(Ok(output)) if output.success() => OperationStatus::Succeeded,
            Ok(Ok(output)) => OperationStatus::Failed(failure_summary(&output.stderr)),
            Ok(Err(e)) => return Err(e),
            Err(e) => OperationStatus::Failed(format!("apply task failed: {e}")),
        };

        let mut failed_applies = self.failed_applies.lock();
        match &status {
            OperationStatus::Failed(reason) => {
                failed_applies.insert(handle.stack_name.clone(), reason.clone());
            }
            _ => {
                failed_applies.remove(&handle.stack_name);
            }
        }
        Ok(status)
    }
}

#[derive(Debug, Deserialize)]
struct TerraformOutput {
    value: serde_json::Value,
}

fn parse_outputs(stdout: &str) -> Result<Outputs, ProviderError> {
    if stdout.trim().is_empty() {
        return Ok(Outputs::new());
    }
    let raw: BTreeMap<String, TerraformOutput> =
        serde_json::from_str(stdout).map_err(|e| ProviderError::Decode(e.to_string()))?;

    Ok(raw
        .into_iter()
        .map(|(key, output)| {
            let value = match output.value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

/// First `Error:` line of terraform's stderr, or its last non-empty line.
fn failure_summary(stderr: &str) -> String {
    let lines = || stderr.lines().map(str::trim).filter(|l| !l.is_empty());
    lines()
        .find(|l| l.starts_with("Error:"))
        .or_else(|| lines().last())
        .unwrap_or("terraform apply failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::command::testing::ScriptedRunner;
    use std::time::Duration;

    fn target() -> StackTarget {
        StackTarget {
            name: "demo-foundation-dev".to_string(),
            template: PathBuf::from("/nonexistent/terraform/foundation/main.tf"),
        }
    }

    fn request() -> StackRequest {
        StackRequest {
            target: target(),
            parameters: BTreeMap::from([("environment".to_string(), "dev".to_string())]),
            capabilities: vec![],
        }
    }

    async fn wait(provider: &TerraformProvider, handle: &OperationHandle) -> OperationStatus {
        for _ in 0..200 {
            let status = provider.poll_operation(handle).await.unwrap();
            if status != OperationStatus::InProgress {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("apply never finished");
    }

    #[test]
    fn outputs_are_flattened_to_strings() {
        let stdout = r#"{"bucket":{"sensitive":false,"type":"string","value":"lake-dev"},
            "count":{"sensitive":false,"type":"number","value":3}}"#;
        let outputs = parse_outputs(stdout).unwrap();
        assert_eq!(outputs["bucket"], "lake-dev");
        assert_eq!(outputs["count"], "3");
    }

    #[test]
    fn failure_summary_prefers_error_line() {
        let stderr = "\nWarning: deprecated\n\nError: creating S3 bucket: AccessDenied\n  on main.tf\n";
        assert_eq!(
            failure_summary(stderr),
            "Error: creating S3 bucket: AccessDenied"
        );
        assert_eq!(failure_summary(""), "terraform apply failed");
    }

    #[tokio::test]
    async fn missing_workspace_is_absent() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .respond("init", 0, "", "")
                .respond(
                    "workspace",
                    1,
                    "",
                    "Workspace \"demo-foundation-dev\" doesn't exist.",
                ),
        );
        let provider = TerraformProvider::new(runner.clone());

        assert_eq!(
            provider.describe_stack(&target()).await.unwrap(),
            StackDescription::Absent
        );
        let calls = runner.calls.lock();
        assert_eq!(calls[0].args[0], "-chdir=/nonexistent/terraform/foundation");
    }

    #[tokio::test]
    async fn init_runs_once_per_module() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .respond("init", 0, "", "")
                .respond("workspace", 0, "", "")
                .respond("state", 0, "aws_s3_bucket.lake\n", "")
                .respond("output", 0, r#"{"arn":{"value":"a"}}"#, "")
                .respond("workspace", 0, "", "")
                .respond("state", 0, "aws_s3_bucket.lake\n", "")
                .respond("output", 0, "{}", ""),
        );
        let provider = TerraformProvider::new(runner.clone());

        provider.describe_stack(&target()).await.unwrap();
        let second = provider.describe_stack(&target()).await.unwrap();
        assert!(matches!(second, StackDescription::Present(state)
            if state.outputs.is_empty() && state.health == StackHealth::Stable));

        let inits = runner
            .calls
            .lock()
            .iter()
            .filter(|c| c.args[1] == "init")
            .count();
        assert_eq!(inits, 1);
    }

    #[tokio::test]
    async fn unchanged_plan_is_no_updates() {
        let runner = ScriptedRunner::default()
            .respond("init", 0, "", "")
            .respond("workspace", 0, "", "")
            .respond("plan", 0, "No changes.", "");
        let provider = TerraformProvider::new(Arc::new(runner));

        assert_eq!(
            provider.update_stack(&request()).await.unwrap(),
            UpdateOutcome::NoUpdates
        );
    }

    #[tokio::test]
    async fn create_applies_in_background() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .respond("init", 0, "", "")
                .respond("workspace", 0, "Created and switched", "")
                .respond("apply", 0, "Apply complete!", ""),
        );
        let provider = TerraformProvider::new(runner.clone());

        let handle = provider.create_stack(&request()).await.unwrap();
        assert_eq!(handle.kind, OperationKind::Create);
        assert_eq!(wait(&provider, &handle).await, OperationStatus::Succeeded);

        // The finished operation is forgotten.
        assert!(matches!(
            provider.poll_operation(&handle).await,
            Err(ProviderError::UnknownOperation(_))
        ));

        let calls = runner.calls.lock();
        let apply = calls.iter().find(|c| c.args[1] == "apply").unwrap();
        assert!(apply.args.contains(&"environment=dev".to_string()));
    }

    #[tokio::test]
    async fn failed_apply_reports_error_line() {
        let runner = ScriptedRunner::default()
            .respond("init", 0, "", "")
            .respond("workspace", 0, "", "")
            .respond("plan", 2, "", "")
            .respond("apply", 1, "", "Error: quota exceeded\n");
        let provider = TerraformProvider::new(Arc::new(runner));

        let UpdateOutcome::Started(handle) = provider.update_stack(&request()).await.unwrap() else {
            panic!("expected an apply to start");
        };
        assert_eq!(
            wait(&provider, &handle).await,
            OperationStatus::Failed("Error: quota exceeded".to_string())
        );
    }

    #[tokio::test]
    async fn existing_workspace_is_ambiguous_create() {
        let runner = ScriptedRunner::default()
            .respond("init", 0, "", "")
            .respond(
                "workspace",
                1,
                "",
                "Workspace \"demo-foundation-dev\" already exists",
            );
        let provider = TerraformProvider::new(Arc::new(runner));

        assert!(matches!(
            provider.create_stack(&request()).await,
            Err(ProviderError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn failed_first_apply_is_not_healthy() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .respond("init", 0, "", "")
                .respond("workspace", 0, "Created and switched", "")
                .respond("apply", 1, "", "Error: quota exceeded\n")
                .respond("workspace", 0, "", "")
                .respond("state", 0, "aws_s3_bucket.lake\n", "")
                .respond("output", 0, "{}", ""),
        );
        let provider = TerraformProvider::new(runner.clone());

        let handle = provider.create_stack(&request()).await.unwrap();
        assert!(matches!(
            wait(&provider, &handle).await,
            OperationStatus::Failed(_)
        ));

        let StackDescription::Present(state) = provider.describe_stack(&target()).await.unwrap()
        else {
            panic!("expected the workspace to exist");
        };
        assert_eq!(state.health, StackHealth::Failed);
        assert_eq!(state.status, "APPLY_FAILED");
    }

    #[tokio::test]
    async fn successful_apply_clears_earlier_failure() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .respond("init", 0, "", "")
                .respond("workspace", 0, "", "")
                .respond("plan", 2, "", "")
                .respond("apply", 1, "", "Error: quota exceeded\n")
                .respond("workspace", 0, "", "")
                .respond("plan", 2, "", "")
                .respond("apply", 0, "Apply complete!", "")
                .respond("workspace", 0, "", "")
                .respond("state", 0, "aws_s3_bucket.lake\n", "")
                .respond("output", 0, "{}", ""),
        );
        let provider = TerraformProvider::new(runner.clone());

        for expected_success in [false, true] {
            let UpdateOutcome::Started(handle) = provider.update_stack(&request()).await.unwrap()
            else {
                panic!("expected an apply to start");
            };
            let status = wait(&provider, &handle).await;
            assert_eq!(status == OperationStatus::Succeeded, expected_success);
        }

        let StackDescription::Present(state) = provider.describe_stack(&target()).await.unwrap()
        else {
            panic!("expected the workspace to exist");
        };
        assert_eq!(state.health, StackHealth::Stable);
    }

    #[tokio::test]
    async fn empty_state_is_not_healthy() {
        let runner = ScriptedRunner::default()
            .respond("init", 0, "", "")
            .respond("workspace", 0, "", "")
            .respond("state", 0, "", "")
            .respond("output", 0, "{}", "");
        let provider = TerraformProvider::new(Arc::new(runner));

        let StackDescription::Present(state) = provider.describe_stack(&target()).await.unwrap()
        else {
            panic!("expected the workspace to exist");
        };
        assert_eq!(state.health, StackHealth::Failed);
        assert_eq!(state.status, "EMPTY");
    }
}
