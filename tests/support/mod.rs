// ABOUTME: Test support utilities.
// ABOUTME: Provides a scripted stack provider, a recording approval gate and repository fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Once;
use std::time::Duration;

use strata::catalog::{ContextField, ParameterValue, StackCatalog, StackDefinition};
use strata::context::{BuildIdentity, RunContext};
use strata::detect::ResolvedSource;
use strata::executor::{ApprovalDecision, ApprovalGate, ApprovalRequest, ExecutionOptions};
use strata::plan::{DeploymentPlan, PlanOptions, plan};
use strata::provider::{
    OperationHandle, OperationKind, OperationStatus, Outputs, ProviderError, RetryPolicy,
    StackDescription, StackEvent, StackHealth, StackProvider, StackRequest, StackState,
    StackTarget, UpdateOutcome,
};
use strata::types::{
    CloudProvider, DeploymentType, Environment, IacSource, MonitoringLevel, StackName,
};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("strata=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn name(s: &str) -> StackName {
    StackName::new(s).unwrap()
}

// =============================================================================
// Fake provider
// =============================================================================

/// A provider call, by physical stack name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Describe(String),
    Create(String),
    Update(String),
    Poll(String),
    Events(String),
}

#[derive(Default)]
struct FakeState {
    /// Deployed stacks and the parameters they were last deployed with.
    deployed: HashMap<String, BTreeMap<String, String>>,
    /// Outputs each stack reports once deployed.
    outputs: HashMap<String, Outputs>,
    describe_script: HashMap<String, VecDeque<StackDescription>>,
    poll_script: HashMap<String, VecDeque<OperationStatus>>,
    create_errors: HashMap<String, ProviderError>,
    /// Remaining throttled describe and create calls per stack.
    throttled_describes: HashMap<String, usize>,
    throttled_creates: HashMap<String, usize>,
    stuck: HashSet<String>,
    events_fail: bool,
    calls: Vec<Call>,
    requests: Vec<StackRequest>,
}

/// In-memory stack provider with scripted answers and a call log.
///
/// Unscripted stacks behave like a well-behaved provider: creates and updates
/// succeed on the first poll and re-deploying identical parameters reports no
/// updates.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outputs the stack reports once deployed.
    pub fn with_outputs(self, physical_name: &str, outputs: &[(&str, &str)]) -> Self {
        self.state.lock().outputs.insert(
            physical_name.to_string(),
            outputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    /// Mark a stack as already deployed with the given parameters.
    pub fn with_deployed(self, physical_name: &str, parameters: &[(&str, &str)]) -> Self {
        self.state.lock().deployed.insert(
            physical_name.to_string(),
            parameters
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    /// Answers for the next describe calls, before falling back to real state.
    pub fn script_describe(self, physical_name: &str, answers: Vec<StackDescription>) -> Self {
        self.state
            .lock()
            .describe_script
            .insert(physical_name.to_string(), answers.into());
        self
    }

    /// Answers for the next poll calls; `Succeeded` once exhausted.
    pub fn script_poll(self, physical_name: &str, answers: Vec<OperationStatus>) -> Self {
        self.state
            .lock()
            .poll_script
            .insert(physical_name.to_string(), answers.into());
        self
    }

    pub fn fail_create(self, physical_name: &str, error: ProviderError) -> Self {
        self.state
            .lock()
            .create_errors
            .insert(physical_name.to_string(), error);
        self
    }

    /// The next `times` describe calls for the stack are throttled.
    pub fn throttle_describe(self, physical_name: &str, times: usize) -> Self {
        self.state
            .lock()
            .throttled_describes
            .insert(physical_name.to_string(), times);
        self
    }

    /// The next `times` create calls for the stack are throttled.
    pub fn throttle_create(self, physical_name: &str, times: usize) -> Self {
        self.state
            .lock()
            .throttled_creates
            .insert(physical_name.to_string(), times);
        self
    }

    /// Operations on this stack never finish.
    pub fn stuck(self, physical_name: &str) -> Self {
        self.state.lock().stuck.insert(physical_name.to_string());
        self
    }

    pub fn failing_events(self) -> Self {
        self.state.lock().events_fail = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn requests(&self) -> Vec<StackRequest> {
        self.state.lock().requests.clone()
    }

    /// Create and update calls made for a stack.
    pub fn mutations(&self, physical_name: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| {
                matches!(c, Call::Create(n) | Call::Update(n) if n == physical_name)
            })
            .count()
    }

    pub fn total_mutations(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Create(_) | Call::Update(_)))
            .count()
    }

    pub fn describes(&self, physical_name: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Describe(n) if n == physical_name))
            .count()
    }

    fn throttled(remaining: &mut HashMap<String, usize>, physical_name: &str) -> bool {
        match remaining.get_mut(physical_name) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    fn present(state: &FakeState, physical_name: &str) -> StackDescription {
        StackDescription::Present(StackState {
            status: "CREATE_COMPLETE".to_string(),
            health: StackHealth::Stable,
            outputs: state.outputs.get(physical_name).cloned().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl StackProvider for FakeProvider {
    async fn describe_stack(
        &self,
        target: &StackTarget,
    ) -> Result<StackDescription, ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Describe(target.name.clone()));
        if Self::throttled(&mut state.throttled_describes, &target.name) {
            return Err(ProviderError::Transient("Rate exceeded".to_string()));
        }

        if let Some(answer) = state
            .describe_script
            .get_mut(&target.name)
            .and_then(VecDeque::pop_front)
        {
            return Ok(answer);
        }
        if state.deployed.contains_key(&target.name) {
            Ok(Self::present(&state, &target.name))
        } else {
            Ok(StackDescription::Absent)
        }
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<OperationHandle, ProviderError> {
        let mut state = self.state.lock();
        let stack = request.target.name.clone();
        state.calls.push(Call::Create(stack.clone()));
        state.requests.push(request.clone());

        if Self::throttled(&mut state.throttled_creates, &stack) {
            return Err(ProviderError::Transient("Rate exceeded".to_string()));
        }
        if let Some(error) = state.create_errors.get(&stack) {
            return Err(error.clone());
        }
        if state.deployed.contains_key(&stack) {
            return Err(ProviderError::AlreadyExists(stack));
        }
        state.deployed.insert(stack.clone(), request.parameters.clone());

        Ok(OperationHandle {
            id: format!("create/{stack}"),
            stack_name: stack,
            kind: OperationKind::Create,
        })
    }

    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateOutcome, ProviderError> {
        let mut state = self.state.lock();
        let stack = request.target.name.clone();
        state.calls.push(Call::Update(stack.clone()));
        state.requests.push(request.clone());

        let unchanged = match state.deployed.get(&stack) {
            None => return Err(ProviderError::Rejected(format!("{stack} does not exist"))),
            Some(current) => *current == request.parameters,
        };
        if unchanged {
            return Ok(UpdateOutcome::NoUpdates);
        }

        state.deployed.insert(stack.clone(), request.parameters.clone());
        Ok(UpdateOutcome::Started(OperationHandle {
            id: format!("update/{stack}"),
            stack_name: stack,
            kind: OperationKind::Update,
        }))
    }

    async fn poll_operation(
        &self,
        handle: &OperationHandle,
    ) -> Result<OperationStatus, ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Poll(handle.stack_name.clone()));

        if state.stuck.contains(&handle.stack_name) {
            return Ok(OperationStatus::InProgress);
        }
        Ok(state
            .poll_script
            .get_mut(&handle.stack_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(OperationStatus::Succeeded))
    }

    async fn recent_events(
        &self,
        target: &StackTarget,
        limit: usize,
    ) -> Result<Vec<StackEvent>, ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Events(target.name.clone()));
        if state.events_fail {
            return Err(ProviderError::Transient("events unavailable".to_string()));
        }
        Ok(vec![
            StackEvent {
                timestamp: None,
                resource_type: "AWS::S3::Bucket".to_string(),
                logical_id: "DataLake".to_string(),
                status: "CREATE_FAILED".to_string(),
                reason: Some("bucket name taken".to_string()),
            };
            limit.min(2)
        ])
    }
}

// =============================================================================
// Approval
// =============================================================================

/// Answers every approval request with a fixed decision and records the requests.
pub struct RecordingApproval {
    decision: ApprovalDecision,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl RecordingApproval {
    pub fn approving() -> Self {
        Self::new(ApprovalDecision::Approved)
    }

    pub fn denying() -> Self {
        Self::new(ApprovalDecision::Denied)
    }

    fn new(decision: ApprovalDecision) -> Self {
        Self {
            decision,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ApprovalGate for RecordingApproval {
    async fn request(&self, request: &ApprovalRequest) -> ApprovalDecision {
        self.requests.lock().push(request.clone());
        self.decision
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Template directory used by fixture repositories.
pub const TEMPLATE_DIR: &str = "cfn";

pub fn source() -> ResolvedSource {
    ResolvedSource {
        provider: CloudProvider::Aws,
        iac_source: IacSource::CloudFormation,
        template_dir: TEMPLATE_DIR.into(),
    }
}

pub fn context(repo: &Path, environment: Environment, deployment_type: DeploymentType) -> RunContext {
    RunContext {
        environment,
        region: "us-east-1".to_string(),
        project_name: "demo".to_string(),
        deployment_type,
        monitoring_level: MonitoringLevel::Standard,
        repo_root: repo.to_path_buf(),
        build: BuildIdentity {
            build_id: Some("7".to_string()),
            commit: None,
            triggered_by: "tester".to_string(),
            host: "localhost".to_string(),
        },
    }
}

fn definition(
    stack: &str,
    group: DeploymentType,
    references: &[(&str, &str, &str)],
) -> StackDefinition {
    let mut parameters = BTreeMap::from([(
        "Environment".to_string(),
        ParameterValue::context(ContextField::Environment),
    )]);
    for (parameter, dep, output) in references {
        parameters.insert(parameter.to_string(), ParameterValue::output(name(dep), *output));
    }
    StackDefinition {
        name: name(stack),
        template: format!("{stack}.yaml").into(),
        parameters,
        capabilities: vec![],
        group,
    }
}

/// foundation; glue consumes foundation.bucket; athena consumes foundation.bucket and glue.database.
pub fn scenario_catalog() -> StackCatalog {
    StackCatalog::new(vec![
        definition("foundation", DeploymentType::Foundation, &[]),
        definition(
            "glue",
            DeploymentType::Glue,
            &[("Bucket", "foundation", "bucket")],
        ),
        definition(
            "athena",
            DeploymentType::Athena,
            &[
                ("Bucket", "foundation", "bucket"),
                ("Database", "glue", "database"),
            ],
        ),
    ])
}

/// Provider outputs matching [`scenario_catalog`] in the dev environment.
pub fn scenario_provider() -> FakeProvider {
    FakeProvider::new()
        .with_outputs("demo-foundation-dev", &[("bucket", "lake-dev")])
        .with_outputs("demo-glue-dev", &[("database", "f1_dev")])
        .with_outputs("demo-athena-dev", &[("workgroup", "wg-dev")])
}

/// A repository with a template file for every stack in the catalog.
pub fn repo_with_templates(catalog: &StackCatalog) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let templates = dir.path().join(TEMPLATE_DIR);
    std::fs::create_dir_all(&templates).unwrap();
    for stack in catalog.stacks() {
        std::fs::write(templates.join(&stack.template), "Resources: {}\n").unwrap();
    }
    dir
}

/// Execution options with millisecond waits and no retries.
pub fn fast_options() -> ExecutionOptions {
    ExecutionOptions {
        dry_run: false,
        requires_approval: false,
        timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
        retry: RetryPolicy::none(),
    }
}

/// Context and plan for the scenario catalog in `repo`.
pub fn scenario_plan(
    repo: &Path,
    environment: Environment,
    deployment_type: DeploymentType,
) -> (RunContext, DeploymentPlan) {
    let ctx = context(repo, environment, deployment_type);
    let plan = plan(&scenario_catalog(), &source(), &ctx, &PlanOptions::default()).unwrap();
    (ctx, plan)
}
