// ABOUTME: Integration tests for single-stack execution against a scripted provider.
// ABOUTME: Covers idempotent re-runs, convergence failures, timeouts, approval and dry runs.

mod support;

use std::sync::Arc;
use std::time::Duration;

use strata::diagnostics::{Diagnostics, WarningKind};
use strata::executor::{
    AutoApprove, Cancellation, OutputStore, StackAction, StackExecutor, StackFailure,
    StackStatus,
};
use strata::plan::PlannedStack;
use strata::provider::{OperationStatus, ProviderError, RetryPolicy, StackDescription};
use strata::types::{DeploymentType, Environment};
use support::{
    Call, FakeProvider, RecordingApproval, fast_options, name, repo_with_templates,
    scenario_catalog, scenario_plan, scenario_provider,
};
use tokio::sync::watch;

const FOUNDATION: &str = "demo-foundation-dev";

fn foundation(plan: &strata::plan::DeploymentPlan) -> &PlannedStack {
    plan.stacks.first()
}

fn executor(provider: &Arc<FakeProvider>) -> StackExecutor {
    StackExecutor::new(provider.clone(), Arc::new(AutoApprove), fast_options())
}

// =============================================================================
// Create and update
// =============================================================================

/// Test: a new stack is created and its outputs are collected
#[tokio::test]
async fn creates_absent_stack() {
    support::init_tracing();
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(scenario_provider());

    let result = executor(&provider)
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(result.status, StackStatus::Succeeded);
    assert_eq!(result.action, Some(StackAction::Create));
    assert_eq!(result.outputs["bucket"], "lake-dev");
    assert_eq!(
        provider.calls(),
        vec![
            Call::Describe(FOUNDATION.to_string()),
            Call::Create(FOUNDATION.to_string()),
            Call::Poll(FOUNDATION.to_string()),
            Call::Describe(FOUNDATION.to_string()),
        ]
    );
    assert_eq!(provider.requests()[0].parameters["Environment"], "dev");
}

/// Test: throttled describe and create calls are retried without failing the stack
#[tokio::test]
async fn transient_errors_are_retried_within_execute() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(
        scenario_provider()
            .throttle_describe(FOUNDATION, 1)
            .throttle_create(FOUNDATION, 1),
    );
    let mut options = fast_options();
    options.retry = RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    };
    let executor = StackExecutor::new(provider.clone(), Arc::new(AutoApprove), options);

    let result = executor
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(result.status, StackStatus::Succeeded);
    assert_eq!(result.action, Some(StackAction::Create));
    assert!(result.error.is_none());
    assert_eq!(result.outputs["bucket"], "lake-dev");
    assert_eq!(
        provider.calls(),
        vec![
            Call::Describe(FOUNDATION.to_string()),
            Call::Describe(FOUNDATION.to_string()),
            Call::Create(FOUNDATION.to_string()),
            Call::Create(FOUNDATION.to_string()),
            Call::Poll(FOUNDATION.to_string()),
            Call::Describe(FOUNDATION.to_string()),
        ]
    );
}

/// Test: re-running with unchanged inputs reports no change and keeps outputs
#[tokio::test]
async fn second_run_is_no_change() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(scenario_provider());
    let executor = executor(&provider);
    let outputs = OutputStore::new();

    let first = executor
        .execute(foundation(&plan), &outputs, &ctx, &mut Diagnostics::default())
        .await;
    let second = executor
        .execute(foundation(&plan), &outputs, &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(first.action, Some(StackAction::Create));
    assert_eq!(second.status, StackStatus::Succeeded);
    assert_eq!(second.action, Some(StackAction::NoChange));
    assert_eq!(second.outputs, first.outputs);
    // The no-change update is never polled.
    assert_eq!(
        provider
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Poll(_)))
            .count(),
        1
    );
}

/// Test: changed parameters on an existing stack start an update
#[tokio::test]
async fn existing_stack_with_new_parameters_is_updated() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(scenario_provider().with_deployed(FOUNDATION, &[("Environment", "old")]));

    let result = executor(&provider)
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(result.action, Some(StackAction::Update));
    assert_eq!(result.status, StackStatus::Succeeded);
    assert_eq!(provider.mutations(FOUNDATION), 1);
    assert!(provider.calls().contains(&Call::Update(FOUNDATION.to_string())));
}

/// Test: upstream outputs are bound into downstream parameters
#[tokio::test]
async fn binds_upstream_outputs() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(scenario_provider());
    let mut outputs = OutputStore::new();
    outputs.insert(
        name("foundation"),
        [("bucket".to_string(), "lake-dev".to_string())].into(),
    );

    let result = executor(&provider)
        .execute(&plan.stacks[1], &outputs, &ctx, &mut Diagnostics::default())
        .await;

    assert!(result.is_success());
    assert_eq!(provider.requests()[0].parameters["Bucket"], "lake-dev");
}

// =============================================================================
// Failures before mutation
// =============================================================================

/// Test: a missing template fails without contacting the provider
#[tokio::test]
async fn missing_template() {
    let repo = tempfile::tempdir().unwrap();
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(scenario_provider());

    let result = executor(&provider)
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(result.status, StackStatus::Failed);
    assert_eq!(result.action, None);
    assert!(matches!(
        result.error,
        Some(StackFailure::TemplateNotFound { ref path }) if path.ends_with("cfn/foundation.yaml")
    ));
    assert!(provider.calls().is_empty());
}

/// Test: an output that was never produced fails binding before any provider call
#[tokio::test]
async fn unresolved_reference() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(scenario_provider());

    let result = executor(&provider)
        .execute(&plan.stacks[1], &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(
        result.error,
        Some(StackFailure::UnresolvedReference {
            parameter: "Bucket".to_string(),
            stack: name("foundation"),
            output: "bucket".to_string(),
        })
    );
    assert!(provider.calls().is_empty());
}

/// Test: a denied approval stops the stack before any mutation
#[tokio::test]
async fn denied_approval() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Prod, DeploymentType::Full);
    let provider = Arc::new(FakeProvider::new());
    let approval = Arc::new(RecordingApproval::denying());
    let mut options = fast_options();
    options.requires_approval = true;

    let result = StackExecutor::new(provider.clone(), approval.clone(), options)
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(result.error, Some(StackFailure::ApprovalDenied));
    assert_eq!(result.action, None);
    assert_eq!(provider.total_mutations(), 0);

    let requests = approval.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].physical_name, "demo-foundation-prod");
    assert_eq!(requests[0].action, StackAction::Create);
}

// =============================================================================
// Convergence
// =============================================================================

/// Test: a stack that never settles times out
#[tokio::test]
async fn timeout_while_converging() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(scenario_provider().stuck(FOUNDATION));

    let result = executor(&provider)
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(result.status, StackStatus::Failed);
    assert_eq!(result.action, Some(StackAction::Create));
    assert_eq!(
        result.error,
        Some(StackFailure::Timeout {
            after: Duration::from_millis(200)
        })
    );
    assert!(provider.calls().contains(&Call::Events(FOUNDATION.to_string())));
}

/// Test: a provider rollback is reported as rolled back
#[tokio::test]
async fn rolled_back() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(scenario_provider().script_poll(
        FOUNDATION,
        vec![
            OperationStatus::InProgress,
            OperationStatus::RolledBack("ROLLBACK_COMPLETE".to_string()),
        ],
    ));

    let result = executor(&provider)
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(result.status, StackStatus::RolledBack);
    assert!(matches!(result.error, Some(StackFailure::RolledBack { .. })));
}

/// Test: a failed update is distinguished from a failed create
#[tokio::test]
async fn failed_update() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(
        scenario_provider()
            .with_deployed(FOUNDATION, &[])
            .script_poll(FOUNDATION, vec![OperationStatus::Failed("bad".to_string())]),
    );

    let result = executor(&provider)
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(result.action, Some(StackAction::Update));
    assert_eq!(
        result.error,
        Some(StackFailure::UpdateFailed {
            reason: "bad".to_string()
        })
    );
}

/// Test: unreadable provider events become a warning, not a different failure
#[tokio::test]
async fn event_lookup_failure_is_a_warning() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(
        scenario_provider()
            .failing_events()
            .script_poll(FOUNDATION, vec![OperationStatus::Failed("quota".to_string())]),
    );
    let mut diag = Diagnostics::default();

    let result = executor(&provider)
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut diag)
        .await;

    assert!(matches!(result.error, Some(StackFailure::CreateFailed { .. })));
    assert_eq!(diag.warnings().len(), 1);
    assert_eq!(diag.warnings()[0].kind, WarningKind::ProviderEvents);
}

/// Test: cancellation stops waiting on the operation
#[tokio::test]
async fn cancellation_while_converging() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(scenario_provider().stuck(FOUNDATION));
    let mut options = fast_options();
    options.poll_interval = Duration::from_secs(5);
    options.timeout = Duration::from_secs(60);
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let result = StackExecutor::new(provider.clone(), Arc::new(AutoApprove), options)
        .with_cancellation(Cancellation::new(rx))
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(result.error, Some(StackFailure::Cancelled));
    assert_eq!(result.action, Some(StackAction::Create));
}

// =============================================================================
// Ambiguous provider answers
// =============================================================================

/// Test: one stale absent answer after converging is re-queried
#[tokio::test]
async fn stale_absent_is_retried_once() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(scenario_provider().script_describe(
        FOUNDATION,
        vec![StackDescription::Absent, StackDescription::Absent],
    ));

    let result = executor(&provider)
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert!(result.is_success());
    assert_eq!(result.outputs["bucket"], "lake-dev");
    assert_eq!(provider.describes(FOUNDATION), 3);
}

/// Test: a stack still absent after the re-query is ambiguous
#[tokio::test]
async fn persistently_absent_is_ambiguous() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(scenario_provider().script_describe(
        FOUNDATION,
        vec![
            StackDescription::Absent,
            StackDescription::Absent,
            StackDescription::Absent,
        ],
    ));

    let result = executor(&provider)
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(result.status, StackStatus::Failed);
    assert!(matches!(result.error, Some(StackFailure::Ambiguous { .. })));
}

/// Test: a create racing another actor is ambiguous rather than retried
#[tokio::test]
async fn already_exists_on_create_is_ambiguous() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Dev, DeploymentType::Full);
    let provider = Arc::new(scenario_provider().fail_create(
        FOUNDATION,
        ProviderError::AlreadyExists(FOUNDATION.to_string()),
    ));

    let result = executor(&provider)
        .execute(foundation(&plan), &OutputStore::new(), &ctx, &mut Diagnostics::default())
        .await;

    assert_eq!(result.action, Some(StackAction::Create));
    assert!(matches!(result.error, Some(StackFailure::Ambiguous { .. })));
    assert_eq!(provider.mutations(FOUNDATION), 1);
}

// =============================================================================
// Dry run
// =============================================================================

/// Test: a dry run never calls the provider
#[tokio::test]
async fn dry_run_makes_no_provider_calls() {
    let repo = repo_with_templates(&scenario_catalog());
    let (ctx, plan) = scenario_plan(repo.path(), Environment::Prod, DeploymentType::Full);
    let provider = Arc::new(FakeProvider::new());
    let mut options = fast_options();
    options.dry_run = true;
    options.requires_approval = true;
    let approval = Arc::new(RecordingApproval::denying());
    let executor = StackExecutor::new(provider.clone(), approval.clone(), options);

    for stack in plan.stacks.iter() {
        let result = executor
            .execute(stack, &OutputStore::new(), &ctx, &mut Diagnostics::default())
            .await;
        assert!(result.is_success());
        assert_eq!(result.action, Some(StackAction::NoChange));
    }

    assert!(provider.calls().is_empty());
    assert!(approval.requests().is_empty());
}
