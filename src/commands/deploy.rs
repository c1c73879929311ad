// ABOUTME: Deploy command implementation.
// ABOUTME: Wires the provider, approval gate and event sinks, runs the plan and writes the manifest.

use std::sync::Arc;

use strata::config::FEATURE_POST_DEPLOY_VALIDATION;
use strata::context::BuildIdentity;
use strata::error::{Error, Result};
use strata::events::{EventBus, JsonLinesSink, LifecycleEvent, TracingSink};
use strata::executor::{
    ApprovalGate, AutoApprove, Cancellation, ExecutionOptions, StackExecutor, interactive_gate,
};
use strata::orchestrator::Orchestrator;
use strata::output::Output;
use strata::report::{RunMetadata, finalize};
use strata::validate::validate_stacks;

use super::prepare::prepare;
use crate::cli::DeployArgs;

const DEFAULT_MANIFEST: &str = "target/strata/manifest.json";

pub async fn deploy(args: DeployArgs, cancellation: Cancellation, mut output: Output) -> Result<()> {
    output.start_timer();

    let mut build = BuildIdentity::from_env();
    if let Some(build_id) = args.build_id {
        build.build_id = Some(build_id);
    }
    if let Some(commit) = args.commit {
        build.commit = Some(commit);
    }
    if let Some(triggered_by) = args.triggered_by {
        build.triggered_by = triggered_by;
    }

    let mut prepared = prepare(&args.target, build, &output)?;
    let provider = prepared.provider();

    let options = ExecutionOptions::from_config(&prepared.config, args.dry_run, args.auto_approve);
    let approval: Arc<dyn ApprovalGate> = if options.requires_approval {
        interactive_gate()
    } else {
        Arc::new(AutoApprove)
    };
    let retry = options.retry.clone();
    let executor = StackExecutor::new(Arc::clone(&provider), approval, options)
        .with_cancellation(cancellation);

    let mut events = EventBus::new().with_sink(TracingSink);
    if let Some(path) = &prepared.config.notifications.events_file {
        events = events.with_sink(JsonLinesSink::new(args.target.repo.join(path)));
    }

    if args.dry_run {
        output.progress("Dry run: the provider will not be contacted");
    }

    let orchestrator = Orchestrator::new(executor, events);
    let results = orchestrator
        .run(&prepared.plan, &prepared.ctx, &mut prepared.diag)
        .await?;
    for result in &results {
        output.stack_result(result);
    }

    let metadata = RunMetadata::new(&prepared.ctx, &prepared.source, args.dry_run);
    let mut manifest = finalize(results, metadata);

    if manifest.succeeded()
        && !args.dry_run
        && prepared
            .config
            .feature_enabled(FEATURE_POST_DEPLOY_VALIDATION)
    {
        output.progress("Validating deployed stacks...");
        let report = validate_stacks(provider.as_ref(), &prepared.plan, &retry).await;
        manifest = manifest.with_validation(report);
    }

    orchestrator.events().publish(
        &LifecycleEvent::DeploymentFinished {
            manifest: Box::new(manifest.clone()),
        },
        &mut prepared.diag,
    );

    let manifest_path = args
        .manifest
        .unwrap_or_else(|| args.target.repo.join(DEFAULT_MANIFEST));
    manifest.write_manifest(&manifest_path)?;
    output.progress(&format!("Manifest written to {}", manifest_path.display()));

    for warning in prepared.diag.warnings() {
        output.warning(&warning.message);
    }

    if let Some(validation) = &manifest.validation
        && !validation.all_passed()
    {
        return Err(Error::ValidationFailed {
            failed: validation.failed.len(),
        });
    }
    if !manifest.succeeded() {
        let failed = manifest.results.iter().filter(|r| !r.is_success()).count();
        return Err(Error::StacksFailed { failed });
    }

    output.success(&format!(
        "Deployed {} stack(s) to {}",
        manifest.results.len(),
        prepared.ctx.environment
    ));
    Ok(())
}
