// ABOUTME: Validate command implementation.
// ABOUTME: Checks that every planned stack exists at the provider and is healthy.

use strata::context::BuildIdentity;
use strata::error::{Error, Result};
use strata::output::Output;
use strata::validate::validate_stacks;

use super::prepare::prepare;
use crate::cli::TargetArgs;

pub async fn validate(args: TargetArgs, mut output: Output) -> Result<()> {
    output.start_timer();
    let prepared = prepare(&args, BuildIdentity::from_env(), &output)?;
    let provider = prepared.provider();

    let report = validate_stacks(
        provider.as_ref(),
        &prepared.plan,
        &prepared.config.deployment.retry,
    )
    .await;

    output.data(&report);
    for check in &report.passed {
        output.progress(&format!("  ✓ {}: {}", check.physical_name, check.status));
    }
    for check in &report.failed {
        output.progress(&format!("  ✗ {}: {}", check.physical_name, check.status));
    }

    if !report.all_passed() {
        return Err(Error::ValidationFailed {
            failed: report.failed.len(),
        });
    }

    output.success(&format!("{} stack(s) healthy", report.checked()));
    Ok(())
}
