// ABOUTME: Plan command implementation.
// ABOUTME: Prints the ordered deployment plan without contacting the provider.

use strata::context::BuildIdentity;
use strata::error::Result;
use strata::output::Output;

use super::prepare::prepare;
use crate::cli::TargetArgs;

pub fn plan(args: TargetArgs, output: Output) -> Result<()> {
    let prepared = prepare(&args, BuildIdentity::from_env(), &output)?;
    let plan = &prepared.plan;

    output.data(plan);
    for (index, stack) in plan.stacks.iter().enumerate() {
        let deps = if stack.dependencies.is_empty() {
            String::new()
        } else {
            let names: Vec<&str> = stack.dependencies.iter().map(|d| d.as_str()).collect();
            format!(" <- {}", names.join(", "))
        };
        output.progress(&format!(
            "  {}. {} ({}){}",
            index + 1,
            stack.name(),
            stack.physical_name,
            deps
        ));
    }
    for external in &plan.external_dependencies {
        output.progress(&format!(
            "  outputs read from deployed stack {} ({})",
            external.name, external.physical_name
        ));
    }

    for warning in prepared.diag.warnings() {
        output.warning(&warning.message);
    }
    Ok(())
}
