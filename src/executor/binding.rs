// ABOUTME: Parameter binding against the run context and prior stack outputs.
// ABOUTME: Holds the output accumulator the orchestrator fills as stacks converge.

use std::collections::BTreeMap;

use super::StackFailure;
use crate::catalog::{ContextField, ParameterValue, StackDefinition};
use crate::context::RunContext;
use crate::provider::Outputs;
use crate::types::StackName;

/// Outputs of every stack that has converged (or was read) so far in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputStore {
    stacks: BTreeMap<StackName, Outputs>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stack's outputs, replacing any earlier values for it.
    pub fn insert(&mut self, stack: StackName, outputs: Outputs) {
        self.stacks.insert(stack, outputs);
    }

    pub fn get(&self, stack: &StackName, output: &str) -> Option<&str> {
        self.stacks
            .get(stack)
            .and_then(|outputs| outputs.get(output))
            .map(String::as_str)
    }
}

fn context_value(ctx: &RunContext, field: ContextField) -> String {
    match field {
        ContextField::Environment => ctx.environment.to_string(),
        ContextField::ProjectName => ctx.project_name.clone(),
        ContextField::Region => ctx.region.clone(),
        ContextField::MonitoringLevel => ctx.monitoring_level.to_string(),
    }
}

/// Resolve every parameter of a stack to a concrete string.
pub fn bind(
    definition: &StackDefinition,
    outputs: &OutputStore,
    ctx: &RunContext,
) -> Result<BTreeMap<String, String>, StackFailure> {
    definition
        .parameters
        .iter()
        .map(|(name, value)| {
            let bound = match value {
                ParameterValue::Literal(s) => s.clone(),
                ParameterValue::Context { context } => context_value(ctx, *context),
                ParameterValue::Output { stack, output } => outputs
                    .get(stack, output)
                    .map(str::to_string)
                    .ok_or_else(|| StackFailure::UnresolvedReference {
                        parameter: name.clone(),
                        stack: stack.clone(),
                        output: output.clone(),
                    })?,
            };
            Ok((name.clone(), bound))
        })
        .collect()
}

/// Like [`bind`], but unresolved references render as `<stack.output>`.
pub fn preview(
    definition: &StackDefinition,
    outputs: &OutputStore,
    ctx: &RunContext,
) -> BTreeMap<String, String> {
    definition
        .parameters
        .iter()
        .map(|(name, value)| {
            let bound = match value {
                ParameterValue::Output { stack, output } => outputs
                    .get(stack, output)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("<{stack}.{output}>")),
                ParameterValue::Literal(s) => s.clone(),
                ParameterValue::Context { context } => context_value(ctx, *context),
            };
            (name.clone(), bound)
        })
        .collect()
}
