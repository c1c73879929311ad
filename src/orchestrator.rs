// ABOUTME: Run driver: seeds external outputs, executes planned stacks in order, feeds outputs forward.
// ABOUTME: After the first failure the remaining stacks are marked as upstream failures, not attempted.

use snafu::Snafu;
use std::time::Duration;

use crate::context::RunContext;
use crate::diagnostics::Diagnostics;
use crate::events::{EventBus, LifecycleEvent};
use crate::executor::{OutputStore, StackExecutor, StackFailure, StackRunResult};
use crate::plan::DeploymentPlan;
use crate::provider::{ProviderError, StackTarget};
use crate::types::StackName;

/// Failures that stop a run before any stack is mutated.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum OrchestrationError {
    #[snafu(display(
        "stack {stack} ({physical_name}) is required by {required_by} but does not exist"
    ))]
    ExternalDependencyMissing {
        stack: StackName,
        physical_name: String,
        required_by: String,
    },

    #[snafu(display("failed to read outputs of {stack}: {source}"))]
    ExternalDependencyLookup {
        stack: StackName,
        source: ProviderError,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationErrorKind {
    /// An excluded stack that planned stacks depend on is not deployed.
    MissingDependency,
    /// The provider could not be asked about an excluded stack.
    ProviderUnavailable,
}

impl OrchestrationError {
    pub fn kind(&self) -> OrchestrationErrorKind {
        match self {
            OrchestrationError::ExternalDependencyMissing { .. } => {
                OrchestrationErrorKind::MissingDependency
            }
            OrchestrationError::ExternalDependencyLookup { .. } => {
                OrchestrationErrorKind::ProviderUnavailable
            }
        }
    }
}

pub struct Orchestrator {
    executor: StackExecutor,
    events: EventBus,
}

impl Orchestrator {
    pub fn new(executor: StackExecutor, events: EventBus) -> Self {
        Self { executor, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Execute a plan. Stack failures are results, not errors.
    ///
    /// # Errors
    ///
    /// Fails only when an external dependency's outputs cannot be read, which
    /// happens before any stack is touched.
    pub async fn run(
        &self,
        plan: &DeploymentPlan,
        ctx: &RunContext,
        diag: &mut Diagnostics,
    ) -> Result<Vec<StackRunResult>, OrchestrationError> {
        self.events.publish(
            &LifecycleEvent::DeploymentStarted {
                environment: ctx.environment,
                triggered_by: ctx.build.triggered_by.clone(),
            },
            diag,
        );

        let mut outputs = OutputStore::new();
        if !self.executor.options().dry_run {
            self.seed_external_outputs(plan, &mut outputs).await?;
        }

        let total = plan.stacks.len();
        let mut results = Vec::with_capacity(total);
        let mut upstream: Option<StackName> = None;

        for (index, stack) in plan.stacks.iter().enumerate() {
            let result = if let Some(failed) = &upstream {
                tracing::info!("skipping {}: {} failed", stack.name(), failed);
                StackRunResult::failed(
                    stack,
                    None,
                    StackFailure::UpstreamFailure {
                        upstream: failed.clone(),
                    },
                    Duration::ZERO,
                )
            } else if self.executor.cancellation().is_cancelled() {
                StackRunResult::failed(stack, None, StackFailure::Cancelled, Duration::ZERO)
            } else {
                tracing::info!(
                    "deploying stack {}/{}: {} ({})",
                    index + 1,
                    total,
                    stack.name(),
                    stack.physical_name
                );
                self.executor.execute(stack, &outputs, ctx, diag).await
            };

            if result.is_success() {
                outputs.insert(result.stack_name.clone(), result.outputs.clone());
            } else if upstream.is_none() {
                upstream = Some(result.stack_name.clone());
            }

            self.events.publish(
                &LifecycleEvent::StackCompleted {
                    stack_name: result.stack_name.clone(),
                    action: result.action,
                    status: result.status,
                    outputs: result.outputs.clone(),
                },
                diag,
            );
            results.push(result);
        }

        Ok(results)
    }

    async fn seed_external_outputs(
        &self,
        plan: &DeploymentPlan,
        outputs: &mut OutputStore,
    ) -> Result<(), OrchestrationError> {
        for external in &plan.external_dependencies {
            let target = StackTarget {
                name: external.physical_name.clone(),
                template: external.template_path.clone(),
            };
            let found = self
                .executor
                .read_outputs(&target)
                .await
                .map_err(|source| OrchestrationError::ExternalDependencyLookup {
                    stack: external.name.clone(),
                    source,
                })?;

            match found {
                Some(stack_outputs) => {
                    tracing::debug!(
                        "read {} outputs of {}",
                        stack_outputs.len(),
                        external.physical_name
                    );
                    outputs.insert(external.name.clone(), stack_outputs);
                }
                None => {
                    return Err(OrchestrationError::ExternalDependencyMissing {
                        stack: external.name.clone(),
                        physical_name: external.physical_name.clone(),
                        required_by: external
                            .required_by
                            .iter()
                            .map(StackName::as_str)
                            .collect::<Vec<_>>()
                            .join(", "),
                    });
                }
            }
        }
        Ok(())
    }
}
