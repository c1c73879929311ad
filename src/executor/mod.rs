// ABOUTME: Per-stack create/update/converge execution using the type state pattern.
// ABOUTME: Exports the executor, its options, result types and the approval gate.

mod approval;
mod binding;
mod error;
mod result;
mod state;
mod transitions;

pub use approval::{
    ApprovalDecision, ApprovalGate, ApprovalRequest, AutoApprove, DenyApproval, PromptApproval,
    interactive_gate,
};
pub use binding::{OutputStore, bind, preview};
pub use error::StackFailure;
pub use result::{StackAction, StackRunResult, StackStatus};
pub use state::{Converged, Converging, Creating, Planned, Updating, Verified};
pub use transitions::{Existence, StackRun, UpdateSubmission};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::Config;
use crate::context::RunContext;
use crate::diagnostics::{Diagnostics, Warning};
use crate::plan::PlannedStack;
use crate::provider::{
    Outputs, ProviderError, RetryPolicy, StackDescription, StackProvider, StackRequest,
    StackTarget,
};
use transitions::ProviderCalls;

/// Recent provider events logged when a stack fails.
const FAILURE_EVENT_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub dry_run: bool,
    /// Whether stacks wait for the approval gate before any mutation.
    pub requires_approval: bool,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            requires_approval: false,
            timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl ExecutionOptions {
    /// Options from configuration. `auto_approve` lifts the approval requirement.
    pub fn from_config(config: &Config, dry_run: bool, auto_approve: bool) -> Self {
        Self {
            dry_run,
            requires_approval: config.requires_approval() && !auto_approve,
            timeout: config.deployment.timeout,
            poll_interval: config.deployment.poll_interval,
            retry: config.deployment.retry.clone(),
        }
    }
}

/// Cooperative cancellation signal, fed by Ctrl-C in the binary.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    receiver: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    pub fn new(receiver: watch::Receiver<bool>) -> Self {
        Self {
            receiver: Some(receiver),
        }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested; never if the sender is gone.
    pub async fn cancelled(&mut self) {
        if let Some(rx) = &mut self.receiver
            && rx.wait_for(|cancelled| *cancelled).await.is_ok()
        {
            return;
        }
        std::future::pending::<()>().await
    }
}

/// Drives one planned stack at a time through the create/update state machine.
pub struct StackExecutor {
    provider: Arc<dyn StackProvider>,
    approval: Arc<dyn ApprovalGate>,
    cancellation: Cancellation,
    options: ExecutionOptions,
}

impl StackExecutor {
    pub fn new(
        provider: Arc<dyn StackProvider>,
        approval: Arc<dyn ApprovalGate>,
        options: ExecutionOptions,
    ) -> Self {
        Self {
            provider,
            approval,
            cancellation: Cancellation::never(),
            options,
        }
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Current outputs of a stack at the provider, `None` when it does not exist.
    pub async fn read_outputs(
        &self,
        target: &StackTarget,
    ) -> Result<Option<Outputs>, ProviderError> {
        Ok(match self.calls().describe(target).await? {
            StackDescription::Present(state) => Some(state.outputs),
            StackDescription::Absent => None,
        })
    }

    fn calls(&self) -> ProviderCalls<'_> {
        ProviderCalls {
            provider: self.provider.as_ref(),
            retry: &self.options.retry,
        }
    }

    /// Execute one stack against the outputs gathered so far.
    ///
    /// Never returns an error: every failure is recorded in the result.
    pub async fn execute(
        &self,
        stack: &PlannedStack,
        outputs: &OutputStore,
        ctx: &RunContext,
        diag: &mut Diagnostics,
    ) -> StackRunResult {
        let started = Instant::now();

        if self.options.dry_run {
            let parameters = preview(&stack.definition, outputs, ctx);
            tracing::info!(
                "[dry-run] would deploy {} from {}",
                stack.physical_name,
                stack.template_path.display()
            );
            for (name, value) in &parameters {
                tracing::info!("[dry-run]   {} = {}", name, value);
            }
            return StackRunResult::succeeded(
                stack,
                StackAction::NoChange,
                Outputs::new(),
                started.elapsed(),
            );
        }

        let mut attempted = None;
        match self.drive(stack, outputs, ctx, &mut attempted).await {
            Ok((action, stack_outputs)) => {
                StackRunResult::succeeded(stack, action, stack_outputs, started.elapsed())
            }
            Err(failure) => {
                tracing::error!("{} failed: {}", stack.physical_name, failure);
                if failure.after_mutation() {
                    self.log_recent_events(stack, diag).await;
                }
                StackRunResult::failed(stack, attempted, failure, started.elapsed())
            }
        }
    }

    async fn drive(
        &self,
        stack: &PlannedStack,
        outputs: &OutputStore,
        ctx: &RunContext,
        attempted: &mut Option<StackAction>,
    ) -> Result<(StackAction, Outputs), StackFailure> {
        let calls = self.calls();
        let run = StackRun::new(stack).verify_template()?;
        let parameters = bind(&stack.definition, outputs, ctx)?;

        let request = StackRequest {
            target: run.target(),
            parameters,
            capabilities: stack.definition.capabilities.clone(),
        };

        let existence = run.check_exists(calls).await?;
        let action = match &existence {
            Existence::Present(_) => StackAction::Update,
            Existence::Absent(_) => StackAction::Create,
        };

        if self.options.requires_approval {
            self.approve(stack, action, ctx).await?;
        }

        *attempted = Some(action);
        let converging = match existence {
            Existence::Absent(run) => run.submit(calls, &request).await?,
            Existence::Present(run) => match run.submit(calls, &request).await? {
                UpdateSubmission::NoChange(converged) => {
                    *attempted = Some(converged.action());
                    return converged
                        .collect_outputs(calls, self.options.poll_interval)
                        .await;
                }
                UpdateSubmission::Started(converging) => converging,
            },
        };

        let converged = converging
            .converge(
                calls,
                self.options.poll_interval,
                self.options.timeout,
                self.cancellation.clone(),
            )
            .await?;
        converged
            .collect_outputs(calls, self.options.poll_interval)
            .await
    }

    async fn approve(
        &self,
        stack: &PlannedStack,
        action: StackAction,
        ctx: &RunContext,
    ) -> Result<(), StackFailure> {
        let request = ApprovalRequest {
            stack: stack.name().clone(),
            physical_name: stack.physical_name.clone(),
            action,
            environment: ctx.environment,
        };
        match self.approval.request(&request).await {
            ApprovalDecision::Approved => {
                tracing::info!("{} approved", stack.physical_name);
                Ok(())
            }
            ApprovalDecision::Denied => Err(StackFailure::ApprovalDenied),
        }
    }

    async fn log_recent_events(&self, stack: &PlannedStack, diag: &mut Diagnostics) {
        let target = StackTarget {
            name: stack.physical_name.clone(),
            template: stack.template_path.clone(),
        };
        match self
            .provider
            .recent_events(&target, FAILURE_EVENT_LIMIT)
            .await
        {
            Ok(events) => {
                for event in events {
                    tracing::error!(
                        "  {} {} {}: {}",
                        event.logical_id,
                        event.resource_type,
                        event.status,
                        event.reason.as_deref().unwrap_or("-")
                    );
                }
            }
            Err(e) => diag.warn(Warning::provider_events(format!(
                "could not read events for {}: {}",
                stack.physical_name, e
            ))),
        }
    }
}
