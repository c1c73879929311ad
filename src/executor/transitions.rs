// ABOUTME: State transition methods for a single stack run.
// ABOUTME: Each method consumes self and returns the next state or the failure that ends the run.

use std::time::Duration;
use tokio::time::Instant;

use crate::plan::PlannedStack;
use crate::provider::{
    OperationHandle, OperationKind, OperationStatus, Outputs, ProviderError, RetryPolicy,
    StackDescription, StackHealth, StackProvider, StackRequest, StackTarget, UpdateOutcome,
};

use super::Cancellation;
use super::StackAction;
use super::error::StackFailure;
use super::state::{Converged, Converging, Creating, Planned, Updating, Verified};

/// Provider calls with transient-error retry applied to each one.
#[derive(Clone, Copy)]
pub(crate) struct ProviderCalls<'a> {
    pub(crate) provider: &'a dyn StackProvider,
    pub(crate) retry: &'a RetryPolicy,
}

impl ProviderCalls<'_> {
    pub(crate) async fn describe(
        &self,
        target: &StackTarget,
    ) -> Result<StackDescription, ProviderError> {
        self.retry
            .run("describe_stack", || self.provider.describe_stack(target))
            .await
    }

    async fn create(&self, request: &StackRequest) -> Result<OperationHandle, ProviderError> {
        self.retry
            .run("create_stack", || self.provider.create_stack(request))
            .await
    }

    async fn update(&self, request: &StackRequest) -> Result<UpdateOutcome, ProviderError> {
        self.retry
            .run("update_stack", || self.provider.update_stack(request))
            .await
    }

    async fn poll(&self, handle: &OperationHandle) -> Result<OperationStatus, ProviderError> {
        self.retry
            .run("poll_operation", || self.provider.poll_operation(handle))
            .await
    }
}

/// One stack moving through the executor, parameterized by its current state.
#[derive(Debug)]
pub struct StackRun<'a, S> {
    pub(crate) stack: &'a PlannedStack,
    pub(crate) state: S,
}

/// Outcome of the existence check.
#[derive(Debug)]
pub enum Existence<'a> {
    Present(StackRun<'a, Updating>),
    Absent(StackRun<'a, Creating>),
}

/// Outcome of submitting an update.
#[derive(Debug)]
pub enum UpdateSubmission<'a> {
    Started(StackRun<'a, Converging>),
    NoChange(StackRun<'a, Converged>),
}

impl<'a, S> StackRun<'a, S> {
    fn transition<T>(self, state: T) -> StackRun<'a, T> {
        StackRun {
            stack: self.stack,
            state,
        }
    }

    pub fn stack(&self) -> &'a PlannedStack {
        self.stack
    }

    pub(crate) fn target(&self) -> StackTarget {
        StackTarget {
            name: self.stack.physical_name.clone(),
            template: self.stack.template_path.clone(),
        }
    }
}

// =============================================================================
// Planned -> Verified
// =============================================================================

impl<'a> StackRun<'a, Planned> {
    pub fn new(stack: &'a PlannedStack) -> Self {
        StackRun {
            stack,
            state: Planned,
        }
    }

    /// Confirm the stack's template exists on disk.
    ///
    /// # Errors
    ///
    /// Returns `StackFailure::TemplateNotFound` when it does not.
    pub fn verify_template(self) -> Result<StackRun<'a, Verified>, StackFailure> {
        if !self.stack.template_path.exists() {
            return Err(StackFailure::TemplateNotFound {
                path: self.stack.template_path.clone(),
            });
        }
        Ok(self.transition(Verified))
    }
}

// =============================================================================
// Verified -> Updating | Creating
// =============================================================================

impl<'a> StackRun<'a, Verified> {
    /// Ask the provider whether the stack already exists.
    pub(crate) async fn check_exists(
        self,
        calls: ProviderCalls<'_>,
    ) -> Result<Existence<'a>, StackFailure> {
        match calls.describe(&self.target()).await? {
            StackDescription::Absent => {
                tracing::debug!("{} does not exist, will create", self.stack.physical_name);
                Ok(Existence::Absent(self.transition(Creating)))
            }
            StackDescription::Present(existing) => {
                if existing.health != StackHealth::Stable {
                    tracing::warn!(
                        "{} is {}, attempting update anyway",
                        self.stack.physical_name,
                        existing.status
                    );
                }
                Ok(Existence::Present(self.transition(Updating { existing })))
            }
        }
    }
}

// =============================================================================
// Creating -> Converging
// =============================================================================

impl<'a> StackRun<'a, Creating> {
    /// Submit the create.
    ///
    /// # Errors
    ///
    /// An "already exists" answer means another actor created the stack after
    /// the existence check; that is reported as `StackFailure::Ambiguous`.
    pub(crate) async fn submit(
        self,
        calls: ProviderCalls<'_>,
        request: &StackRequest,
    ) -> Result<StackRun<'a, Converging>, StackFailure> {
        let handle = match calls.create(request).await {
            Ok(handle) => handle,
            Err(ProviderError::AlreadyExists(reason)) => {
                return Err(StackFailure::Ambiguous { reason });
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!("creating {}", self.stack.physical_name);
        Ok(self.transition(Converging {
            action: StackAction::Create,
            handle,
        }))
    }
}

// =============================================================================
// Updating -> Converging | Converged
// =============================================================================

impl<'a> StackRun<'a, Updating> {
    pub(crate) async fn submit(
        self,
        calls: ProviderCalls<'_>,
        request: &StackRequest,
    ) -> Result<UpdateSubmission<'a>, StackFailure> {
        match calls.update(request).await? {
            UpdateOutcome::NoUpdates => {
                tracing::info!("{} is already up to date", self.stack.physical_name);
                let outputs = self.state.existing.outputs.clone();
                Ok(UpdateSubmission::NoChange(self.transition(Converged {
                    action: StackAction::NoChange,
                    outputs: Some(outputs),
                })))
            }
            UpdateOutcome::Started(handle) => {
                tracing::info!("updating {}", self.stack.physical_name);
                Ok(UpdateSubmission::Started(self.transition(Converging {
                    action: StackAction::Update,
                    handle,
                })))
            }
        }
    }
}

// =============================================================================
// Converging -> Converged
// =============================================================================

impl<'a> StackRun<'a, Converging> {
    pub fn action(&self) -> StackAction {
        self.state.action
    }

    /// Poll until the operation reaches a terminal state.
    ///
    /// No rollback is attempted on timeout or cancellation; the provider's
    /// own semantics apply to whatever is still in flight.
    pub(crate) async fn converge(
        self,
        calls: ProviderCalls<'_>,
        poll_interval: Duration,
        timeout: Duration,
        mut cancellation: Cancellation,
    ) -> Result<StackRun<'a, Converged>, StackFailure> {
        let deadline = Instant::now() + timeout;

        loop {
            match calls.poll(&self.state.handle).await? {
                OperationStatus::InProgress => {}
                OperationStatus::Succeeded => {
                    tracing::info!(
                        "{} converged ({})",
                        self.stack.physical_name,
                        self.state.action
                    );
                    let action = self.state.action;
                    return Ok(self.transition(Converged {
                        action,
                        outputs: None,
                    }));
                }
                OperationStatus::Failed(reason) => {
                    return Err(match self.state.handle.kind {
                        OperationKind::Create => StackFailure::CreateFailed { reason },
                        OperationKind::Update => StackFailure::UpdateFailed { reason },
                    });
                }
                OperationStatus::RolledBack(reason) => {
                    return Err(StackFailure::RolledBack { reason });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StackFailure::Timeout { after: timeout });
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval.min(deadline - now)) => {}
                _ = cancellation.cancelled() => {
                    tracing::warn!(
                        "stopped waiting for {}; the provider keeps converging it",
                        self.stack.physical_name
                    );
                    return Err(StackFailure::Cancelled);
                }
            }
        }
    }
}

// =============================================================================
// Converged -> outputs
// =============================================================================

impl StackRun<'_, Converged> {
    pub fn action(&self) -> StackAction {
        self.state.action
    }

    /// Read the stack's outputs.
    ///
    /// A describe right after a create can lag behind the provider; one
    /// absent answer is re-queried after `retry_after` before it counts.
    pub(crate) async fn collect_outputs(
        self,
        calls: ProviderCalls<'_>,
        retry_after: Duration,
    ) -> Result<(StackAction, Outputs), StackFailure> {
        let action = self.state.action;
        if let Some(outputs) = self.state.outputs {
            return Ok((action, outputs));
        }

        let target = self.target();
        for attempt in 0..2 {
            match calls.describe(&target).await? {
                StackDescription::Present(state) => return Ok((action, state.outputs)),
                StackDescription::Absent if attempt == 0 => {
                    tracing::debug!(
                        "{} not visible yet after {}, re-querying",
                        target.name,
                        action
                    );
                    tokio::time::sleep(retry_after).await;
                }
                StackDescription::Absent => {}
            }
        }

        Err(StackFailure::Ambiguous {
            reason: format!("{} converged but the provider reports it absent", target.name),
        })
    }
}
