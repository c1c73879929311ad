// ABOUTME: Manual approval gate consulted before mutating stacks in gated environments.
// ABOUTME: Provides auto-approve, interactive terminal prompt and deny-without-terminal gates.

use async_trait::async_trait;
use std::io::IsTerminal;
use std::sync::Arc;

use super::StackAction;
use crate::types::{Environment, StackName};

/// What the operator is asked to approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub stack: StackName,
    pub physical_name: String,
    pub action: StackAction,
    pub environment: Environment,
}

impl ApprovalRequest {
    fn prompt(&self) -> String {
        format!(
            "{} stack {} ({}) in {}?",
            match self.action {
                StackAction::Create => "Create",
                StackAction::Update | StackAction::NoChange => "Update",
            },
            self.stack,
            self.physical_name,
            self.environment
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn request(&self, request: &ApprovalRequest) -> ApprovalDecision;
}

/// Approves everything (`--auto-approve`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn request(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::Approved
    }
}

/// Denies everything; used when no terminal is attached to ask.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyApproval;

#[async_trait]
impl ApprovalGate for DenyApproval {
    async fn request(&self, request: &ApprovalRequest) -> ApprovalDecision {
        tracing::warn!(
            "approval required for {} but no terminal is attached, denying",
            request.physical_name
        );
        ApprovalDecision::Denied
    }
}

/// Asks on the terminal. Prompt errors count as a denial.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptApproval;

#[async_trait]
impl ApprovalGate for PromptApproval {
    async fn request(&self, request: &ApprovalRequest) -> ApprovalDecision {
        let prompt = request.prompt();
        let answer = tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(true)) => ApprovalDecision::Approved,
            Ok(Ok(false)) => ApprovalDecision::Denied,
            Ok(Err(e)) => {
                tracing::warn!("approval prompt failed: {}", e);
                ApprovalDecision::Denied
            }
            Err(e) => {
                tracing::warn!("approval prompt task failed: {}", e);
                ApprovalDecision::Denied
            }
        }
    }
}

/// Gate for an interactive run: prompt when stdin is a terminal, deny otherwise.
pub fn interactive_gate() -> Arc<dyn ApprovalGate> {
    if std::io::stdin().is_terminal() {
        Arc::new(PromptApproval)
    } else {
        Arc::new(DenyApproval)
    }
}
