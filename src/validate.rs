// ABOUTME: Post-deploy infrastructure validation of every planned stack.
// ABOUTME: A stack passes when it exists and its provider status is stable.

use serde::Serialize;

use crate::plan::DeploymentPlan;
use crate::provider::{RetryPolicy, StackDescription, StackHealth, StackProvider, StackTarget};
use crate::types::StackName;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackCheck {
    pub stack_name: StackName,
    pub physical_name: String,
    /// Provider status, `NOT_FOUND`, or the error that prevented the check.
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub passed: Vec<StackCheck>,
    pub failed: Vec<StackCheck>,
}

impl ValidationReport {
    pub fn all_passed(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn checked(&self) -> usize {
        self.passed.len() + self.failed.len()
    }
}

/// Check every planned stack at the provider.
pub async fn validate_stacks(
    provider: &dyn StackProvider,
    plan: &DeploymentPlan,
    retry: &RetryPolicy,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for stack in plan.stacks.iter() {
        let target = StackTarget {
            name: stack.physical_name.clone(),
            template: stack.template_path.clone(),
        };
        let described = retry
            .run("describe_stack", || provider.describe_stack(&target))
            .await;

        let (healthy, status) = match described {
            Ok(StackDescription::Present(state)) => {
                (state.health == StackHealth::Stable, state.status)
            }
            Ok(StackDescription::Absent) => (false, "NOT_FOUND".to_string()),
            Err(e) => (false, format!("ERROR - {e}")),
        };

        let check = StackCheck {
            stack_name: stack.name().clone(),
            physical_name: stack.physical_name.clone(),
            status,
        };
        if healthy {
            tracing::info!("{}: {}", check.physical_name, check.status);
            report.passed.push(check);
        } else {
            tracing::warn!("{}: {}", check.physical_name, check.status);
            report.failed.push(check);
        }
    }

    report
}
