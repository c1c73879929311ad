// ABOUTME: Planning errors, all raised before any provider call.
// ABOUTME: Cycles and dangling output references are caught here, never at run time.

use thiserror::Error;

use crate::types::{DeploymentType, StackName};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Stacks of one dependency cycle, each depending on the next.
    #[error("cyclic dependency between stacks: {}", describe_cycle(.stacks))]
    CyclicDependency { stacks: Vec<StackName> },

    #[error("stack {stack} parameter {parameter} references unknown stack {referenced}")]
    UnknownReference {
        stack: StackName,
        parameter: String,
        referenced: StackName,
    },

    #[error("stack {0} is defined more than once")]
    DuplicateStack(StackName),

    #[error("cannot skip unknown stack {0}")]
    UnknownStack(StackName),

    #[error("no stacks to deploy for deployment type {deployment_type}")]
    EmptyPlan { deployment_type: DeploymentType },
}

fn describe_cycle(stacks: &[StackName]) -> String {
    let mut names: Vec<&str> = stacks.iter().map(StackName::as_str).collect();
    if let Some(first) = names.first().copied() {
        names.push(first);
    }
    names.join(" -> ")
}
