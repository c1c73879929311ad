// ABOUTME: Deployment planning: catalog validation, filtering and dependency ordering.
// ABOUTME: Produces a deterministic, serializable plan or fails before anything is deployed.

mod error;
mod topo;

pub use error::PlanError;

use nonempty::NonEmpty;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::catalog::{StackCatalog, StackDefinition};
use crate::context::RunContext;
use crate::detect::ResolvedSource;
use crate::types::{DeploymentType, StackName};

/// Caller choices that narrow the catalog beyond the deployment type.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Stacks left out of this run; their outputs are read from the provider.
    pub skip: Vec<StackName>,
}

/// A stack scheduled for execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStack {
    pub definition: StackDefinition,
    pub physical_name: String,
    pub template_path: PathBuf,
    /// Stacks whose outputs this stack consumes.
    pub dependencies: Vec<StackName>,
}

impl PlannedStack {
    pub fn name(&self) -> &StackName {
        &self.definition.name
    }
}

/// A catalog stack outside this run whose outputs planned stacks consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalDependency {
    pub name: StackName,
    pub physical_name: String,
    pub template_path: PathBuf,
    pub required_by: Vec<StackName>,
}

/// Ordered, validated sequence of stacks for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentPlan {
    pub deployment_type: DeploymentType,
    pub source: ResolvedSource,
    pub stacks: NonEmpty<PlannedStack>,
    pub external_dependencies: Vec<ExternalDependency>,
}

impl DeploymentPlan {
    pub fn stack_names(&self) -> Vec<&StackName> {
        self.stacks.iter().map(PlannedStack::name).collect()
    }
}

/// Build the deployment plan for a run.
///
/// The whole catalog is validated and ordered first, so a cycle is fatal even
/// when it lies outside the selected deployment type. The selected stacks keep
/// their relative position in that order.
pub fn plan(
    catalog: &StackCatalog,
    source: &ResolvedSource,
    ctx: &RunContext,
    options: &PlanOptions,
) -> Result<DeploymentPlan, PlanError> {
    validate_catalog(catalog)?;

    for name in &options.skip {
        if !catalog.contains(name) {
            return Err(PlanError::UnknownStack(name.clone()));
        }
    }

    let order = topo::stable_order(catalog.stacks())?;

    let selected: Vec<&StackDefinition> = order
        .into_iter()
        .map(|i| &catalog.stacks()[i])
        .filter(|stack| {
            ctx.deployment_type.includes(stack.group) && !options.skip.contains(&stack.name)
        })
        .collect();

    let selected_names: HashSet<&StackName> = selected.iter().map(|s| &s.name).collect();
    let mut external_dependencies: Vec<ExternalDependency> = Vec::new();

    for stack in &selected {
        for dep in stack.depends_on() {
            if selected_names.contains(&dep) {
                continue;
            }
            match external_dependencies.iter_mut().find(|e| e.name == dep) {
                Some(external) => external.required_by.push(stack.name.clone()),
                None => {
                    let template_path = catalog
                        .get(&dep)
                        .map(|definition| template_path(ctx, source, definition))
                        .unwrap_or_default();
                    external_dependencies.push(ExternalDependency {
                        physical_name: ctx.physical_name(dep.as_str()),
                        template_path,
                        name: dep,
                        required_by: vec![stack.name.clone()],
                    });
                }
            }
        }
    }

    let planned: Vec<PlannedStack> = selected
        .into_iter()
        .map(|definition| PlannedStack {
            physical_name: ctx.physical_name(definition.name.as_str()),
            template_path: template_path(ctx, source, definition),
            dependencies: definition.depends_on(),
            definition: definition.clone(),
        })
        .collect();

    let stacks = NonEmpty::from_vec(planned).ok_or(PlanError::EmptyPlan {
        deployment_type: ctx.deployment_type,
    })?;

    tracing::debug!(
        stacks = stacks.len(),
        external = external_dependencies.len(),
        "deployment plan built"
    );

    Ok(DeploymentPlan {
        deployment_type: ctx.deployment_type,
        source: source.clone(),
        stacks,
        external_dependencies,
    })
}

fn template_path(ctx: &RunContext, source: &ResolvedSource, definition: &StackDefinition) -> PathBuf {
    ctx.repo_root
        .join(&source.template_dir)
        .join(&definition.template)
}

fn validate_catalog(catalog: &StackCatalog) -> Result<(), PlanError> {
    let mut seen = HashSet::new();
    for stack in catalog.stacks() {
        if !seen.insert(&stack.name) {
            return Err(PlanError::DuplicateStack(stack.name.clone()));
        }
    }

    for stack in catalog.stacks() {
        for (parameter, referenced, _) in stack.output_references() {
            if !catalog.contains(referenced) {
                return Err(PlanError::UnknownReference {
                    stack: stack.name.clone(),
                    parameter: parameter.to_string(),
                    referenced: referenced.clone(),
                });
            }
        }
    }

    Ok(())
}
