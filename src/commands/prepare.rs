// ABOUTME: Shared pre-execution steps: configuration, source detection and planning.
// ABOUTME: Everything here fails before the provider is contacted.

use std::sync::Arc;

use strata::catalog::StackCatalog;
use strata::config::{Config, ConfigResolver};
use strata::context::{BuildIdentity, RunContext};
use strata::detect::{ResolvedSource, detect};
use strata::diagnostics::Diagnostics;
use strata::error::Result;
use strata::output::Output;
use strata::plan::{DeploymentPlan, PlanOptions, plan};
use strata::provider::{BackendSettings, StackProvider, SystemRunner, backend_for};

use crate::cli::TargetArgs;

pub struct Prepared {
    pub config: Config,
    pub backend: BackendSettings,
    pub source: ResolvedSource,
    pub ctx: RunContext,
    pub plan: DeploymentPlan,
    pub diag: Diagnostics,
}

impl Prepared {
    /// Provider backend for the resolved IaC source.
    pub fn provider(&self) -> Arc<dyn StackProvider> {
        backend_for(self.source.iac_source, &self.backend, Arc::new(SystemRunner))
    }
}

/// Resolve configuration, detect the IaC source and build the plan.
pub fn prepare(args: &TargetArgs, build: BuildIdentity, output: &Output) -> Result<Prepared> {
    let mut resolver = ConfigResolver::new(&args.repo);
    if let Some(path) = &args.config {
        resolver = resolver.with_override(path);
    }
    let config = resolver.resolve(args.environment)?;

    let mut diag = Diagnostics::default();
    let source = detect(&args.repo, &config, &mut diag)?;

    let ctx = RunContext {
        environment: args.environment,
        region: args.region.clone().unwrap_or_else(|| config.region.clone()),
        project_name: config.project_name.clone(),
        deployment_type: args.deployment_type,
        monitoring_level: args.monitoring_level,
        repo_root: args.repo.clone(),
        build,
    };

    let backend = BackendSettings {
        region: ctx.region.clone(),
        profile: args.profile.clone(),
        template_bucket: config.deployment.template_bucket.clone(),
        resource_group: config
            .deployment
            .resource_group
            .clone()
            .unwrap_or_else(|| format!("{}-{}", ctx.project_name, ctx.environment)),
    };

    let catalog = StackCatalog::from_config(&config);
    let options = PlanOptions {
        skip: args.skip.clone(),
    };
    let plan = plan(&catalog, &source, &ctx, &options)?;

    output.progress(&format!(
        "Planned {} stack(s) for {} ({} via {}, {})",
        plan.stacks.len(),
        ctx.environment,
        source.provider,
        source.iac_source,
        ctx.region
    ));

    Ok(Prepared {
        config,
        backend,
        source,
        ctx,
        plan,
        diag,
    })
}
