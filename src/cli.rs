// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines the deploy, plan and validate subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use strata::output::OutputMode;
use strata::types::{DeploymentType, Environment, MonitoringLevel, StackName};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Deploy dependent infrastructure stacks from a repository's configuration")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "normal")]
    pub output: OutputMode,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy the planned stacks
    Deploy(DeployArgs),

    /// Show the deployment plan without contacting the provider
    Plan(TargetArgs),

    /// Check that every planned stack is deployed and healthy
    Validate(TargetArgs),
}

/// What to deploy, and where.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Target environment
    #[arg(short, long, value_enum, default_value_t = Environment::Dev, env = "STRATA_ENVIRONMENT")]
    pub environment: Environment,

    /// Which group of stacks to deploy
    #[arg(long, value_enum, default_value_t = DeploymentType::Full)]
    pub deployment_type: DeploymentType,

    /// Monitoring level passed to stacks
    #[arg(long, value_enum, default_value_t = MonitoringLevel::Standard)]
    pub monitoring_level: MonitoringLevel,

    /// Cloud region (overrides the configured region)
    #[arg(long)]
    pub region: Option<String>,

    /// Explicit configuration override file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Named AWS CLI profile for CloudFormation calls
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Repository root
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Leave a stack out of this run (repeatable)
    #[arg(long)]
    pub skip: Vec<StackName>,
}

#[derive(Args, Debug, Clone)]
pub struct DeployArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Log intended actions without contacting the provider
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the manual approval gate
    #[arg(long)]
    pub auto_approve: bool,

    /// Manifest path (default: target/strata/manifest.json under the repository)
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// CI build identifier
    #[arg(long)]
    pub build_id: Option<String>,

    /// Commit being deployed
    #[arg(long)]
    pub commit: Option<String>,

    /// Who triggered the deployment
    #[arg(long)]
    pub triggered_by: Option<String>,
}
