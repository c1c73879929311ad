// ABOUTME: Typed deployment configuration decoded from merged YAML layers.
// ABOUTME: Defines defaults for every optional key and re-exports the resolver.

mod error;
mod merge;
mod resolver;

pub use error::ConfigError;
pub use merge::deep_merge;
pub use resolver::{BUILTIN_DEFAULTS, ConfigResolver};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::StackDefinition;
use crate::provider::RetryPolicy;
use crate::types::{CloudProvider, Environment, InfrastructureSource};

pub const CONFIG_DIR: &str = "config";
pub const BASE_CONFIG: &str = "config/config.yaml";
pub const ENVIRONMENTS_DIR: &str = "config/environments";
pub const CLOUDS_DIR: &str = "config/clouds";

/// Feature flag that runs infrastructure validation after a successful deploy.
pub const FEATURE_POST_DEPLOY_VALIDATION: &str = "post_deploy_validation";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub cloud_provider: CloudProvider,

    pub environment: Environment,

    #[serde(default = "default_project_name")]
    pub project_name: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    pub features: BTreeMap<String, bool>,

    #[serde(default)]
    pub quality_gates: BTreeMap<String, f64>,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Stack catalog override; the built-in catalog is used when absent.
    #[serde(default)]
    pub stacks: Option<Vec<StackDefinition>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub infrastructure_source: InfrastructureSource,

    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Template directory relative to the repository root.
    #[serde(default)]
    pub template_dir: Option<PathBuf>,

    /// S3 bucket CloudFormation templates are staged in. Without one,
    /// templates are sent inline and limited to 51,200 bytes.
    #[serde(default)]
    pub template_bucket: Option<String>,

    /// Azure resource group for Bicep deployments (default `{project_name}-{environment}`).
    #[serde(default)]
    pub resource_group: Option<String>,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(default = "default_approval_environments")]
    pub approval_environments: Vec<Environment>,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            infrastructure_source: InfrastructureSource::Auto,
            strategy: default_strategy(),
            template_dir: None,
            template_bucket: None,
            resource_group: None,
            timeout: default_timeout(),
            poll_interval: default_poll_interval(),
            approval_environments: default_approval_environments(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
    /// JSON-lines file receiving lifecycle events.
    #[serde(default)]
    pub events_file: Option<PathBuf>,
}

fn default_project_name() -> String {
    "f1-data-platform".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_strategy() -> String {
    "sequential".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_approval_environments() -> Vec<Environment> {
    vec![Environment::Prod]
}

impl Config {
    pub fn feature_enabled(&self, flag: &str) -> bool {
        self.features.get(flag).copied().unwrap_or(false)
    }

    /// Whether stacks in this configuration's environment wait for manual approval.
    pub fn requires_approval(&self) -> bool {
        self.deployment
            .approval_environments
            .contains(&self.environment)
    }
}
