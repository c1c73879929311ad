// ABOUTME: Explicit run context threaded through every orchestration stage.
// ABOUTME: Replaces ambient CI variables with a value tests can build in isolation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{DeploymentType, Environment, MonitoringLevel};

/// Who and what triggered a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildIdentity {
    pub build_id: Option<String>,
    pub commit: Option<String>,
    pub triggered_by: String,
    pub host: String,
}

impl BuildIdentity {
    /// Build an identity from CI environment variables.
    ///
    /// Reads `BUILD_NUMBER`, `GIT_COMMIT` and `BUILD_USER_ID` (Jenkins names),
    /// falling back to `USER` and finally `"manual"` for the trigger.
    /// Only the binary calls this; library code receives the result.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            build_id: var("BUILD_NUMBER"),
            commit: var("GIT_COMMIT"),
            triggered_by: var("BUILD_USER_ID")
                .or_else(|| var("USER"))
                .unwrap_or_else(|| "manual".to_string()),
            host: gethostname::gethostname().to_string_lossy().into_owned(),
        }
    }
}

/// Everything a run needs to know about where and why it is deploying.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub environment: Environment,
    pub region: String,
    pub project_name: String,
    pub deployment_type: DeploymentType,
    pub monitoring_level: MonitoringLevel,
    pub repo_root: PathBuf,
    pub build: BuildIdentity,
}

impl RunContext {
    /// Provider-facing name for a logical stack: `{project}-{stack}-{environment}`.
    pub fn physical_name(&self, stack: &str) -> String {
        format!("{}-{}-{}", self.project_name, stack, self.environment)
    }
}
