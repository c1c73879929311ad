// ABOUTME: Run selectors exposed on the CLI: environment, deployment type, monitoring level.
// ABOUTME: Each is a closed set shared by clap parsing and YAML configuration.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which slice of the stack catalog a run deploys.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    #[default]
    Full,
    Foundation,
    Glue,
    Athena,
    Access,
}

impl DeploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentType::Full => "full",
            DeploymentType::Foundation => "foundation",
            DeploymentType::Glue => "glue",
            DeploymentType::Athena => "athena",
            DeploymentType::Access => "access",
        }
    }

    /// Whether a stack tagged with `group` belongs to this deployment type.
    pub fn includes(&self, group: DeploymentType) -> bool {
        *self == DeploymentType::Full || *self == group
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MonitoringLevel {
    None,
    Minimal,
    #[default]
    Standard,
    Full,
}

impl MonitoringLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitoringLevel::None => "none",
            MonitoringLevel::Minimal => "minimal",
            MonitoringLevel::Standard => "standard",
            MonitoringLevel::Full => "full",
        }
    }
}

impl fmt::Display for MonitoringLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
