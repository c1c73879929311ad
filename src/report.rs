// ABOUTME: Aggregates per-stack results into the deployment manifest.
// ABOUTME: Determines overall status and root cause and writes the manifest as JSON.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::context::{BuildIdentity, RunContext};
use crate::detect::ResolvedSource;
use crate::executor::{StackFailure, StackRunResult};
use crate::types::{CloudProvider, DeploymentType, Environment, IacSource, MonitoringLevel, StackName};
use crate::validate::ValidationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeploymentStatus::Succeeded => "succeeded",
            DeploymentStatus::Failed => "failed",
        })
    }
}

/// First failing stack of a run and why it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootCause {
    pub stack_name: StackName,
    pub error: StackFailure,
}

/// Run-level facts recorded alongside the results.
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub environment: Environment,
    pub build: BuildIdentity,
    pub provider: CloudProvider,
    pub iac_source: IacSource,
    pub deployment_type: DeploymentType,
    pub monitoring_level: MonitoringLevel,
    pub dry_run: bool,
    pub timestamp: DateTime<Utc>,
}

impl RunMetadata {
    pub fn new(ctx: &RunContext, source: &ResolvedSource, dry_run: bool) -> Self {
        Self {
            environment: ctx.environment,
            build: ctx.build.clone(),
            provider: source.provider,
            iac_source: source.iac_source,
            deployment_type: ctx.deployment_type,
            monitoring_level: ctx.monitoring_level,
            dry_run,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentManifest {
    pub status: DeploymentStatus,
    pub root_cause: Option<RootCause>,
    pub environment: Environment,
    pub build: BuildIdentity,
    pub timestamp: DateTime<Utc>,
    pub provider: CloudProvider,
    pub iac_source: IacSource,
    pub deployment_type: DeploymentType,
    pub monitoring_level: MonitoringLevel,
    pub dry_run: bool,
    pub results: Vec<StackRunResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to encode manifest: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write manifest {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Build the manifest for a run. Results are kept in plan order, unchanged.
pub fn finalize(results: Vec<StackRunResult>, metadata: RunMetadata) -> DeploymentManifest {
    let root_cause = results.iter().find(|r| !r.is_success()).map(|r| RootCause {
        stack_name: r.stack_name.clone(),
        error: r.error.clone().unwrap_or(StackFailure::Provider {
            message: format!("{} ended with status {}", r.stack_name, r.status),
        }),
    });

    DeploymentManifest {
        status: if root_cause.is_none() {
            DeploymentStatus::Succeeded
        } else {
            DeploymentStatus::Failed
        },
        root_cause,
        environment: metadata.environment,
        build: metadata.build,
        timestamp: metadata.timestamp,
        provider: metadata.provider,
        iac_source: metadata.iac_source,
        deployment_type: metadata.deployment_type,
        monitoring_level: metadata.monitoring_level,
        dry_run: metadata.dry_run,
        results,
        validation: None,
    }
}

impl DeploymentManifest {
    pub fn succeeded(&self) -> bool {
        self.status == DeploymentStatus::Succeeded
    }

    /// Attach a post-deploy validation report; a failed validation fails the run.
    pub fn with_validation(mut self, report: ValidationReport) -> Self {
        if !report.all_passed() {
            self.status = DeploymentStatus::Failed;
        }
        self.validation = Some(report);
        self
    }

    /// Write the manifest as pretty JSON, creating parent directories.
    pub fn write_manifest(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        let write_err = |source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, json).map_err(write_err)
    }
}
