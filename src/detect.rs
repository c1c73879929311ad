// ABOUTME: IaC source detection from repository layout.
// ABOUTME: Probes terraform, then cloudformation, bicep and gcp-terraform paths.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{Config, ConfigError};
use crate::diagnostics::{Diagnostics, Warning};
use crate::types::{CloudProvider, IacSource, InfrastructureSource};

/// Provider and IaC technology a run deploys with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSource {
    pub provider: CloudProvider,
    pub iac_source: IacSource,
    /// Template directory relative to the repository root.
    pub template_dir: PathBuf,
}

/// Paths that identify each technology, in probe order.
pub fn detection_patterns(source: IacSource) -> &'static [&'static str] {
    match source {
        IacSource::Terraform => &["main.tf", "infrastructure.tf", "terraform/"],
        IacSource::CloudFormation => &[
            "template.yaml",
            "cloudformation/",
            "config/cloudformation/",
            "infrastructure/aws/cloudformation/",
        ],
        IacSource::Bicep => &["main.bicep", "config/azure-templates/"],
        IacSource::GcpTerraform => &["gcp/main.tf", "config/gcp-terraform/"],
    }
}

/// Where templates live when the configuration does not say.
pub fn default_template_dir(source: IacSource) -> &'static str {
    match source {
        IacSource::Terraform => "terraform",
        IacSource::CloudFormation => "infrastructure/aws/cloudformation",
        IacSource::Bicep => "config/azure-templates",
        IacSource::GcpTerraform => "config/gcp-terraform",
    }
}

/// Resolve the IaC source for a repository.
///
/// An explicit source is validated against the provider. With `auto`, only
/// technologies the provider supports are probed, so detection itself never
/// fails; when nothing matches it falls back to terraform with a warning.
pub fn detect(
    repo_root: &Path,
    config: &Config,
    diag: &mut Diagnostics,
) -> Result<ResolvedSource, ConfigError> {
    let provider = config.cloud_provider;

    let iac_source = match config.deployment.infrastructure_source {
        InfrastructureSource::Fixed(source) => {
            if !provider.supports(source) {
                return Err(ConfigError::IncompatibleSource {
                    provider,
                    source_kind: source,
                });
            }
            source
        }
        InfrastructureSource::Auto => match probe(repo_root, provider) {
            Some((source, pattern)) => {
                tracing::info!("detected {} from {}", source, pattern);
                source
            }
            None => {
                diag.warn(Warning::detection_fallback(format!(
                    "no infrastructure layout found in {}, defaulting to terraform",
                    repo_root.display()
                )));
                IacSource::Terraform
            }
        },
    };

    let template_dir = config
        .deployment
        .template_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_template_dir(iac_source)));

    Ok(ResolvedSource {
        provider,
        iac_source,
        template_dir,
    })
}

fn probe(repo_root: &Path, provider: CloudProvider) -> Option<(IacSource, &'static str)> {
    IacSource::ALL
        .into_iter()
        .filter(|source| provider.supports(*source))
        .find_map(|source| {
            detection_patterns(source)
                .iter()
                .find(|pattern| matches_pattern(repo_root, pattern))
                .map(|pattern| (source, *pattern))
        })
}

fn matches_pattern(repo_root: &Path, pattern: &str) -> bool {
    match pattern.strip_suffix('/') {
        Some(dir) => repo_root.join(dir).is_dir(),
        None => repo_root.join(pattern).is_file(),
    }
}
