// ABOUTME: Layered configuration discovery and resolution.
// ABOUTME: Merges base, environment, cloud and explicit override files with defined precedence.

use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

use super::merge::deep_merge;
use super::{BASE_CONFIG, CLOUDS_DIR, Config, ConfigError, ENVIRONMENTS_DIR};
use crate::types::{CloudProvider, Environment};

/// Configuration used when the repository has no base config file.
pub const BUILTIN_DEFAULTS: &str = r#"
cloud_provider: aws
project_name: f1-data-platform
region: us-east-1
deployment:
  infrastructure_source: auto
  strategy: sequential
features:
  post_deploy_validation: false
quality_gates: {}
"#;

const BUILTIN_SOURCE: &str = "<built-in defaults>";

/// Resolves the effective configuration for one environment of a repository.
///
/// Layers, lowest to highest precedence:
/// 1. `config/config.yaml`, or the built-in defaults when it does not exist
/// 2. `config/environments/{environment}.yaml`
/// 3. `config/clouds/{cloud_provider}.yaml`
/// 4. the explicit override file, if one was given
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    repo_root: PathBuf,
    override_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            override_path: None,
        }
    }

    /// Add an explicit override file; it must exist.
    pub fn with_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.override_path = Some(path.into());
        self
    }

    pub fn base_path(&self) -> PathBuf {
        self.repo_root.join(BASE_CONFIG)
    }

    pub fn environment_path(&self, environment: Environment) -> PathBuf {
        self.repo_root
            .join(ENVIRONMENTS_DIR)
            .join(format!("{environment}.yaml"))
    }

    pub fn cloud_path(&self, provider: CloudProvider) -> PathBuf {
        self.repo_root
            .join(CLOUDS_DIR)
            .join(format!("{provider}.yaml"))
    }

    /// Candidate files in precedence order, lowest first.
    pub fn candidate_paths(
        &self,
        environment: Environment,
        provider: CloudProvider,
    ) -> Vec<PathBuf> {
        let mut paths = vec![
            self.base_path(),
            self.environment_path(environment),
            self.cloud_path(provider),
        ];
        paths.extend(self.override_path.clone());
        paths
    }

    pub fn resolve(&self, environment: Environment) -> Result<Config, ConfigError> {
        let base_path = self.base_path();
        let mut merged = match read_layer(&base_path)? {
            Some(base) => base,
            None => {
                tracing::debug!(
                    "{} not found, using built-in defaults",
                    base_path.display()
                );
                builtin_defaults()?
            }
        };

        if let Some(layer) = read_layer(&self.environment_path(environment))? {
            deep_merge(&mut merged, layer);
        }

        let explicit = match &self.override_path {
            Some(path) => Some(
                read_layer(path)?.ok_or_else(|| ConfigError::OverrideNotFound(path.clone()))?,
            ),
            None => None,
        };

        // The cloud layer is chosen by the provider every other layer agrees on.
        let mut probe = merged.clone();
        if let Some(layer) = &explicit {
            deep_merge(&mut probe, layer.clone());
        }
        let provider = cloud_provider(&probe)?;

        if let Some(layer) = read_layer(&self.cloud_path(provider))? {
            deep_merge(&mut merged, layer);
        }
        if let Some(layer) = explicit {
            deep_merge(&mut merged, layer);
        }

        let provider = cloud_provider(&merged)?;
        tracing::debug!(%provider, %environment, "configuration layers merged");

        decode(merged, environment)
    }
}

/// Read one layer. Missing files are `None`; present files must parse to a mapping.
fn read_layer(path: &Path) -> Result<Option<Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_layer(&content, path).map(Some)
}

fn parse_layer(content: &str, path: &Path) -> Result<Value, ConfigError> {
    let value: Value = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Mapping(_) => Ok(value),
        // An empty file is an empty layer.
        Value::Null => Ok(Value::Mapping(Mapping::new())),
        _ => Err(ConfigError::NotAMapping(path.to_path_buf())),
    }
}

fn builtin_defaults() -> Result<Value, ConfigError> {
    parse_layer(BUILTIN_DEFAULTS, Path::new(BUILTIN_SOURCE))
}

fn cloud_provider(merged: &Value) -> Result<CloudProvider, ConfigError> {
    match merged.get("cloud_provider") {
        None | Some(Value::Null) => Err(ConfigError::MissingRequiredField(
            "cloud_provider".to_string(),
        )),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| ConfigError::UnsupportedProvider(s.clone())),
        Some(other) => Err(ConfigError::UnsupportedProvider(
            serde_yaml::to_string(other)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        )),
    }
}

fn decode(mut merged: Value, environment: Environment) -> Result<Config, ConfigError> {
    if let Value::Mapping(map) = &mut merged {
        map.insert(
            Value::String("environment".to_string()),
            Value::String(environment.to_string()),
        );
    }

    serde_yaml::from_value(merged).map_err(|e| ConfigError::InvalidField(e.to_string()))
}
