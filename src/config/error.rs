// ABOUTME: Configuration errors raised before any cloud mutation.
// ABOUTME: Covers malformed files, missing or unsupported providers and incompatible sources.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{CloudProvider, IacSource};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration field: {0}")]
    MissingRequiredField(String),

    #[error("unsupported cloud provider: {0} (expected aws, azure or gcp)")]
    UnsupportedProvider(String),

    #[error("infrastructure source {source_kind} is not supported on {provider}")]
    IncompatibleSource {
        provider: CloudProvider,
        source_kind: IacSource,
    },

    #[error("invalid configuration: {0}")]
    InvalidField(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("configuration file {0} must contain a mapping at the top level")]
    NotAMapping(PathBuf),

    #[error("configuration override not found: {0}")]
    OverrideNotFound(PathBuf),
}
