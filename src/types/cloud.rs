// ABOUTME: Cloud provider and IaC source enums with the static compatibility table.
// ABOUTME: Parsing is string based so configuration errors can name the offending value.

use serde::de::{self, Deserialize, Deserializer};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCloudError {
    #[error("unsupported cloud provider: {0}")]
    Provider(String),

    #[error("unknown infrastructure source: {0}")]
    Source(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Azure => "azure",
            CloudProvider::Gcp => "gcp",
        }
    }

    /// IaC technologies this provider can deploy, in detection order.
    pub fn supported_sources(&self) -> &'static [IacSource] {
        match self {
            CloudProvider::Aws => &[IacSource::Terraform, IacSource::CloudFormation],
            CloudProvider::Azure => &[IacSource::Terraform, IacSource::Bicep],
            CloudProvider::Gcp => &[IacSource::Terraform, IacSource::GcpTerraform],
        }
    }

    pub fn supports(&self, source: IacSource) -> bool {
        self.supported_sources().contains(&source)
    }
}

impl FromStr for CloudProvider {
    type Err = ParseCloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aws" => Ok(CloudProvider::Aws),
            "azure" => Ok(CloudProvider::Azure),
            "gcp" => Ok(CloudProvider::Gcp),
            other => Err(ParseCloudError::Provider(other.to_string())),
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IacSource {
    Terraform,
    CloudFormation,
    Bicep,
    GcpTerraform,
}

impl IacSource {
    /// Declaration order; earlier entries win detection ties.
    pub const ALL: [IacSource; 4] = [
        IacSource::Terraform,
        IacSource::CloudFormation,
        IacSource::Bicep,
        IacSource::GcpTerraform,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IacSource::Terraform => "terraform",
            IacSource::CloudFormation => "cloudformation",
            IacSource::Bicep => "bicep",
            IacSource::GcpTerraform => "gcp-terraform",
        }
    }
}

impl FromStr for IacSource {
    type Err = ParseCloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "terraform" => Ok(IacSource::Terraform),
            "cloudformation" => Ok(IacSource::CloudFormation),
            "bicep" => Ok(IacSource::Bicep),
            "gcp-terraform" => Ok(IacSource::GcpTerraform),
            other => Err(ParseCloudError::Source(other.to_string())),
        }
    }
}

impl fmt::Display for IacSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured infrastructure source before detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InfrastructureSource {
    #[default]
    Auto,
    Fixed(IacSource),
}

impl FromStr for InfrastructureSource {
    type Err = ParseCloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(InfrastructureSource::Auto),
            other => other.parse().map(InfrastructureSource::Fixed),
        }
    }
}

impl fmt::Display for InfrastructureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfrastructureSource::Auto => f.write_str("auto"),
            InfrastructureSource::Fixed(source) => source.fmt(f),
        }
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

string_serde!(CloudProvider);
string_serde!(IacSource);
string_serde!(InfrastructureSource);
