// ABOUTME: Logical stack name validation.
// ABOUTME: Names are DNS-label shaped so physical stack names stay provider-safe.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StackNameError {
    #[error("stack name cannot be empty")]
    Empty,

    #[error("stack name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("stack name cannot start with a hyphen")]
    StartsWithHyphen,

    #[error("stack name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("stack name must be lowercase")]
    NotLowercase,

    #[error("invalid character in stack name: '{0}'")]
    InvalidChar(char),
}

/// Logical name of a stack within a catalog (e.g. `glue-etl`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackName(String);

impl StackName {
    pub fn new(value: &str) -> Result<Self, StackNameError> {
        if value.is_empty() {
            return Err(StackNameError::Empty);
        }

        if value.len() > 63 {
            return Err(StackNameError::TooLong);
        }

        if value.starts_with('-') {
            return Err(StackNameError::StartsWithHyphen);
        }

        if value.ends_with('-') {
            return Err(StackNameError::EndsWithHyphen);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(StackNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
                return Err(StackNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    /// Name known valid at compile time (built-in catalog entries).
    pub(crate) fn from_static(value: &'static str) -> Self {
        debug_assert!(Self::new(value).is_ok(), "invalid built-in stack name {value}");
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StackName {
    type Err = StackNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for StackName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StackName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        StackName::new(&s).map_err(serde::de::Error::custom)
    }
}
