// ABOUTME: Stack definitions, typed parameter values and the built-in stack catalog.
// ABOUTME: Output references are a distinct variant, so literals never look like dependencies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::Config;
use crate::types::{DeploymentType, StackName};

/// Run context value a parameter can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextField {
    Environment,
    ProjectName,
    Region,
    MonitoringLevel,
}

/// Value supplied for a stack parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, from = "RawParameter")]
pub enum ParameterValue {
    /// Output of another stack, resolved once that stack has converged.
    Output { stack: StackName, output: String },
    Context { context: ContextField },
    Literal(String),
}

impl ParameterValue {
    pub fn literal(value: impl Into<String>) -> Self {
        ParameterValue::Literal(value.into())
    }

    pub fn output(stack: StackName, output: impl Into<String>) -> Self {
        ParameterValue::Output {
            stack,
            output: output.into(),
        }
    }

    pub fn context(field: ContextField) -> Self {
        ParameterValue::Context { context: field }
    }
}

/// YAML scalars other than strings are accepted as literals.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawParameter {
    Output { stack: StackName, output: String },
    Context { context: ContextField },
    Text(String),
    Bool(bool),
    Integer(i64),
    Float(f64),
}

impl From<RawParameter> for ParameterValue {
    fn from(raw: RawParameter) -> Self {
        match raw {
            RawParameter::Output { stack, output } => ParameterValue::Output { stack, output },
            RawParameter::Context { context } => ParameterValue::Context { context },
            RawParameter::Text(s) => ParameterValue::Literal(s),
            RawParameter::Bool(b) => ParameterValue::Literal(b.to_string()),
            RawParameter::Integer(i) => ParameterValue::Literal(i.to_string()),
            RawParameter::Float(f) => ParameterValue::Literal(f.to_string()),
        }
    }
}

/// A named, independently deployable unit of infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDefinition {
    pub name: StackName,
    /// Template path relative to the resolved template directory.
    pub template: PathBuf,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub group: DeploymentType,
}

impl StackDefinition {
    /// Output references as `(parameter, stack, output)`, in parameter order.
    pub fn output_references(&self) -> impl Iterator<Item = (&str, &StackName, &str)> {
        self.parameters.iter().filter_map(|(param, value)| match value {
            ParameterValue::Output { stack, output } => {
                Some((param.as_str(), stack, output.as_str()))
            }
            _ => None,
        })
    }

    /// Stacks this one consumes outputs from, deduplicated, in first-reference order.
    pub fn depends_on(&self) -> Vec<StackName> {
        let mut deps: Vec<StackName> = Vec::new();
        for (_, stack, _) in self.output_references() {
            if !deps.contains(stack) {
                deps.push(stack.clone());
            }
        }
        deps
    }
}

/// Ordered stack catalog; declaration order is the planner's tie-break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackCatalog {
    stacks: Vec<StackDefinition>,
}

impl StackCatalog {
    pub fn new(stacks: Vec<StackDefinition>) -> Self {
        Self { stacks }
    }

    /// Catalog from configuration, or the built-in catalog when none is configured.
    pub fn from_config(config: &Config) -> Self {
        match &config.stacks {
            Some(stacks) => Self::new(stacks.clone()),
            None => Self::builtin(),
        }
    }

    pub fn stacks(&self) -> &[StackDefinition] {
        &self.stacks
    }

    pub fn get(&self, name: &StackName) -> Option<&StackDefinition> {
        self.stacks.iter().find(|s| &s.name == name)
    }

    pub fn contains(&self, name: &StackName) -> bool {
        self.get(name).is_some()
    }

    /// The data platform catalog: foundation, glue-etl, athena-analytics, access.
    pub fn builtin() -> Self {
        let foundation = StackName::from_static("foundation");
        let from_foundation = |output: &str| ParameterValue::output(foundation.clone(), output);

        let common = || {
            BTreeMap::from([
                (
                    "Environment".to_string(),
                    ParameterValue::context(ContextField::Environment),
                ),
                (
                    "ProjectName".to_string(),
                    ParameterValue::context(ContextField::ProjectName),
                ),
            ])
        };

        let mut foundation_params = common();
        foundation_params.insert(
            "DataLakeBucketName".to_string(),
            ParameterValue::literal("f1-data-lake"),
        );

        let mut glue_params = common();
        glue_params.extend([
            (
                "DataLakeBucket".to_string(),
                from_foundation("DataLakeBucketName"),
            ),
            ("GlueDatabase".to_string(), from_foundation("GlueDatabaseName")),
            (
                "GlueServiceRoleArn".to_string(),
                from_foundation("GlueServiceRoleArn"),
            ),
        ]);

        let mut athena_params = common();
        athena_params.extend([
            (
                "DataLakeBucket".to_string(),
                from_foundation("DataLakeBucketName"),
            ),
            ("GlueDatabase".to_string(), from_foundation("GlueDatabaseName")),
            (
                "AthenaWorkgroup".to_string(),
                from_foundation("AthenaWorkgroupName"),
            ),
        ]);

        let mut access_params = common();
        access_params.extend([
            (
                "DataLakeBucket".to_string(),
                from_foundation("DataLakeBucketName"),
            ),
            ("GlueDatabase".to_string(), from_foundation("GlueDatabaseName")),
            (
                "AthenaResultsBucket".to_string(),
                from_foundation("AthenaResultsBucketName"),
            ),
        ]);

        Self::new(vec![
            StackDefinition {
                name: foundation.clone(),
                template: PathBuf::from("01-data-lake-foundation.yaml"),
                parameters: foundation_params,
                capabilities: vec!["CAPABILITY_NAMED_IAM".to_string()],
                group: DeploymentType::Foundation,
            },
            StackDefinition {
                name: StackName::from_static("glue-etl"),
                template: PathBuf::from("02-glue-etl-jobs.yaml"),
                parameters: glue_params,
                capabilities: vec![],
                group: DeploymentType::Glue,
            },
            StackDefinition {
                name: StackName::from_static("athena-analytics"),
                template: PathBuf::from("03-athena-analytics.yaml"),
                parameters: athena_params,
                capabilities: vec![],
                group: DeploymentType::Athena,
            },
            StackDefinition {
                name: StackName::from_static("access"),
                template: PathBuf::from("04-data-platform-access-role.yaml"),
                parameters: access_params,
                capabilities: vec!["CAPABILITY_NAMED_IAM".to_string()],
                group: DeploymentType::Access,
            },
        ])
    }
}
