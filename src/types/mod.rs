// ABOUTME: Validated domain types shared by every orchestration stage.
// ABOUTME: Closed enums replace string dispatch over providers, sources and environments.

mod cloud;
mod environment;
mod stack_name;

pub use cloud::{CloudProvider, IacSource, InfrastructureSource, ParseCloudError};
pub use environment::{DeploymentType, Environment, MonitoringLevel};
pub use stack_name::{StackName, StackNameError};
