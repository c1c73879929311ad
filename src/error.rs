// ABOUTME: Application-wide error types for strata.
// ABOUTME: Maps every failure to the process exit code that reports it.

use thiserror::Error;

use crate::config::ConfigError;
use crate::orchestrator::OrchestrationError;
use crate::plan::PlanError;
use crate::report::ReportError;

/// Exit code when every stack succeeded.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code when a stack or validation failed during the run.
pub const EXIT_RUN_FAILED: u8 = 1;
/// Exit code when nothing was attempted: configuration, planning or setup failed.
pub const EXIT_NOT_ATTEMPTED: u8 = 2;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error("{failed} stack(s) failed")]
    StacksFailed { failed: usize },

    #[error("{failed} stack(s) failed validation")]
    ValidationFailed { failed: usize },

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Exit code distinguishing "nothing was attempted" from "something failed mid-run".
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::StacksFailed { .. } | Error::ValidationFailed { .. } | Error::Report(_) => {
                EXIT_RUN_FAILED
            }
            Error::Config(_)
            | Error::Plan(_)
            | Error::Orchestration(_)
            | Error::Io(_) => EXIT_NOT_ATTEMPTED,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
