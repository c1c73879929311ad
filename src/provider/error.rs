// ABOUTME: Provider call errors and their transient/fatal classification.
// ABOUTME: Only transient errors are retried; everything else surfaces to the executor.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Throttling, network blips and service hiccups.
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("stack already exists: {0}")]
    AlreadyExists(String),

    #[error("provider rejected request: {0}")]
    Rejected(String),

    #[error("failed to run {program}: {message}")]
    Command { program: String, message: String },

    #[error("unexpected provider response: {0}")]
    Decode(String),

    #[error("unknown operation handle: {0}")]
    UnknownOperation(String),
}

const TRANSIENT_MARKERS: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "Rate exceeded",
    "RequestLimitExceeded",
    "TooManyRequests",
    "ServiceUnavailable",
    "Could not connect to the endpoint",
    "Connection reset",
    "connection reset",
    "timed out",
];

const ALREADY_EXISTS_MARKERS: &[&str] = &["AlreadyExistsException", "already exists"];

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// Classify a failed CLI invocation from its stderr.
    pub fn from_stderr(stderr: &str) -> Self {
        let message = stderr.trim().to_string();
        if TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m)) {
            ProviderError::Transient(message)
        } else if ALREADY_EXISTS_MARKERS.iter().any(|m| stderr.contains(m)) {
            ProviderError::AlreadyExists(message)
        } else {
            ProviderError::Rejected(message)
        }
    }
}
