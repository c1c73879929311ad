// ABOUTME: Structured lifecycle events and best-effort delivery sinks.
// ABOUTME: Sink failures are recorded as diagnostics and never change a run's outcome.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::diagnostics::{Diagnostics, Warning};
use crate::executor::{StackAction, StackStatus};
use crate::provider::Outputs;
use crate::report::DeploymentManifest;
use crate::types::{Environment, StackName};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    DeploymentStarted {
        environment: Environment,
        triggered_by: String,
    },
    StackCompleted {
        stack_name: StackName,
        action: Option<StackAction>,
        status: StackStatus,
        outputs: Outputs,
    },
    DeploymentFinished {
        manifest: Box<DeploymentManifest>,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::DeploymentStarted { .. } => "deployment_started",
            LifecycleEvent::StackCompleted { .. } => "stack_completed",
            LifecycleEvent::DeploymentFinished { .. } => "deployment_finished",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Receiver of lifecycle events. Rendering and delivery belong to the sink.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &LifecycleEvent) -> Result<(), SinkError>;
}

/// Logs each event at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn deliver(&self, event: &LifecycleEvent) -> Result<(), SinkError> {
        match event {
            LifecycleEvent::DeploymentStarted {
                environment,
                triggered_by,
            } => tracing::info!(%environment, %triggered_by, "deployment started"),
            LifecycleEvent::StackCompleted {
                stack_name, status, ..
            } => tracing::info!(stack = %stack_name, %status, "stack completed"),
            LifecycleEvent::DeploymentFinished { manifest } => {
                tracing::info!(status = %manifest.status, "deployment finished")
            }
        }
        Ok(())
    }
}

/// Appends each event as one JSON line to a file.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonLinesSink {
    fn deliver(&self, event: &LifecycleEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let write_err = |source| SinkError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(line.as_bytes()).map_err(write_err)
    }
}

/// Fans events out to every registered sink.
#[derive(Default)]
pub struct EventBus {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Deliver to every sink; a failing sink becomes a warning.
    pub fn publish(&self, event: &LifecycleEvent, diag: &mut Diagnostics) {
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(event) {
                diag.warn(Warning::event_delivery(format!(
                    "could not deliver {} event: {}",
                    event.name(),
                    e
                )));
            }
        }
    }
}
