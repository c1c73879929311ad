// ABOUTME: Diagnostics accumulator for non-fatal observations during a run.
// ABOUTME: Detection fallbacks and event delivery failures land here instead of failing the run.

/// Collects non-fatal warnings during a deployment run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// No IaC layout matched during auto-detection.
    pub fn detection_fallback(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::DetectionFallback,
            message: message.into(),
        }
    }

    /// A lifecycle event sink rejected an event.
    pub fn event_delivery(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::EventDelivery,
            message: message.into(),
        }
    }

    /// Provider events could not be fetched for a failed stack.
    pub fn provider_events(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ProviderEvents,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Source detection defaulted to terraform.
    DetectionFallback,
    /// Failed to deliver a lifecycle event.
    EventDelivery,
    /// Failed to fetch provider events for a failed stack.
    ProviderEvents,
}
