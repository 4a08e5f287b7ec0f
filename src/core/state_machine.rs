//! Per-package publish state machine
//!
//! Tracks which step of the publish cycle a package is in. Transitions are
//! logged and timestamped; nothing is persisted across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Publishing step of a single package
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishStep {
    Pending,
    Publishing,
    ConfirmingAvailability,
    Transplanting,
    PushingDownstream,
    Completed,
    Failed,
}

impl PublishStep {
    /// Steps reachable from `self`
    fn can_transition_to(self, to: PublishStep) -> bool {
        use PublishStep::*;
        match (self, to) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Pending, Publishing) => true,
            (Publishing, ConfirmingAvailability) => true,
            (ConfirmingAvailability, Transplanting) => true,
            // skip-existing-branches jumps straight to the end
            (ConfirmingAvailability, Completed) => true,
            (Transplanting, PushingDownstream) => true,
            (PushingDownstream, Completed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PublishStep::Completed | PublishStep::Failed)
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepTransition {
    pub from: PublishStep,
    pub to: PublishStep,
    pub timestamp: DateTime<Utc>,
}

/// Progress of one package through the publish cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageProgress {
    pub package: String,
    pub version: String,
    pub current: PublishStep,
    pub transitions: Vec<StepTransition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PackageProgress {
    pub fn new(package: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            current: PublishStep::Pending,
            transitions: Vec::new(),
            error: None,
        }
    }

    /// Move to `to`. Invalid transitions are ignored and logged; they indicate
    /// a sequencing bug, not a publish failure.
    pub fn transition(&mut self, to: PublishStep) {
        if !self.current.can_transition_to(to) {
            tracing::error!(
                package = %self.package,
                from = ?self.current,
                to = ?to,
                "invalid step transition"
            );
            return;
        }

        tracing::info!(package = %self.package, version = %self.version, step = ?to, "step");
        self.transitions.push(StepTransition {
            from: self.current,
            to,
            timestamp: Utc::now(),
        });
        self.current = to;
    }

    /// Mark the package as failed with `error`
    pub fn fail(&mut self, error: impl ToString) {
        self.error = Some(error.to_string());
        self.transition(PublishStep::Failed);
    }

    /// Time of the transition into `step`, if it happened
    pub fn entered_at(&self, step: PublishStep) -> Option<DateTime<Utc>> {
        self.transitions
            .iter()
            .find(|t| t.to == step)
            .map(|t| t.timestamp)
    }
}
