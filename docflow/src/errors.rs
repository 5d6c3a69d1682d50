//! Error types for the docflow pipeline.
//!
//! The taxonomy separates task-local failures (execution and validation
//! errors, which the recovery controller classifies) from run-level
//! failures (which abort a pipeline run before any feature executes).

use crate::core::TaskStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The fragment is unsalvageable and must be rejected.
    Critical,
    /// Surfaced for observability only; never blocks the pipeline.
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation finding produced by the fragment processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Finding severity.
    pub severity: Severity,
    /// Stable finding code (e.g., "FRAGMENT-EMPTY").
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl Finding {
    /// Creates a critical finding.
    #[must_use]
    pub fn critical(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a warning finding.
    #[must_use]
    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true if the finding is critical.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Error raised by the task executor for one enhancement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExecutionError {
    /// The remote generation call exceeded the configured timeout.
    #[error("generation timed out after {timeout_ms}ms for feature '{feature}'")]
    Timeout {
        /// The feature being generated.
        feature: String,
        /// The timeout that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// The remote service reported a non-success payload.
    #[error("generation rejected for feature '{feature}': {message}")]
    RemoteRejected {
        /// The feature being generated.
        feature: String,
        /// The remote-reported failure message.
        message: String,
    },

    /// The feature id is not in the registry. Programming error, never retried.
    #[error("feature '{feature}' is not registered")]
    UnknownFeature {
        /// The unregistered feature id.
        feature: String,
    },
}

impl ExecutionError {
    /// Returns the feature id the error belongs to.
    #[must_use]
    pub fn feature_id(&self) -> &str {
        match self {
            Self::Timeout { feature, .. }
            | Self::RemoteRejected { feature, .. }
            | Self::UnknownFeature { feature } => feature,
        }
    }
}

/// Error raised when a fragment fails critical-severity validation.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("fragment for feature '{feature}' failed validation: {summary}")]
pub struct ValidationError {
    /// The feature whose fragment was rejected.
    pub feature: String,
    /// Joined critical finding messages.
    pub summary: String,
    /// All findings, critical and warning.
    pub findings: Vec<Finding>,
}

impl ValidationError {
    /// Creates a validation error from a set of findings.
    #[must_use]
    pub fn new(feature: impl Into<String>, findings: Vec<Finding>) -> Self {
        let summary = findings
            .iter()
            .filter(|f| f.is_critical())
            .map(|f| f.message.clone())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            feature: feature.into(),
            summary,
            findings,
        }
    }

    /// Returns the critical findings only.
    #[must_use]
    pub fn critical_findings(&self) -> Vec<&Finding> {
        self.findings.iter().filter(|f| f.is_critical()).collect()
    }
}

/// A task-local failure, classified by the recovery controller.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The executor failed to obtain a raw fragment.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// The fragment processor rejected the fragment.
    #[error("{0}")]
    Validation(#[from] ValidationError),
}

impl TaskError {
    /// Returns the feature id the error belongs to.
    #[must_use]
    pub fn feature_id(&self) -> &str {
        match self {
            Self::Execution(err) => err.feature_id(),
            Self::Validation(err) => &err.feature,
        }
    }
}

/// Error raised by a document source.
#[derive(Debug, Clone, Error)]
pub enum DocumentSourceError {
    /// No base document exists for the run yet.
    #[error("no base document exists for run {run_id}")]
    NotFound {
        /// The pipeline run id.
        run_id: Uuid,
    },

    /// The source could not be reached.
    #[error("document source unavailable: {message}")]
    Unavailable {
        /// Transport-level failure detail.
        message: String,
    },
}

/// Error raised on an illegal task status transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status transition {from} -> {to} for feature '{feature}'")]
pub struct InvalidTransition {
    /// The feature whose task was mutated.
    pub feature: String,
    /// The status before the attempted transition.
    pub from: TaskStatus,
    /// The rejected target status.
    pub to: TaskStatus,
}

/// Error raised when assembling a pipeline from incomplete parts.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// A required collaborator was not provided to the builder.
    #[error("pipeline builder is missing a {component}")]
    MissingComponent {
        /// The absent collaborator.
        component: &'static str,
    },
}

/// Error raised when registering features.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The feature id is already registered.
    #[error("feature '{feature}' is already registered")]
    Duplicate {
        /// The conflicting feature id.
        feature: String,
    },
}

/// A run-level pipeline failure.
///
/// Unlike [`TaskError`], these abort or reject an operation on the whole
/// run; a single feature's failure is never surfaced through this type.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The base document could not be fetched. Fatal, aborts the run.
    #[error("{0}")]
    BaseDocument(#[from] DocumentSourceError),

    /// An illegal task status transition was attempted.
    #[error("{0}")]
    Transition(#[from] InvalidTransition),

    /// The feature is not part of this run.
    #[error("feature '{feature}' is not part of this run")]
    UnknownRunFeature {
        /// The requested feature id.
        feature: String,
    },

    /// Manual retry requested for a feature that is not in a failed state.
    #[error("feature '{feature}' cannot be retried while {status}")]
    NotRetryable {
        /// The feature id.
        feature: String,
        /// The feature's current status.
        status: TaskStatus,
    },

    /// The run has not been started, or its result was already consumed.
    #[error("pipeline run has not been started or was already joined")]
    NotStarted,

    /// An unexpected internal failure.
    #[error("internal pipeline error: {0}")]
    Internal(String),
}
