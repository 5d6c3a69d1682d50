//! Pipeline events and sinks for observability.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A structured event emitted during a pipeline run.
///
/// Events are typed rather than free-form so sinks can match on them
/// exhaustively; [`kind`] provides the dotted name used for filtering
/// and log output.
///
/// [`kind`]: PipelineEvent::kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A run began executing features.
    RunStarted {
        /// The run id.
        run_id: Uuid,
        /// Number of planned features.
        total_features: usize,
    },
    /// A feature attempt started.
    FeatureStarted {
        /// The feature id.
        feature_id: String,
        /// The attempt number, starting at 1.
        attempt: u32,
    },
    /// A feature's local progress advanced.
    FeatureProgress {
        /// The feature id.
        feature_id: String,
        /// The new progress value.
        progress: u8,
    },
    /// A feature is waiting out a backoff delay before retrying.
    FeatureRetrying {
        /// The feature id.
        feature_id: String,
        /// The upcoming attempt number.
        attempt: u32,
        /// The decided backoff delay in milliseconds.
        delay_ms: u64,
        /// The error that triggered the retry.
        error: String,
    },
    /// A feature completed and its fragment was merged.
    FeatureCompleted {
        /// The feature id.
        feature_id: String,
        /// The attempt that succeeded.
        attempt: u32,
    },
    /// A feature terminally failed.
    FeatureFailed {
        /// The feature id.
        feature_id: String,
        /// The user-visible failure message.
        error: String,
        /// Actionable hint for non-retryable failures.
        #[serde(skip_serializing_if = "Option::is_none")]
        alternative_approach: Option<String>,
    },
    /// A merge could not use its primary strategy and fell back.
    MergeFellBack {
        /// The feature id.
        feature_id: String,
        /// Kind of the requested strategy.
        requested: String,
        /// Kind of the strategy actually applied.
        applied: String,
    },
    /// An external override was applied to a task.
    ProgressOverridden {
        /// The feature id.
        feature_id: String,
    },
    /// The run was cancelled.
    RunCancelled {
        /// The run id.
        run_id: Uuid,
        /// The cancellation reason.
        reason: String,
    },
    /// The run finished; every feature is terminal.
    RunCompleted {
        /// The run id.
        run_id: Uuid,
        /// Count of completed features.
        completed: usize,
        /// Count of failed features.
        failed: usize,
        /// Wall-clock duration in milliseconds.
        duration_ms: f64,
    },
}

impl PipelineEvent {
    /// Returns the dotted event name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run.started",
            Self::FeatureStarted { .. } => "feature.started",
            Self::FeatureProgress { .. } => "feature.progress",
            Self::FeatureRetrying { .. } => "feature.retrying",
            Self::FeatureCompleted { .. } => "feature.completed",
            Self::FeatureFailed { .. } => "feature.failed",
            Self::MergeFellBack { .. } => "merge.fell_back",
            Self::ProgressOverridden { .. } => "progress.overridden",
            Self::RunCancelled { .. } => "run.cancelled",
            Self::RunCompleted { .. } => "run.completed",
        }
    }
}
