//! Run-level aggregate views derived from the task list.

use super::{FeatureTask, TaskStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Computes overall run progress as completed tasks over total, 0-100.
#[must_use]
pub fn overall_progress(tasks: &[FeatureTask]) -> u8 {
    if tasks.is_empty() {
        return 0;
    }
    let completed = tasks
        .iter()
        .filter(|t| t.status() == TaskStatus::Completed)
        .count();
    let percentage = completed * 100 / tasks.len();
    u8::try_from(percentage).unwrap_or(100)
}

/// Returns true when every task is terminal (vacuously true when empty).
#[must_use]
pub fn is_complete(tasks: &[FeatureTask]) -> bool {
    tasks.iter().all(FeatureTask::is_terminal)
}

/// An observer-facing snapshot of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    /// The run id.
    pub run_id: Uuid,
    /// All tasks in requested order.
    pub features: Vec<FeatureTask>,
    /// Completed tasks over total, 0-100.
    pub overall_progress: u8,
    /// True when every task is terminal.
    pub is_complete: bool,
    /// The working document at snapshot time.
    pub current_document: String,
}

/// The completion summary returned when a run finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// The run id.
    pub run_id: Uuid,
    /// Final state of every task.
    pub features: Vec<FeatureTask>,
    /// Ids of features that completed.
    pub completed: Vec<String>,
    /// Ids of features that failed.
    pub failed: Vec<String>,
    /// True when the run was cancelled before finishing.
    pub cancelled: bool,
    /// The cancellation reason, if cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    /// Wall-clock run duration in milliseconds.
    pub duration_ms: f64,
    /// The final merged document.
    pub document: String,
}

impl RunSummary {
    /// Returns true when every requested feature completed.
    #[must_use]
    pub fn is_fully_successful(&self) -> bool {
        !self.cancelled && self.failed.is_empty() && self.completed.len() == self.features.len()
    }
}
