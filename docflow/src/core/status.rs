//! Task status enum and transition rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of one enhancement task.
///
/// Transitions: `Pending -> Processing`, `Processing -> Processing`
/// (retry), `Processing -> Completed | Failed`. `Completed` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task has not started yet.
    Pending,
    /// The task is executing, or waiting between retry attempts.
    Processing,
    /// The task finished and its fragment was merged.
    Completed,
    /// The task failed after exhausting recovery options.
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl TaskStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the state machine permits moving to `next`.
    ///
    /// A `Processing -> Processing` transition is a retry and must carry
    /// an incremented attempt count.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (
                    Self::Processing,
                    Self::Processing | Self::Completed | Self::Failed
                )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Pending.to_string(), "pending");
        assert_eq!(TaskStatus::Processing.to_string(), "processing");
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Processing));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn test_retry_transition() {
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Processing));
    }

    #[test]
    fn test_no_transition_out_of_terminal() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed] {
            for next in [
                TaskStatus::Pending,
                TaskStatus::Processing,
                TaskStatus::Completed,
                TaskStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_pending_cannot_skip_processing() {
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(json, r#""processing""#);

        let deserialized: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, TaskStatus::Processing);
    }
}
