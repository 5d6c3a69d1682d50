//! Per-feature task state.

use super::TaskStatus;
use crate::errors::InvalidTransition;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// Local progress stamped when a task starts processing.
const PROGRESS_STARTED: u8 = 5;
/// Ceiling for in-flight progress; 100 is reserved for completion.
const PROGRESS_IN_FLIGHT_MAX: u8 = 99;

/// One enhancement unit within a pipeline run.
///
/// All lifecycle mutations go through the transition methods, which
/// enforce the status state machine and keep `progress` monotonically
/// non-decreasing while the task has not failed. `progress == 100` holds
/// exactly when the task is completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTask {
    id: String,
    display_name: String,
    status: TaskStatus,
    progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    fragment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alternative_approach: Option<String>,
    attempt: u32,
    last_updated: Timestamp,
}

impl FeatureTask {
    /// Creates a new pending task.
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            status: TaskStatus::Pending,
            progress: 0,
            fragment: None,
            error: None,
            alternative_approach: None,
            attempt: 0,
            last_updated: now_utc(),
        }
    }

    /// Returns the feature id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the human display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the current progress, 0-100.
    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Returns the validated fragment once completed.
    #[must_use]
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Returns the failure message once failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the recovery hint for non-retryable failures.
    #[must_use]
    pub fn alternative_approach(&self) -> Option<&str> {
        self.alternative_approach.as_deref()
    }

    /// Returns the number of attempts started so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the timestamp of the last mutation.
    #[must_use]
    pub fn last_updated(&self) -> Timestamp {
        self.last_updated
    }

    /// Returns true if the task reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, to: TaskStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(to) {
            return Err(InvalidTransition {
                feature: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.last_updated = now_utc();
        Ok(())
    }

    /// Starts the first attempt: `Pending -> Processing`.
    pub fn begin(&mut self) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Processing)?;
        self.attempt = 1;
        self.progress = self.progress.max(PROGRESS_STARTED);
        Ok(())
    }

    /// Advances in-flight progress. Decreases are ignored, and values are
    /// capped below 100 so that full progress implies completion. Returns
    /// true if the value was applied.
    pub fn advance_progress(&mut self, progress: u8) -> bool {
        if self.status != TaskStatus::Processing {
            return false;
        }
        let capped = progress.min(PROGRESS_IN_FLIGHT_MAX);
        if capped <= self.progress {
            return false;
        }
        self.progress = capped;
        self.last_updated = now_utc();
        true
    }

    /// Records a retry: `Processing -> Processing` with an incremented
    /// attempt count and the triggering error.
    pub fn mark_retrying(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Processing)?;
        self.attempt += 1;
        self.error = Some(error.into());
        Ok(())
    }

    /// Completes the task with its validated fragment.
    pub fn complete(&mut self, fragment: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Completed)?;
        self.progress = 100;
        self.fragment = Some(fragment.into());
        self.error = None;
        Ok(())
    }

    /// Fails the task with a user-visible message and an optional
    /// recovery hint.
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        alternative_approach: Option<String>,
    ) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        self.alternative_approach = alternative_approach;
        Ok(())
    }

    /// Returns the task to `Pending` for a caller-requested retry.
    ///
    /// This deliberately bypasses the terminal-state rule: manual retry
    /// re-enters a failed feature with fresh retry state.
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.progress = 0;
        self.fragment = None;
        self.error = None;
        self.alternative_approach = None;
        self.attempt = 0;
        self.last_updated = now_utc();
    }

    /// Overwrites the status without state-machine checks.
    ///
    /// Reserved for the external progress-override channel, which is
    /// applied last-writer-wins per field.
    pub(crate) fn force_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.last_updated = now_utc();
    }

    /// Overwrites the progress without monotonicity checks.
    pub(crate) fn force_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
        self.last_updated = now_utc();
    }

    /// Overwrites the error message.
    pub(crate) fn force_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.last_updated = now_utc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> FeatureTask {
        FeatureTask::new("skills-matrix", "Skills Matrix")
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = task();
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.progress(), 0);
        assert_eq!(task.attempt(), 0);
        assert!(task.fragment().is_none());
        assert!(task.error().is_none());
    }

    #[test]
    fn test_happy_path() {
        let mut task = task();
        task.begin().unwrap();
        assert_eq!(task.status(), TaskStatus::Processing);
        assert_eq!(task.attempt(), 1);

        assert!(task.advance_progress(60));
        task.complete("<div>content</div>").unwrap();

        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.progress(), 100);
        assert_eq!(task.fragment(), Some("<div>content</div>"));
        assert!(task.error().is_none());
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let mut task = task();
        task.begin().unwrap();

        assert!(task.advance_progress(50));
        assert!(!task.advance_progress(30));
        assert_eq!(task.progress(), 50);

        assert!(task.advance_progress(100));
        assert_eq!(task.progress(), 99);
    }

    #[test]
    fn test_progress_100_only_when_completed() {
        let mut task = task();
        task.begin().unwrap();
        task.advance_progress(100);
        assert!(task.progress() < 100);

        task.complete("<p>done</p>").unwrap();
        assert_eq!(task.progress(), 100);
    }

    #[test]
    fn test_retry_increments_attempt() {
        let mut task = task();
        task.begin().unwrap();
        task.mark_retrying("generation timed out").unwrap();
        task.mark_retrying("generation timed out").unwrap();

        assert_eq!(task.status(), TaskStatus::Processing);
        assert_eq!(task.attempt(), 3);
        assert_eq!(task.error(), Some("generation timed out"));
    }

    #[test]
    fn test_fail_records_hint() {
        let mut task = task();
        task.begin().unwrap();
        task.fail(
            "generation rejected: insufficient data",
            Some("add more source content first".to_string()),
        )
        .unwrap();

        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(
            task.alternative_approach(),
            Some("add more source content first")
        );
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut task = task();
        task.begin().unwrap();
        task.complete("<p>done</p>").unwrap();

        assert!(task.mark_retrying("late error").is_err());
        assert!(task.fail("late error", None).is_err());
        assert!(task.begin().is_err());
    }

    #[test]
    fn test_reset_reenters_pending() {
        let mut task = task();
        task.begin().unwrap();
        task.fail("broken", Some("hint".to_string())).unwrap();

        task.reset();

        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.progress(), 0);
        assert_eq!(task.attempt(), 0);
        assert!(task.error().is_none());
        assert!(task.alternative_approach().is_none());

        task.begin().unwrap();
        assert_eq!(task.attempt(), 1);
    }

    #[test]
    fn test_advance_progress_ignored_while_pending() {
        let mut task = task();
        assert!(!task.advance_progress(40));
        assert_eq!(task.progress(), 0);
    }
}
