//! Progress aggregation and the external override channel.

use crate::core::{is_complete, overall_progress, FeatureTask, TaskStatus};
use crate::errors::InvalidTransition;
use crate::events::{EventSink, PipelineEvent};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// An external progress snapshot for one feature.
///
/// Overrides come from a coordinating service (a push channel) and are
/// applied last-writer-wins per field: absent fields leave the local
/// value in place, present fields overwrite it. Local computation keeps
/// running either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressOverride {
    /// The feature to overwrite.
    pub feature_id: String,
    /// Replacement status, if supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// Replacement progress, if supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Replacement error message, if supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tracks per-feature and overall completion state for one run.
///
/// Local mutations go through the task state machine; the override path
/// deliberately bypasses it (see [`ProgressOverride`]).
pub struct ProgressAggregator {
    run_id: Uuid,
    tasks: RwLock<Vec<FeatureTask>>,
    sink: Arc<dyn EventSink>,
}

impl ProgressAggregator {
    /// Creates an aggregator over the run's tasks, in requested order.
    #[must_use]
    pub fn new(run_id: Uuid, tasks: Vec<FeatureTask>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            run_id,
            tasks: RwLock::new(tasks),
            sink,
        }
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn with_task<R>(
        &self,
        feature_id: &str,
        mutate: impl FnOnce(&mut FeatureTask) -> R,
    ) -> Option<R> {
        let mut tasks = self.tasks.write();
        tasks
            .iter_mut()
            .find(|task| task.id() == feature_id)
            .map(mutate)
    }

    /// Starts a feature's first attempt.
    pub fn begin(&self, feature_id: &str) -> Result<(), InvalidTransition> {
        let result = self
            .with_task(feature_id, FeatureTask::begin)
            .unwrap_or(Ok(()));
        if result.is_ok() {
            self.emit_progress(feature_id);
        }
        result
    }

    /// Advances a feature's in-flight progress.
    pub fn advance_progress(&self, feature_id: &str, progress: u8) {
        let applied = self
            .with_task(feature_id, |task| task.advance_progress(progress))
            .unwrap_or(false);
        if applied {
            self.emit_progress(feature_id);
        }
    }

    /// Records a retry on a feature.
    pub fn mark_retrying(
        &self,
        feature_id: &str,
        error: impl Into<String>,
    ) -> Result<(), InvalidTransition> {
        self.with_task(feature_id, |task| task.mark_retrying(error))
            .unwrap_or(Ok(()))
    }

    /// Completes a feature with its validated fragment.
    pub fn complete(
        &self,
        feature_id: &str,
        fragment: impl Into<String>,
    ) -> Result<(), InvalidTransition> {
        let result = self
            .with_task(feature_id, |task| task.complete(fragment))
            .unwrap_or(Ok(()));
        if result.is_ok() {
            self.emit_progress(feature_id);
        }
        result
    }

    /// Fails a feature with a message and optional hint.
    pub fn fail(
        &self,
        feature_id: &str,
        error: impl Into<String>,
        alternative_approach: Option<String>,
    ) -> Result<(), InvalidTransition> {
        self.with_task(feature_id, |task| task.fail(error, alternative_approach))
            .unwrap_or(Ok(()))
    }

    /// Resets a feature to pending for a caller-requested retry.
    pub fn reset(&self, feature_id: &str) {
        let _ = self.with_task(feature_id, FeatureTask::reset);
    }

    /// Applies an external override, last-writer-wins per field.
    pub fn apply_override(&self, update: &ProgressOverride) {
        let applied = self.with_task(&update.feature_id, |task| {
            if let Some(status) = update.status {
                task.force_status(status);
            }
            if let Some(progress) = update.progress {
                task.force_progress(progress);
            }
            if let Some(error) = &update.error {
                task.force_error(error.clone());
            }
        });

        if applied.is_some() {
            debug!(feature = %update.feature_id, "applied external progress override");
            self.sink.try_emit(&PipelineEvent::ProgressOverridden {
                feature_id: update.feature_id.clone(),
            });
        } else {
            warn!(
                feature = %update.feature_id,
                "ignored override for unknown feature"
            );
        }
    }

    /// Spawns a task draining an override channel into this aggregator.
    ///
    /// The task ends when every sender is dropped.
    pub fn spawn_override_listener(
        self: &Arc<Self>,
        mut receiver: mpsc::Receiver<ProgressOverride>,
    ) -> JoinHandle<()> {
        let aggregator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(update) = receiver.recv().await {
                aggregator.apply_override(&update);
            }
        })
    }

    /// Returns a copy of one task.
    #[must_use]
    pub fn task(&self, feature_id: &str) -> Option<FeatureTask> {
        self.tasks
            .read()
            .iter()
            .find(|task| task.id() == feature_id)
            .cloned()
    }

    /// Returns copies of all tasks in requested order.
    #[must_use]
    pub fn tasks(&self) -> Vec<FeatureTask> {
        self.tasks.read().clone()
    }

    /// Returns overall progress, 0-100.
    #[must_use]
    pub fn overall_progress(&self) -> u8 {
        overall_progress(&self.tasks.read())
    }

    /// Returns true when every task is terminal.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        is_complete(&self.tasks.read())
    }

    fn emit_progress(&self, feature_id: &str) {
        if let Some(task) = self.task(feature_id) {
            self.sink.try_emit(&PipelineEvent::FeatureProgress {
                feature_id: feature_id.to_string(),
                progress: task.progress(),
            });
        }
    }
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("run_id", &self.run_id)
            .field("tasks", &self.tasks.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingEventSink, NoOpEventSink};

    fn aggregator_with(sink: Arc<dyn EventSink>) -> ProgressAggregator {
        ProgressAggregator::new(
            Uuid::new_v4(),
            vec![
                FeatureTask::new("professional-summary", "Professional Summary"),
                FeatureTask::new("skills-matrix", "Skills Matrix"),
            ],
            sink,
        )
    }

    #[test]
    fn test_overall_progress_and_completion() {
        let aggregator = aggregator_with(Arc::new(NoOpEventSink));
        assert_eq!(aggregator.overall_progress(), 0);
        assert!(!aggregator.is_complete());

        aggregator.begin("professional-summary").unwrap();
        aggregator
            .complete("professional-summary", "<p>done</p>")
            .unwrap();
        assert_eq!(aggregator.overall_progress(), 50);
        assert!(!aggregator.is_complete());

        aggregator.begin("skills-matrix").unwrap();
        aggregator.fail("skills-matrix", "broken", None).unwrap();
        assert_eq!(aggregator.overall_progress(), 50);
        assert!(aggregator.is_complete());
    }

    #[test]
    fn test_local_progress_is_monotonic() {
        let aggregator = aggregator_with(Arc::new(NoOpEventSink));
        aggregator.begin("skills-matrix").unwrap();

        let mut observed = Vec::new();
        for value in [30, 10, 60, 55, 80] {
            aggregator.advance_progress("skills-matrix", value);
            observed.push(aggregator.task("skills-matrix").unwrap().progress());
        }

        let mut sorted = observed.clone();
        sorted.sort_unstable();
        assert_eq!(observed, sorted);
    }

    #[test]
    fn test_override_is_last_writer_wins_per_field() {
        let aggregator = aggregator_with(Arc::new(NoOpEventSink));
        aggregator.begin("skills-matrix").unwrap();
        aggregator.advance_progress("skills-matrix", 60);

        aggregator.apply_override(&ProgressOverride {
            feature_id: "skills-matrix".to_string(),
            status: None,
            progress: Some(35),
            error: None,
        });

        let task = aggregator.task("skills-matrix").unwrap();
        // The override may move progress backwards; local state wins again
        // on the next local update.
        assert_eq!(task.progress(), 35);
        assert_eq!(task.status(), TaskStatus::Processing);

        aggregator.advance_progress("skills-matrix", 70);
        assert_eq!(aggregator.task("skills-matrix").unwrap().progress(), 70);
    }

    #[test]
    fn test_override_for_unknown_feature_is_ignored() {
        let aggregator = aggregator_with(Arc::new(NoOpEventSink));
        aggregator.apply_override(&ProgressOverride {
            feature_id: "ghost".to_string(),
            status: Some(TaskStatus::Completed),
            progress: Some(100),
            error: None,
        });
        assert!(aggregator.task("ghost").is_none());
    }

    #[test]
    fn test_events_are_emitted_for_progress() {
        let sink = Arc::new(CollectingEventSink::new());
        let aggregator = aggregator_with(sink.clone());

        aggregator.begin("skills-matrix").unwrap();
        aggregator.advance_progress("skills-matrix", 50);
        aggregator.complete("skills-matrix", "<p>done</p>").unwrap();

        let progress_events = sink.events_of_kind("feature.progress");
        assert!(progress_events.len() >= 3);
    }

    #[tokio::test]
    async fn test_override_listener_applies_channel_updates() {
        let aggregator = Arc::new(aggregator_with(Arc::new(NoOpEventSink)));
        let (sender, receiver) = mpsc::channel(8);
        let listener = aggregator.spawn_override_listener(receiver);

        sender
            .send(ProgressOverride {
                feature_id: "professional-summary".to_string(),
                status: Some(TaskStatus::Processing),
                progress: Some(40),
                error: None,
            })
            .await
            .unwrap();
        drop(sender);
        listener.await.unwrap();

        let task = aggregator.task("professional-summary").unwrap();
        assert_eq!(task.status(), TaskStatus::Processing);
        assert_eq!(task.progress(), 40);
    }

    #[test]
    fn test_reset_allows_fresh_begin() {
        let aggregator = aggregator_with(Arc::new(NoOpEventSink));
        aggregator.begin("skills-matrix").unwrap();
        aggregator.fail("skills-matrix", "broken", None).unwrap();

        aggregator.reset("skills-matrix");
        aggregator.begin("skills-matrix").unwrap();

        let task = aggregator.task("skills-matrix").unwrap();
        assert_eq!(task.status(), TaskStatus::Processing);
        assert_eq!(task.attempt(), 1);
    }
}
