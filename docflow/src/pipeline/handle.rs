//! The caller-facing handle to one pipeline run.

use super::orchestrator::RunCore;
use crate::core::{PipelineSnapshot, RunSummary};
use crate::errors::PipelineError;
use crate::progress::ProgressOverride;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A handle to one in-flight (or finished) pipeline run.
///
/// The handle exposes observable state, cancellation, the external
/// progress-override channel, and manual feature retry. Dropping the
/// handle tears the run down: the cancellation token fires, in-flight
/// work is abandoned, and the override listener winds down with its
/// senders. No task outlives its run.
pub struct PipelineHandle {
    core: Arc<RunCore>,
    user_id: String,
    requested: Vec<String>,
    override_tx: mpsc::Sender<ProgressOverride>,
    #[allow(dead_code)]
    listener: JoinHandle<()>,
    started: AtomicBool,
    join: Mutex<Option<JoinHandle<Result<RunSummary, PipelineError>>>>,
}

impl PipelineHandle {
    pub(crate) fn new(
        core: Arc<RunCore>,
        override_tx: mpsc::Sender<ProgressOverride>,
        listener: JoinHandle<()>,
        user_id: String,
        requested: Vec<String>,
        auto_start: bool,
    ) -> Self {
        let handle = Self {
            core,
            user_id,
            requested,
            override_tx,
            listener,
            started: AtomicBool::new(false),
            join: Mutex::new(None),
        };
        if auto_start {
            handle.start();
        }
        handle
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.core.run_id
    }

    /// Starts the run if it has not been started yet. A second call is a
    /// no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let core = Arc::clone(&self.core);
        let user_id = self.user_id.clone();
        let requested = self.requested.clone();
        *self.join.lock() = Some(tokio::spawn(core.execute(user_id, requested)));
    }

    /// Returns an observer snapshot: tasks, overall progress, completion,
    /// and the current document.
    #[must_use]
    pub fn snapshot(&self) -> PipelineSnapshot {
        self.core.snapshot()
    }

    /// Returns an immutable snapshot of the working document.
    #[must_use]
    pub fn current_document(&self) -> String {
        self.snapshot().current_document
    }

    /// Cancels the run. The current in-flight remote call is abandoned
    /// and no further features are started. Cancelling a finished run
    /// has no effect.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.core.cancellation.cancel(reason);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.core.cancellation.is_cancelled()
    }

    /// Returns a sender for external progress overrides.
    #[must_use]
    pub fn override_sender(&self) -> mpsc::Sender<ProgressOverride> {
        self.override_tx.clone()
    }

    /// Waits for the run to finish and returns its summary.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NotStarted`] when the run was never started or
    ///   the summary was already consumed.
    /// - [`PipelineError::BaseDocument`] when the base document fetch
    ///   failed (the run aborts before any feature executes).
    pub async fn join(&self) -> Result<RunSummary, PipelineError> {
        let Some(task) = self.join.lock().take() else {
            return Err(PipelineError::NotStarted);
        };
        task.await
            .map_err(|err| PipelineError::Internal(format!("run task failed: {err}")))?
    }

    /// Re-enters a failed feature at pending, bypassing its terminal
    /// state and resetting its retry state, then runs it to a new
    /// terminal state.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::UnknownRunFeature`] when the feature is not
    ///   part of this run.
    /// - [`PipelineError::NotRetryable`] when the feature has not failed.
    pub async fn retry_feature(&self, feature_id: &str) -> Result<(), PipelineError> {
        self.core.retry_feature(feature_id).await
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.core.cancellation.cancel("pipeline handle dropped");
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("run_id", &self.core.run_id)
            .field("requested", &self.requested)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
