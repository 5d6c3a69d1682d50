//! The pipeline driver: builder, service bundle, and run execution.

use crate::cancellation::RunCancellation;
use crate::core::{Document, FeatureTask, PipelineSnapshot, RunSummary, TaskStatus};
use crate::errors::{BuildError, PipelineError, TaskError};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::executor::TaskExecutor;
use crate::merge::{MergeEngine, MergeStrategy};
use crate::observability::SpanTimer;
use crate::planner::{PlannerConfig, PreferenceWeights, PriorityPlanner, SuccessHistory};
use crate::processor::{FragmentProcessor, ValidatedFragment};
use crate::progress::{ProgressAggregator, ProgressOverride};
use crate::recovery::{RecoveryController, RetryState};
use crate::registry::FeatureRegistry;
use crate::services::{DocumentSource, GenerationService, PreferenceStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{PipelineHandle, PipelineOptions};

/// Capacity of the external progress-override channel.
const OVERRIDE_CHANNEL_CAPACITY: usize = 64;

/// Fallback preference store used when none is configured.
#[derive(Debug, Default)]
struct NoPreferences;

#[async_trait]
impl PreferenceStore for NoPreferences {
    async fn user_preferences(&self, _user_id: &str) -> PreferenceWeights {
        PreferenceWeights::default()
    }
}

/// Assembles an [`EnhancementPipeline`] from its collaborators.
pub struct PipelineBuilder {
    registry: Arc<FeatureRegistry>,
    documents: Option<Arc<dyn DocumentSource>>,
    generator: Option<Arc<dyn GenerationService>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
    history: SuccessHistory,
    planner_config: PlannerConfig,
    sink: Arc<dyn EventSink>,
}

impl PipelineBuilder {
    /// Creates a builder with the default feature registry, no
    /// preference store, and a no-op event sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(crate::registry::default_registry()),
            documents: None,
            generator: None,
            preferences: None,
            history: SuccessHistory::new(),
            planner_config: PlannerConfig::default(),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Replaces the feature registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<FeatureRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the document source.
    #[must_use]
    pub fn document_source(mut self, documents: Arc<dyn DocumentSource>) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Sets the generation service.
    #[must_use]
    pub fn generation_service(mut self, generator: Arc<dyn GenerationService>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Sets the preference store.
    #[must_use]
    pub fn preference_store(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Sets the historical success rates fed to the planner.
    #[must_use]
    pub fn success_history(mut self, history: SuccessHistory) -> Self {
        self.history = history;
        self
    }

    /// Sets the planner score weights.
    #[must_use]
    pub fn planner_config(mut self, config: PlannerConfig) -> Self {
        self.planner_config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Fails when the document source or generation service is missing.
    pub fn build(self) -> Result<EnhancementPipeline, BuildError> {
        let documents = self.documents.ok_or(BuildError::MissingComponent {
            component: "document source",
        })?;
        let generator = self.generator.ok_or(BuildError::MissingComponent {
            component: "generation service",
        })?;

        Ok(EnhancementPipeline {
            registry: self.registry,
            documents,
            generator,
            preferences: self
                .preferences
                .unwrap_or_else(|| Arc::new(NoPreferences)),
            history: self.history,
            planner_config: self.planner_config,
            sink: self.sink,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The document-enhancement pipeline: starts runs over a shared set of
/// collaborators.
///
/// Each run owns its document, task list, and retry state; concurrent
/// runs share nothing mutable.
pub struct EnhancementPipeline {
    registry: Arc<FeatureRegistry>,
    documents: Arc<dyn DocumentSource>,
    generator: Arc<dyn GenerationService>,
    preferences: Arc<dyn PreferenceStore>,
    history: SuccessHistory,
    planner_config: PlannerConfig,
    sink: Arc<dyn EventSink>,
}

impl EnhancementPipeline {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Creates a run over the requested features and returns its handle.
    ///
    /// Duplicate feature ids are collapsed to one task each. With
    /// `auto_start` the run begins immediately; otherwise call
    /// [`PipelineHandle::start`]. Must be called within a tokio runtime.
    #[must_use]
    pub fn start_pipeline(
        &self,
        run_id: Uuid,
        user_id: impl Into<String>,
        feature_ids: &[String],
        options: PipelineOptions,
    ) -> PipelineHandle {
        let mut requested: Vec<String> = Vec::with_capacity(feature_ids.len());
        for id in feature_ids {
            if !requested.contains(id) {
                requested.push(id.clone());
            }
        }

        let tasks: Vec<FeatureTask> = requested
            .iter()
            .map(|id| {
                let display_name = self
                    .registry
                    .get(id)
                    .map_or_else(|| id.clone(), |spec| spec.display_name.clone());
                FeatureTask::new(id.clone(), display_name)
            })
            .collect();

        let aggregator = Arc::new(ProgressAggregator::new(run_id, tasks, self.sink.clone()));
        let (override_tx, override_rx) = mpsc::channel::<ProgressOverride>(OVERRIDE_CHANNEL_CAPACITY);
        let listener = aggregator.spawn_override_listener(override_rx);

        let auto_start = options.auto_start;
        let core = Arc::new(RunCore {
            run_id,
            registry: Arc::clone(&self.registry),
            documents: Arc::clone(&self.documents),
            preferences: Arc::clone(&self.preferences),
            planner: PriorityPlanner::new(self.planner_config.clone()),
            history: self.history.clone(),
            executor: TaskExecutor::new(Arc::clone(&self.generator), options.task_timeout()),
            processor: FragmentProcessor::new(),
            engine: MergeEngine::new(),
            recovery: RecoveryController::new(options.recovery_config()),
            aggregator,
            document: RwLock::new(Document::default()),
            cancellation: RunCancellation::new(),
            sink: self.sink.clone(),
            options,
        });

        PipelineHandle::new(core, override_tx, listener, user_id.into(), requested, auto_start)
    }
}

/// Outcome of one feature's full attempt loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeatureOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// The per-run execution state shared by the run task and its handle.
pub(crate) struct RunCore {
    pub(crate) run_id: Uuid,
    pub(crate) registry: Arc<FeatureRegistry>,
    pub(crate) documents: Arc<dyn DocumentSource>,
    pub(crate) preferences: Arc<dyn PreferenceStore>,
    pub(crate) planner: PriorityPlanner,
    pub(crate) history: SuccessHistory,
    pub(crate) executor: TaskExecutor,
    pub(crate) processor: FragmentProcessor,
    pub(crate) engine: MergeEngine,
    pub(crate) recovery: RecoveryController,
    pub(crate) aggregator: Arc<ProgressAggregator>,
    pub(crate) document: RwLock<Document>,
    pub(crate) cancellation: RunCancellation,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) options: PipelineOptions,
}

impl RunCore {
    /// Runs the whole pipeline: fetch base, plan, execute features in
    /// order, and summarize.
    pub(crate) async fn execute(
        self: Arc<Self>,
        user_id: String,
        requested: Vec<String>,
    ) -> Result<RunSummary, PipelineError> {
        let timer = SpanTimer::start("pipeline.run");

        let preferences = self.preferences.user_preferences(&user_id).await;
        let base = self.documents.fetch_base_document(self.run_id).await?;
        *self.document.write() = Document::new(base);

        let order = self
            .planner
            .plan(&self.registry, &requested, &self.history, &preferences);

        self.sink
            .emit(&PipelineEvent::RunStarted {
                run_id: self.run_id,
                total_features: order.len(),
            })
            .await;
        info!(run_id = %self.run_id, total = order.len(), "starting enhancement run");

        for (index, feature_id) in order.iter().enumerate() {
            if self.cancellation.is_cancelled() {
                break;
            }

            let outcome = self.run_feature(feature_id).await;
            if outcome == FeatureOutcome::Cancelled {
                break;
            }

            // Throttle the remote service before the next feature.
            if let Some(next_id) = order.get(index + 1) {
                let pause = self.inter_feature_delay(next_id);
                if !pause.is_zero() {
                    tokio::select! {
                        () = self.cancellation.cancelled() => break,
                        () = tokio::time::sleep(pause) => {}
                    }
                }
            }
        }

        let summary = self.build_summary(timer.finish());
        if summary.cancelled {
            self.sink
                .emit(&PipelineEvent::RunCancelled {
                    run_id: self.run_id,
                    reason: summary
                        .cancel_reason
                        .clone()
                        .unwrap_or_else(|| "cancelled".to_string()),
                })
                .await;
        } else {
            self.sink
                .emit(&PipelineEvent::RunCompleted {
                    run_id: self.run_id,
                    completed: summary.completed.len(),
                    failed: summary.failed.len(),
                    duration_ms: summary.duration_ms,
                })
                .await;
        }
        info!(
            run_id = %self.run_id,
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            cancelled = summary.cancelled,
            "enhancement run finished"
        );

        Ok(summary)
    }

    /// Runs one feature through execute -> process -> merge with
    /// recovery, until it reaches a terminal state or the run is
    /// cancelled.
    pub(crate) async fn run_feature(&self, feature_id: &str) -> FeatureOutcome {
        let mut state = RetryState::new(self.options.max_retry_attempts);

        if let Err(err) = self.aggregator.begin(feature_id) {
            warn!(feature = feature_id, %err, "could not begin feature");
        }

        loop {
            state.begin_attempt();
            self.sink.try_emit(&PipelineEvent::FeatureStarted {
                feature_id: feature_id.to_string(),
                attempt: state.attempt,
            });

            let attempted = tokio::select! {
                () = self.cancellation.cancelled() => {
                    debug!(feature = feature_id, "in-flight attempt abandoned by cancellation");
                    return FeatureOutcome::Cancelled;
                }
                result = self.attempt(feature_id) => result,
            };

            match attempted {
                Ok(fragment) => {
                    self.merge_fragment(&fragment);
                    if let Err(err) = self.aggregator.complete(feature_id, fragment.content) {
                        warn!(feature = feature_id, %err, "could not complete feature");
                    }
                    self.sink.try_emit(&PipelineEvent::FeatureCompleted {
                        feature_id: feature_id.to_string(),
                        attempt: state.attempt,
                    });
                    self.recovery.clear_history(feature_id);
                    return FeatureOutcome::Completed;
                }
                Err(error) => {
                    let decision = self.recovery.classify(&error, &state);
                    state.last_strategy = decision.strategy;

                    if decision.should_retry {
                        if let Err(err) = self.aggregator.mark_retrying(feature_id, error.to_string())
                        {
                            warn!(feature = feature_id, %err, "could not record retry");
                        }
                        self.sink.try_emit(&PipelineEvent::FeatureRetrying {
                            feature_id: feature_id.to_string(),
                            attempt: state.attempt + 1,
                            delay_ms: u64::try_from(decision.delay.as_millis())
                                .unwrap_or(u64::MAX),
                            error: error.to_string(),
                        });

                        tokio::select! {
                            () = self.cancellation.cancelled() => return FeatureOutcome::Cancelled,
                            () = tokio::time::sleep(decision.delay) => {}
                        }
                    } else {
                        if let Err(err) = self.aggregator.fail(
                            feature_id,
                            error.to_string(),
                            decision.alternative_approach.clone(),
                        ) {
                            warn!(feature = feature_id, %err, "could not fail feature");
                        }
                        self.sink.try_emit(&PipelineEvent::FeatureFailed {
                            feature_id: feature_id.to_string(),
                            error: error.to_string(),
                            alternative_approach: decision.alternative_approach,
                        });
                        self.recovery.clear_history(feature_id);
                        return FeatureOutcome::Failed;
                    }
                }
            }
        }
    }

    /// One attempt: execute the remote operation, then validate.
    async fn attempt(&self, feature_id: &str) -> Result<ValidatedFragment, TaskError> {
        self.aggregator.advance_progress(feature_id, 15);

        let raw = self
            .executor
            .execute(&self.registry, self.run_id, feature_id)
            .await?;
        self.aggregator.advance_progress(feature_id, 55);

        let validated = self.processor.process(raw)?;
        self.aggregator.advance_progress(feature_id, 85);

        Ok(validated)
    }

    /// Merges a validated fragment into the working document. The merge
    /// engine is the sole writer of `current`.
    fn merge_fragment(&self, fragment: &ValidatedFragment) {
        let strategy = self
            .registry
            .get(&fragment.feature_id)
            .map_or(MergeStrategy::Append, |spec| spec.strategy.clone());

        let (requested, applied, fell_back) = {
            let mut document = self.document.write();
            let outcome = self.engine.merge(document.current(), fragment, &strategy);
            let details = (outcome.requested, outcome.applied, outcome.fell_back);
            document.apply(outcome.document);
            details
        };

        if fell_back {
            debug!(
                feature = %fragment.feature_id,
                requested,
                applied,
                "merge fell back"
            );
            self.sink.try_emit(&PipelineEvent::MergeFellBack {
                feature_id: fragment.feature_id.clone(),
                requested: requested.to_string(),
                applied: applied.to_string(),
            });
        }
    }

    /// Re-enters a failed feature at pending with fresh retry state.
    pub(crate) async fn retry_feature(&self, feature_id: &str) -> Result<(), PipelineError> {
        let task = self
            .aggregator
            .task(feature_id)
            .ok_or_else(|| PipelineError::UnknownRunFeature {
                feature: feature_id.to_string(),
            })?;

        if task.status() != TaskStatus::Failed {
            return Err(PipelineError::NotRetryable {
                feature: feature_id.to_string(),
                status: task.status(),
            });
        }

        info!(feature = feature_id, run_id = %self.run_id, "manually retrying feature");
        self.recovery.clear_history(feature_id);
        self.aggregator.reset(feature_id);
        let _ = self.run_feature(feature_id).await;
        Ok(())
    }

    fn inter_feature_delay(&self, next_feature: &str) -> std::time::Duration {
        let complexity = self
            .registry
            .get(next_feature)
            .map_or(1.0, |spec| spec.complexity.clamp(0.0, 1.0));
        let millis = (self.options.inter_feature_delay_ms as f64 * complexity).round() as u64;
        std::time::Duration::from_millis(millis)
    }

    /// Returns an observer snapshot of the run.
    pub(crate) fn snapshot(&self) -> PipelineSnapshot {
        let features = self.aggregator.tasks();
        PipelineSnapshot {
            run_id: self.run_id,
            overall_progress: crate::core::overall_progress(&features),
            is_complete: crate::core::is_complete(&features),
            current_document: self.document.read().snapshot(),
            features,
        }
    }

    fn build_summary(&self, duration_ms: f64) -> RunSummary {
        let features = self.aggregator.tasks();
        let completed = features
            .iter()
            .filter(|task| task.status() == TaskStatus::Completed)
            .map(|task| task.id().to_string())
            .collect();
        let failed = features
            .iter()
            .filter(|task| task.status() == TaskStatus::Failed)
            .map(|task| task.id().to_string())
            .collect();

        RunSummary {
            run_id: self.run_id,
            features,
            completed,
            failed,
            cancelled: self.cancellation.is_cancelled(),
            cancel_reason: self.cancellation.reason(),
            duration_ms,
            document: self.document.read().snapshot(),
        }
    }
}
