//! Task execution: one remote generation call per feature, with timeout.

use crate::errors::ExecutionError;
use crate::registry::FeatureRegistry;
use crate::services::GenerationService;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// An unprocessed fragment as returned by the generation service.
#[derive(Debug, Clone)]
pub struct RawFragment {
    /// The feature that produced the fragment.
    pub feature_id: String,
    /// The raw generated content.
    pub content: String,
}

/// Invokes the remote generation operation for one feature.
///
/// The executor has no side effects beyond the remote call and never
/// touches shared document state; the orchestrator owns all mutation.
pub struct TaskExecutor {
    service: Arc<dyn GenerationService>,
    timeout: Duration,
}

impl TaskExecutor {
    /// Creates an executor over a generation service.
    #[must_use]
    pub fn new(service: Arc<dyn GenerationService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Returns the configured per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Executes the generation operation for `feature_id`.
    ///
    /// # Errors
    ///
    /// - [`ExecutionError::UnknownFeature`] when the id is not registered
    ///   (a configuration error, never retried).
    /// - [`ExecutionError::Timeout`] when the remote call exceeds the
    ///   configured timeout.
    /// - [`ExecutionError::RemoteRejected`] when the service reports a
    ///   non-success payload.
    pub async fn execute(
        &self,
        registry: &FeatureRegistry,
        run_id: Uuid,
        feature_id: &str,
    ) -> Result<RawFragment, ExecutionError> {
        let spec = registry
            .get(feature_id)
            .ok_or_else(|| ExecutionError::UnknownFeature {
                feature: feature_id.to_string(),
            })?;

        debug!(
            feature = feature_id,
            operation = %spec.operation,
            %run_id,
            "executing generation operation"
        );

        let response = tokio::time::timeout(
            self.timeout,
            self.service.invoke(&spec.operation, run_id, feature_id),
        )
        .await
        .map_err(|_| ExecutionError::Timeout {
            feature: feature_id.to_string(),
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        })?;

        if !response.success {
            return Err(ExecutionError::RemoteRejected {
                feature: feature_id.to_string(),
                message: response
                    .error
                    .unwrap_or_else(|| "generation failed".to_string()),
            });
        }

        let content = response
            .fragment
            .ok_or_else(|| ExecutionError::RemoteRejected {
                feature: feature_id.to_string(),
                message: "generation returned no fragment".to_string(),
            })?;

        Ok(RawFragment {
            feature_id: feature_id.to_string(),
            content,
        })
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::default_registry;
    use crate::services::{GenerationResponse, MockGenerationService};
    use crate::testing::{ScriptedGenerationService, ScriptedOutcome};

    #[tokio::test]
    async fn test_execute_returns_fragment() {
        let mut service = MockGenerationService::new();
        service
            .expect_invoke()
            .withf(|operation, _, feature| {
                operation == "generate_skills_matrix" && feature == "skills-matrix"
            })
            .returning(|_, _, _| GenerationResponse::ok("<ul><li>Rust</li></ul>"));

        let executor = TaskExecutor::new(Arc::new(service), Duration::from_secs(5));
        let registry = default_registry();

        let raw = executor
            .execute(&registry, Uuid::new_v4(), "skills-matrix")
            .await
            .unwrap();

        assert_eq!(raw.feature_id, "skills-matrix");
        assert_eq!(raw.content, "<ul><li>Rust</li></ul>");
    }

    #[tokio::test]
    async fn test_unknown_feature_fails_fast() {
        let mut service = MockGenerationService::new();
        service.expect_invoke().times(0);

        let executor = TaskExecutor::new(Arc::new(service), Duration::from_secs(5));
        let registry = default_registry();

        let err = executor
            .execute(&registry, Uuid::new_v4(), "ghost-feature")
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::UnknownFeature { .. }));
    }

    #[tokio::test]
    async fn test_remote_rejection_is_typed() {
        let mut service = MockGenerationService::new();
        service
            .expect_invoke()
            .returning(|_, _, _| GenerationResponse::rejected("insufficient data"));

        let executor = TaskExecutor::new(Arc::new(service), Duration::from_secs(5));
        let registry = default_registry();

        let err = executor
            .execute(&registry, Uuid::new_v4(), "skills-matrix")
            .await
            .unwrap_err();

        match err {
            ExecutionError::RemoteRejected { message, .. } => {
                assert_eq!(message, "insufficient data");
            }
            other => panic!("expected RemoteRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_without_fragment_is_rejected() {
        let mut service = MockGenerationService::new();
        service.expect_invoke().returning(|_, _, _| GenerationResponse {
            success: true,
            fragment: None,
            error: None,
        });

        let executor = TaskExecutor::new(Arc::new(service), Duration::from_secs(5));
        let registry = default_registry();

        let err = executor
            .execute(&registry, Uuid::new_v4(), "skills-matrix")
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::RemoteRejected { .. }));
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let service = ScriptedGenerationService::new();
        service.script("skills-matrix", ScriptedOutcome::Hang);

        let executor = TaskExecutor::new(Arc::new(service), Duration::from_millis(20));
        let registry = default_registry();

        let err = executor
            .execute(&registry, Uuid::new_v4(), "skills-matrix")
            .await
            .unwrap_err();

        match err {
            ExecutionError::Timeout { timeout_ms, .. } => assert_eq!(timeout_ms, 20),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}
