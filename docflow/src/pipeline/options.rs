//! Per-run pipeline options.

use crate::recovery::{JitterStrategy, RecoveryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options recognized when starting a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Start executing as soon as the handle is created.
    pub auto_start: bool,
    /// Maximum attempts per feature, including the first.
    pub max_retry_attempts: u32,
    /// Base retry delay in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Retry delay cap in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Per-call remote generation timeout in milliseconds.
    pub task_timeout_ms: u64,
    /// Base inter-feature delay in milliseconds, scaled by the next
    /// feature's estimated complexity to throttle the remote service.
    pub inter_feature_delay_ms: u64,
    /// Jitter applied to retry delays.
    pub jitter: JitterStrategy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            auto_start: true,
            max_retry_attempts: 3,
            retry_base_delay_ms: 500,
            max_retry_delay_ms: 5000,
            task_timeout_ms: 30_000,
            inter_feature_delay_ms: 250,
            jitter: JitterStrategy::None,
        }
    }
}

impl PipelineOptions {
    /// Creates options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the run starts immediately.
    #[must_use]
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Sets the per-feature attempt ceiling.
    #[must_use]
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Sets the base retry delay.
    #[must_use]
    pub fn with_retry_base_delay_ms(mut self, delay: u64) -> Self {
        self.retry_base_delay_ms = delay;
        self
    }

    /// Sets the retry delay cap.
    #[must_use]
    pub fn with_max_retry_delay_ms(mut self, delay: u64) -> Self {
        self.max_retry_delay_ms = delay;
        self
    }

    /// Sets the remote generation timeout.
    #[must_use]
    pub fn with_task_timeout_ms(mut self, timeout: u64) -> Self {
        self.task_timeout_ms = timeout;
        self
    }

    /// Sets the base inter-feature delay.
    #[must_use]
    pub fn with_inter_feature_delay_ms(mut self, delay: u64) -> Self {
        self.inter_feature_delay_ms = delay;
        self
    }

    /// Sets the retry jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the remote generation timeout as a duration.
    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// Builds the recovery configuration these options describe.
    #[must_use]
    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig::new()
            .with_max_attempts(self.max_retry_attempts)
            .with_base_delay_ms(self.retry_base_delay_ms)
            .with_max_delay_ms(self.max_retry_delay_ms)
            .with_jitter(self.jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = PipelineOptions::default();
        assert!(options.auto_start);
        assert_eq!(options.max_retry_attempts, 3);
        assert_eq!(options.retry_base_delay_ms, 500);
        assert_eq!(options.max_retry_delay_ms, 5000);
        assert_eq!(options.task_timeout(), Duration::from_secs(30));
        assert_eq!(options.jitter, JitterStrategy::None);
    }

    #[test]
    fn test_builder_chain() {
        let options = PipelineOptions::new()
            .with_auto_start(false)
            .with_max_retry_attempts(5)
            .with_retry_base_delay_ms(10)
            .with_max_retry_delay_ms(100)
            .with_task_timeout_ms(2000)
            .with_inter_feature_delay_ms(0)
            .with_jitter(JitterStrategy::Equal);

        assert!(!options.auto_start);
        assert_eq!(options.max_retry_attempts, 5);
        assert_eq!(options.inter_feature_delay_ms, 0);

        let recovery = options.recovery_config();
        assert_eq!(recovery.max_attempts, 5);
        assert_eq!(recovery.base_delay_ms, 10);
        assert_eq!(recovery.max_delay_ms, 100);
        assert_eq!(recovery.jitter, JitterStrategy::Equal);
    }
}
