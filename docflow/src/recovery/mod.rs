//! Failure classification and adaptive retry policy.
//!
//! The recovery controller decides, for each failed attempt, whether the
//! task should retry, how long to wait, and which generation strategy
//! the retry should use. Retry state is owned per task; the controller
//! itself only keeps an attempt history for later analysis, cleared when
//! a feature reaches a terminal state.

use crate::errors::{ExecutionError, TaskError};
use crate::utils::{now_utc, Timestamp};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Remote rejection messages containing any of these markers describe
/// structurally insufficient input and are not worth retrying.
const NON_RECOVERABLE_MARKERS: [&str; 4] = [
    "insufficient data",
    "insufficient input",
    "invalid input",
    "not enough content",
];

/// The generation strategy to use for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// The feature's normal generation path.
    #[default]
    Standard,
    /// Reduced scope, fewer structural requirements.
    Simplified,
    /// Minimal output, maximum tolerance.
    Conservative,
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Simplified => write!(f, "simplified"),
            Self::Conservative => write!(f, "conservative"),
        }
    }
}

/// Jitter applied to retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JitterStrategy {
    /// No jitter; delays stay deterministic.
    #[default]
    None,
    /// Random from 0 to delay.
    Full,
    /// Half fixed, half random.
    Equal,
}

/// Configuration for the recovery controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Maximum attempts per task, including the first.
    pub max_attempts: u32,
    /// Base retry delay in milliseconds.
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds, keeping pipelines responsive.
    pub max_delay_ms: u64,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 5000,
            jitter: JitterStrategy::None,
        }
    }
}

impl RecoveryConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Per-task retry state, owned by the task's execution loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryState {
    /// Attempts started so far.
    pub attempt: u32,
    /// Attempt ceiling for this run.
    pub max_attempts: u32,
    /// Strategy used for the most recent attempt.
    pub last_strategy: RecoveryStrategy,
}

impl RetryState {
    /// Creates fresh retry state with the given ceiling.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            last_strategy: RecoveryStrategy::Standard,
        }
    }

    /// Starts the next attempt.
    pub fn begin_attempt(&mut self) {
        self.attempt += 1;
    }

    /// Returns true if another attempt is allowed after this one.
    #[must_use]
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

/// The controller's verdict for one failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryDecision {
    /// True when the task should retry.
    pub should_retry: bool,
    /// How long to wait before the retry.
    #[serde(skip)]
    pub delay: Duration,
    /// Strategy the retry should use.
    pub strategy: RecoveryStrategy,
    /// Estimated probability that a retry succeeds, in [0, 1].
    pub estimated_success_probability: f64,
    /// Actionable hint for non-retryable failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_approach: Option<String>,
}

/// One recorded attempt, kept for later analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryRecord {
    /// The feature id.
    pub feature_id: String,
    /// The attempt number.
    pub attempt: u32,
    /// The error that ended the attempt.
    pub error: String,
    /// Whether a retry was decided.
    pub should_retry: bool,
    /// The decided delay in milliseconds.
    pub delay_ms: u64,
    /// The strategy decided for the retry.
    pub strategy: RecoveryStrategy,
    /// When the attempt was recorded.
    pub recorded_at: Timestamp,
}

/// Classifies task failures and drives adaptive backoff.
#[derive(Debug, Default)]
pub struct RecoveryController {
    config: RecoveryConfig,
    history: DashMap<String, Vec<RetryRecord>>,
}

impl RecoveryController {
    /// Creates a controller with the given config.
    #[must_use]
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            history: DashMap::new(),
        }
    }

    /// Classifies a failed attempt and records it.
    ///
    /// Timeouts and transient remote rejections are retryable while the
    /// attempt ceiling allows; unknown features, rejections indicating
    /// insufficient input, and critical validation failures terminate the
    /// task immediately with an `alternative_approach` hint.
    #[must_use]
    pub fn classify(&self, error: &TaskError, state: &RetryState) -> RecoveryDecision {
        let (retryable_kind, probability, alternative) = match error {
            TaskError::Execution(ExecutionError::Timeout { .. }) => {
                let p = attempt_decay(0.7, 0.15, state.attempt);
                (true, p, None)
            }
            TaskError::Execution(ExecutionError::RemoteRejected { message, .. }) => {
                if is_non_recoverable(message) {
                    (
                        false,
                        0.05,
                        Some(
                            "The source document does not contain enough material for this \
                             enhancement. Apply base improvements and add more content, then \
                             retry."
                                .to_string(),
                        ),
                    )
                } else {
                    let p = attempt_decay(0.5, 0.1, state.attempt);
                    (true, p, None)
                }
            }
            TaskError::Execution(ExecutionError::UnknownFeature { .. }) => (
                false,
                0.0,
                Some(
                    "This feature is not registered. Check the feature id for typos and \
                     register it before requesting it."
                        .to_string(),
                ),
            ),
            TaskError::Validation(_) => (
                false,
                0.1,
                Some(
                    "The generated content failed structural validation. Request a \
                     simplified variant of this enhancement."
                        .to_string(),
                ),
            ),
        };

        let should_retry = retryable_kind && state.has_attempts_remaining();
        let delay = if should_retry {
            self.adaptive_delay(state.attempt, probability)
        } else {
            Duration::ZERO
        };
        let alternative_approach = if should_retry { None } else { alternative };

        let decision = RecoveryDecision {
            should_retry,
            delay,
            strategy: strategy_for_attempt(state.attempt + 1),
            estimated_success_probability: probability,
            alternative_approach,
        };

        debug!(
            feature = error.feature_id(),
            attempt = state.attempt,
            should_retry = decision.should_retry,
            delay_ms = u64::try_from(decision.delay.as_millis()).unwrap_or(u64::MAX),
            probability,
            "classified task failure"
        );

        self.record(error, state, &decision);
        decision
    }

    /// Delay grows with the attempt count and stretches as the estimated
    /// success probability drops, capped to keep the pipeline responsive.
    fn adaptive_delay(&self, attempt: u32, probability: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let grown = self
            .config
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(exponent));
        let scale = 1.0 / probability.max(0.05);
        let scaled = (grown as f64 * scale).round() as u64;
        let capped = scaled.min(self.config.max_delay_ms);
        Duration::from_millis(self.apply_jitter(capped))
    }

    fn apply_jitter(&self, delay: u64) -> u64 {
        match self.config.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        }
    }

    fn record(&self, error: &TaskError, state: &RetryState, decision: &RecoveryDecision) {
        let record = RetryRecord {
            feature_id: error.feature_id().to_string(),
            attempt: state.attempt,
            error: error.to_string(),
            should_retry: decision.should_retry,
            delay_ms: u64::try_from(decision.delay.as_millis()).unwrap_or(u64::MAX),
            strategy: decision.strategy,
            recorded_at: now_utc(),
        };
        self.history
            .entry(record.feature_id.clone())
            .or_default()
            .push(record);
    }

    /// Returns the recorded attempts for a feature.
    #[must_use]
    pub fn history(&self, feature_id: &str) -> Vec<RetryRecord> {
        self.history
            .get(feature_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Clears the attempt history once a feature is terminal.
    pub fn clear_history(&self, feature_id: &str) {
        self.history.remove(feature_id);
    }
}

fn attempt_decay(start: f64, step: f64, attempt: u32) -> f64 {
    (start - step * f64::from(attempt.saturating_sub(1))).max(0.1)
}

fn is_non_recoverable(message: &str) -> bool {
    let lowered = message.to_lowercase();
    NON_RECOVERABLE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn strategy_for_attempt(attempt: u32) -> RecoveryStrategy {
    match attempt {
        0 | 1 => RecoveryStrategy::Standard,
        2 => RecoveryStrategy::Simplified,
        _ => RecoveryStrategy::Conservative,
    }
}
