//! Priority planning: orders requested features before execution.

use crate::registry::FeatureRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Success rate assumed for features with no recorded history.
const DEFAULT_SUCCESS_RATE: f64 = 0.5;

/// Per-feature preference boosts supplied by the preference store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferenceWeights {
    boosts: HashMap<String, f64>,
}

impl PreferenceWeights {
    /// Creates empty preference weights.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the boost for a feature, in [0, 1].
    #[must_use]
    pub fn with_boost(mut self, feature_id: impl Into<String>, boost: f64) -> Self {
        self.boosts.insert(feature_id.into(), boost);
        self
    }

    /// Returns the boost for a feature, defaulting to zero.
    #[must_use]
    pub fn boost(&self, feature_id: &str) -> f64 {
        self.boosts.get(feature_id).copied().unwrap_or(0.0)
    }
}

/// Historical per-feature success rates in [0, 1].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessHistory {
    rates: HashMap<String, f64>,
}

impl SuccessHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the observed success rate for a feature.
    #[must_use]
    pub fn with_rate(mut self, feature_id: impl Into<String>, rate: f64) -> Self {
        self.rates.insert(feature_id.into(), rate.clamp(0.0, 1.0));
        self
    }

    /// Returns the recorded rate for a feature, if any.
    #[must_use]
    pub fn rate(&self, feature_id: &str) -> Option<f64> {
        self.rates.get(feature_id).copied()
    }
}

/// Weights for the composite priority score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Weight of the inverse-complexity term.
    pub complexity_weight: f64,
    /// Weight of the historical success-rate term.
    pub success_weight: f64,
    /// Weight of the user-preference boost term.
    pub preference_weight: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            complexity_weight: 0.35,
            success_weight: 0.40,
            preference_weight: 0.25,
        }
    }
}

/// Orders requested feature ids by composite priority.
///
/// The score favors low complexity, high historical success, and user
/// preference. The sort is stable and ties break by registry declaration
/// order, so plans are deterministic. Every requested id appears exactly
/// once in the output; unregistered ids are kept (sorted last) so the
/// executor can fail them explicitly rather than dropping them silently.
#[derive(Debug, Clone, Default)]
pub struct PriorityPlanner {
    config: PlannerConfig,
}

impl PriorityPlanner {
    /// Creates a planner with the given score weights.
    #[must_use]
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Computes the composite priority score for one feature.
    #[must_use]
    pub fn score(
        &self,
        registry: &FeatureRegistry,
        feature_id: &str,
        history: &SuccessHistory,
        preferences: &PreferenceWeights,
    ) -> f64 {
        let complexity = registry
            .get(feature_id)
            .map_or(1.0, |spec| spec.complexity.clamp(0.0, 1.0));
        let success = history.rate(feature_id).unwrap_or(DEFAULT_SUCCESS_RATE);
        let boost = preferences.boost(feature_id);

        self.config.complexity_weight * (1.0 - complexity)
            + self.config.success_weight * success
            + self.config.preference_weight * boost
    }

    /// Produces a total execution order over the requested ids.
    #[must_use]
    pub fn plan(
        &self,
        registry: &FeatureRegistry,
        requested: &[String],
        history: &SuccessHistory,
        preferences: &PreferenceWeights,
    ) -> Vec<String> {
        let mut scored: Vec<(f64, usize, String)> = requested
            .iter()
            .map(|id| {
                let score = self.score(registry, id, history, preferences);
                let declaration = registry.declaration_index(id).unwrap_or(usize::MAX);
                (score, declaration, id.clone())
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        let order: Vec<String> = scored.into_iter().map(|(_, _, id)| id).collect();
        debug!(?order, "planned execution order");
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::MergeStrategy;
    use crate::registry::{default_registry, FeatureRegistry, FeatureSpec};

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_plan_is_a_permutation_of_the_input() {
        let planner = PriorityPlanner::default();
        let registry = default_registry();
        let requested = ids(&[
            "keyword-optimization",
            "experience-bullets",
            "professional-summary",
            "ghost-feature",
        ]);

        let order = planner.plan(
            &registry,
            &requested,
            &SuccessHistory::new(),
            &PreferenceWeights::new(),
        );

        let mut sorted_in = requested.clone();
        sorted_in.sort();
        let mut sorted_out = order.clone();
        sorted_out.sort();
        assert_eq!(sorted_in, sorted_out);
    }

    #[test]
    fn test_low_complexity_sorts_first_by_default() {
        let planner = PriorityPlanner::default();
        let registry = default_registry();
        let order = planner.plan(
            &registry,
            &ids(&["experience-bullets", "keyword-optimization"]),
            &SuccessHistory::new(),
            &PreferenceWeights::new(),
        );

        assert_eq!(order[0], "keyword-optimization");
        assert_eq!(order[1], "experience-bullets");
    }

    #[test]
    fn test_success_history_outranks_complexity() {
        let planner = PriorityPlanner::default();
        let registry = default_registry();
        let history = SuccessHistory::new()
            .with_rate("experience-bullets", 1.0)
            .with_rate("keyword-optimization", 0.0);

        let order = planner.plan(
            &registry,
            &ids(&["keyword-optimization", "experience-bullets"]),
            &history,
            &PreferenceWeights::new(),
        );

        assert_eq!(order[0], "experience-bullets");
    }

    #[test]
    fn test_preference_boost_promotes_feature() {
        let planner = PriorityPlanner::default();
        let registry = default_registry();
        let preferences = PreferenceWeights::new().with_boost("experience-bullets", 1.0);

        let order = planner.plan(
            &registry,
            &ids(&["keyword-optimization", "experience-bullets"]),
            &SuccessHistory::new(),
            &preferences,
        );

        assert_eq!(order[0], "experience-bullets");
    }

    #[test]
    fn test_ties_break_by_declaration_order() {
        let mut registry = FeatureRegistry::new();
        for id in ["alpha", "beta", "gamma"] {
            registry
                .register(FeatureSpec::new(id, format!("op_{id}"), id, 0.5, MergeStrategy::Append))
                .unwrap();
        }

        let planner = PriorityPlanner::default();
        let order = planner.plan(
            &registry,
            &ids(&["gamma", "alpha", "beta"]),
            &SuccessHistory::new(),
            &PreferenceWeights::new(),
        );

        assert_eq!(order, ids(&["alpha", "beta", "gamma"]));
    }

    #[test]
    fn test_unregistered_ids_sort_last_but_survive() {
        let planner = PriorityPlanner::default();
        let registry = default_registry();
        let order = planner.plan(
            &registry,
            &ids(&["ghost-feature", "skills-matrix"]),
            &SuccessHistory::new(),
            &PreferenceWeights::new(),
        );

        assert_eq!(order.last().map(String::as_str), Some("ghost-feature"));
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let planner = PriorityPlanner::default();
        let registry = default_registry();
        let requested: Vec<String> = registry.ids().map(ToString::to_string).collect();

        let first = planner.plan(
            &registry,
            &requested,
            &SuccessHistory::new(),
            &PreferenceWeights::new(),
        );
        let second = planner.plan(
            &registry,
            &requested,
            &SuccessHistory::new(),
            &PreferenceWeights::new(),
        );
        assert_eq!(first, second);
    }
}
