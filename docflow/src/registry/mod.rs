//! Static mapping of feature ids to their remote operations and merge
//! configuration.

use crate::errors::RegistryError;
use crate::merge::MergeStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for one enhancement feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Stable feature id, unique within a registry.
    pub id: String,
    /// Remote operation that produces the feature's fragment.
    pub operation: String,
    /// Human display name.
    pub display_name: String,
    /// Estimated technical complexity in [0, 1].
    pub complexity: f64,
    /// How the fragment is merged into the document.
    pub strategy: MergeStrategy,
}

impl FeatureSpec {
    /// Creates a feature spec.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        operation: impl Into<String>,
        display_name: impl Into<String>,
        complexity: f64,
        strategy: MergeStrategy,
    ) -> Self {
        Self {
            id: id.into(),
            operation: operation.into(),
            display_name: display_name.into(),
            complexity,
            strategy,
        }
    }
}

/// Lookup table of feature specs, preserving declaration order.
///
/// Declaration order is the planner's deterministic tie-break, so
/// registration order is part of the registry's observable behavior.
#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    specs: Vec<FeatureSpec>,
    index: HashMap<String, usize>,
}

impl FeatureRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a feature spec.
    pub fn register(&mut self, spec: FeatureSpec) -> Result<(), RegistryError> {
        if self.index.contains_key(&spec.id) {
            return Err(RegistryError::Duplicate { feature: spec.id });
        }
        self.index.insert(spec.id.clone(), self.specs.len());
        self.specs.push(spec);
        Ok(())
    }

    /// Looks up a feature spec by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&FeatureSpec> {
        self.index.get(id).map(|&i| &self.specs[i])
    }

    /// Returns the declaration position of a feature.
    #[must_use]
    pub fn declaration_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Returns true if the feature is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Returns all specs in declaration order.
    #[must_use]
    pub fn specs(&self) -> &[FeatureSpec] {
        &self.specs
    }

    /// Returns all feature ids in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.id.as_str())
    }

    /// Returns the number of registered features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if no features are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Builds the registry of the product's document enhancements.
///
/// # Panics
///
/// Does not panic: ids are statically unique.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn default_registry() -> FeatureRegistry {
    let mut registry = FeatureRegistry::new();

    registry
        .register(FeatureSpec::new(
            "professional-summary",
            "generate_professional_summary",
            "Professional Summary",
            0.55,
            MergeStrategy::replace_section(r#"<section class="summary""#, "</section>")
                .with_fallback(MergeStrategy::insert_before(r#"<section class="experience""#)),
        ))
        .unwrap();

    registry
        .register(FeatureSpec::new(
            "experience-bullets",
            "enhance_experience_bullets",
            "Experience Bullets",
            0.85,
            MergeStrategy::insert_after(r#"<section class="experience""#),
        ))
        .unwrap();

    registry
        .register(FeatureSpec::new(
            "skills-matrix",
            "generate_skills_matrix",
            "Skills Matrix",
            0.45,
            MergeStrategy::insert_after(r#"<section class="skills""#),
        ))
        .unwrap();

    registry
        .register(FeatureSpec::new(
            "achievement-highlights",
            "highlight_achievements",
            "Achievement Highlights",
            0.65,
            MergeStrategy::insert_before(r#"<section class="education""#),
        ))
        .unwrap();

    registry
        .register(FeatureSpec::new(
            "keyword-optimization",
            "optimize_keywords",
            "Keyword Optimization",
            0.35,
            MergeStrategy::Append,
        ))
        .unwrap();

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut registry = FeatureRegistry::new();
        registry
            .register(FeatureSpec::new(
                "summary",
                "generate_summary",
                "Summary",
                0.5,
                MergeStrategy::Append,
            ))
            .unwrap();

        let spec = registry.get("summary").unwrap();
        assert_eq!(spec.operation, "generate_summary");
        assert!(registry.contains("summary"));
        assert!(!registry.contains("ghost"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = FeatureRegistry::new();
        let spec = FeatureSpec::new("summary", "op", "Summary", 0.5, MergeStrategy::Append);
        registry.register(spec.clone()).unwrap();

        let err = registry.register(spec).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let registry = default_registry();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids[0], "professional-summary");
        assert_eq!(registry.declaration_index("professional-summary"), Some(0));
        assert_eq!(
            registry.declaration_index("keyword-optimization"),
            Some(registry.len() - 1)
        );
        assert_eq!(registry.declaration_index("ghost"), None);
    }

    #[test]
    fn test_default_registry_maps_each_feature_to_one_operation() {
        let registry = default_registry();
        assert_eq!(registry.len(), 5);

        let mut operations: Vec<&str> =
            registry.specs().iter().map(|s| s.operation.as_str()).collect();
        operations.sort_unstable();
        operations.dedup();
        assert_eq!(operations.len(), registry.len());
    }

    #[test]
    fn test_default_complexities_are_normalized() {
        for spec in default_registry().specs() {
            assert!((0.0..=1.0).contains(&spec.complexity), "{}", spec.id);
        }
    }
}
