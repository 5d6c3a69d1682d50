//! Fragment post-processing: normalization and validation.
//!
//! Normalization consolidates whitespace and never fails. Validation
//! scores the fragment and produces findings; any critical finding
//! rejects the fragment, while warnings are surfaced for observability
//! and never block the pipeline.

use crate::errors::{Finding, ValidationError};
use crate::executor::RawFragment;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Fragments longer than this trigger a length warning.
const LENGTH_WARNING_THRESHOLD: usize = 20_000;

/// Container tags that must be balanced within a fragment.
const BALANCED_TAGS: [&str; 8] = ["div", "section", "ul", "ol", "li", "p", "span", "table"];

/// A fragment that passed critical validation and is ready to merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedFragment {
    /// The feature that produced the fragment.
    pub feature_id: String,
    /// The normalized content.
    pub content: String,
    /// Validation score in [0, 1].
    pub score: f64,
    /// Non-blocking findings.
    pub warnings: Vec<Finding>,
}

/// Normalizes and validates raw fragments.
#[derive(Debug, Clone)]
pub struct FragmentProcessor {
    whitespace_runs: Regex,
    inter_tag_gaps: Regex,
    tag_names: Regex,
    img_tags: Regex,
    event_handlers: Regex,
}

impl Default for FragmentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentProcessor {
    /// Creates a processor with its scanning patterns compiled.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn new() -> Self {
        // The patterns are static and known-valid.
        Self {
            whitespace_runs: Regex::new(r"\s{2,}").unwrap(),
            inter_tag_gaps: Regex::new(r">\s+<").unwrap(),
            tag_names: Regex::new(r"</?([a-zA-Z][a-zA-Z0-9]*)").unwrap(),
            img_tags: Regex::new(r"<img[^>]*>").unwrap(),
            event_handlers: Regex::new(r#"\son[a-z]+\s*="#).unwrap(),
        }
    }

    /// Normalizes, validates, and either accepts or rejects the fragment.
    pub fn process(&self, raw: RawFragment) -> Result<ValidatedFragment, ValidationError> {
        let normalized = self.normalize(&raw.content);
        let findings = self.validate(&normalized);

        if findings.iter().any(Finding::is_critical) {
            debug!(
                feature = %raw.feature_id,
                findings = findings.len(),
                "fragment rejected by validation"
            );
            return Err(ValidationError::new(raw.feature_id, findings));
        }

        let warnings: Vec<Finding> = findings;
        for finding in &warnings {
            warn!(
                feature = %raw.feature_id,
                code = %finding.code,
                "fragment validation warning: {}", finding.message
            );
        }

        let score = score_findings(&warnings);
        Ok(ValidatedFragment {
            feature_id: raw.feature_id,
            content: normalized,
            score,
            warnings,
        })
    }

    /// Consolidates whitespace. This step never fails.
    #[must_use]
    pub fn normalize(&self, content: &str) -> String {
        let collapsed = self.whitespace_runs.replace_all(content.trim(), " ");
        self.inter_tag_gaps.replace_all(&collapsed, "><").into_owned()
    }

    /// Scans the fragment and returns findings, critical and warning.
    #[must_use]
    pub fn validate(&self, content: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        if content.is_empty() {
            findings.push(Finding::critical("FRAGMENT-EMPTY", "fragment has no content"));
            return findings;
        }

        for tag in self.unbalanced_tags(content) {
            findings.push(Finding::critical(
                "FRAGMENT-UNBALANCED",
                format!("unbalanced <{tag}> tags"),
            ));
        }

        if content.contains("<script") {
            findings.push(Finding::critical(
                "FRAGMENT-SCRIPT",
                "script element is not allowed in generated content",
            ));
        }

        if self.event_handlers.is_match(content) {
            findings.push(Finding::critical(
                "FRAGMENT-EVENT-HANDLER",
                "inline event handler is not allowed in generated content",
            ));
        }

        if content.contains("<style") {
            findings.push(Finding::warning(
                "FRAGMENT-INLINE-STYLE",
                "style element should be consolidated into the document theme",
            ));
        }

        for img in self.img_tags.find_iter(content) {
            if !img.as_str().contains("alt=") {
                findings.push(Finding::warning(
                    "FRAGMENT-IMG-ALT",
                    "image is missing an alt attribute",
                ));
            }
        }

        if content.len() > LENGTH_WARNING_THRESHOLD {
            findings.push(Finding::warning(
                "FRAGMENT-LONG",
                "fragment is unusually long",
            ));
        }

        findings
    }

    fn unbalanced_tags(&self, content: &str) -> Vec<&'static str> {
        let mut unbalanced = Vec::new();
        for tag in BALANCED_TAGS {
            let mut opens = 0_i64;
            let mut closes = 0_i64;
            for capture in self.tag_names.captures_iter(content) {
                if let Some(name) = capture.get(1) {
                    if name.as_str().eq_ignore_ascii_case(tag) {
                        if capture.get(0).is_some_and(|m| m.as_str().starts_with("</")) {
                            closes += 1;
                        } else {
                            opens += 1;
                        }
                    }
                }
            }
            if opens != closes {
                unbalanced.push(tag);
            }
        }
        unbalanced
    }
}

fn score_findings(findings: &[Finding]) -> f64 {
    let penalty: f64 = findings
        .iter()
        .map(|f| if f.is_critical() { 0.3 } else { 0.1 })
        .sum();
    (1.0 - penalty).clamp(0.0, 1.0)
}
