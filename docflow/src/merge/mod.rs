//! Position-aware fragment merging.
//!
//! The merge engine splices a validated fragment into the working
//! document using the feature's configured strategy. Every strategy
//! carries a fallback for when its anchor is missing, and every fallback
//! chain bottoms out at [`MergeStrategy::Append`], so a merge always
//! succeeds: content placement degrades rather than failing the pipeline.

use crate::processor::ValidatedFragment;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Closing marker that ends a structural section.
const SECTION_END: &str = "</section>";
/// Secondary closing marker when no section end is present.
const DIV_END: &str = "</div>";
/// The document's terminal closing marker.
const BODY_END: &str = "</body>";

/// How a fragment is positioned within the document.
///
/// Strategies are configuration attached to a feature in the registry
/// and are not mutated at runtime. Each non-append variant names the
/// strategy to fall back to when its anchor is not found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Replace everything from `anchor` through `end_anchor` (inclusive).
    ReplaceSection {
        /// Marker opening the span to replace.
        anchor: String,
        /// Marker closing the span; searched for after `anchor`.
        end_anchor: String,
        /// Applied when either marker is missing.
        fallback: Box<MergeStrategy>,
    },
    /// Insert after the end of the anchor's enclosing structural block.
    InsertAfter {
        /// Marker locating the block.
        anchor: String,
        /// Applied when the marker is missing.
        fallback: Box<MergeStrategy>,
    },
    /// Insert immediately before the anchor.
    InsertBefore {
        /// Marker locating the insertion point.
        anchor: String,
        /// Applied when the marker is missing.
        fallback: Box<MergeStrategy>,
    },
    /// Insert before the document's terminal closing marker, or at the
    /// very end when that marker is absent. The strategy of last resort;
    /// never fails.
    Append,
}

impl MergeStrategy {
    /// Creates a replace-section strategy with an append fallback.
    #[must_use]
    pub fn replace_section(anchor: impl Into<String>, end_anchor: impl Into<String>) -> Self {
        Self::ReplaceSection {
            anchor: anchor.into(),
            end_anchor: end_anchor.into(),
            fallback: Box::new(Self::Append),
        }
    }

    /// Creates an insert-after strategy with an append fallback.
    #[must_use]
    pub fn insert_after(anchor: impl Into<String>) -> Self {
        Self::InsertAfter {
            anchor: anchor.into(),
            fallback: Box::new(Self::Append),
        }
    }

    /// Creates an insert-before strategy with an append fallback.
    #[must_use]
    pub fn insert_before(anchor: impl Into<String>) -> Self {
        Self::InsertBefore {
            anchor: anchor.into(),
            fallback: Box::new(Self::Append),
        }
    }

    /// Replaces the fallback on a non-append strategy.
    #[must_use]
    pub fn with_fallback(self, fallback: Self) -> Self {
        match self {
            Self::ReplaceSection {
                anchor, end_anchor, ..
            } => Self::ReplaceSection {
                anchor,
                end_anchor,
                fallback: Box::new(fallback),
            },
            Self::InsertAfter { anchor, .. } => Self::InsertAfter {
                anchor,
                fallback: Box::new(fallback),
            },
            Self::InsertBefore { anchor, .. } => Self::InsertBefore {
                anchor,
                fallback: Box::new(fallback),
            },
            Self::Append => Self::Append,
        }
    }

    /// Returns the strategy kind name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReplaceSection { .. } => "replace-section",
            Self::InsertAfter { .. } => "insert-after",
            Self::InsertBefore { .. } => "insert-before",
            Self::Append => "append",
        }
    }
}

/// The result of one merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The new working document.
    pub document: String,
    /// Kind of the strategy that was requested.
    pub requested: &'static str,
    /// Kind of the strategy that was actually applied.
    pub applied: &'static str,
    /// True when one or more fallback hops occurred.
    pub fell_back: bool,
}

/// Deterministic text-splice merge engine.
///
/// The engine is the sole writer of the run's working document. It never
/// fails: a missing anchor walks the strategy's fallback chain, and the
/// chain is depth-capped so a miswired configuration still degrades to
/// append.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    max_fallback_depth: usize,
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self {
            max_fallback_depth: 4,
        }
    }
}

impl MergeEngine {
    /// Creates a merge engine with the default fallback depth.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Splices `fragment` into `document` using `strategy`.
    ///
    /// The input document is not modified; the returned outcome carries
    /// the new value. The result is always non-empty.
    #[must_use]
    pub fn merge(
        &self,
        document: &str,
        fragment: &ValidatedFragment,
        strategy: &MergeStrategy,
    ) -> MergeOutcome {
        let wrapped = wrap_fragment(&fragment.feature_id, &fragment.content);
        let requested = strategy.kind();

        let mut current = strategy;
        let mut depth = 0;
        loop {
            if depth >= self.max_fallback_depth {
                debug!(
                    feature = %fragment.feature_id,
                    depth,
                    "fallback chain exhausted, appending"
                );
                return outcome(append(document, &wrapped), requested, "append", depth);
            }

            match current {
                MergeStrategy::ReplaceSection {
                    anchor,
                    end_anchor,
                    fallback,
                } => {
                    if let Some(merged) = replace_section(document, anchor, end_anchor, &wrapped) {
                        return outcome(merged, requested, "replace-section", depth);
                    }
                    current = fallback.as_ref();
                }
                MergeStrategy::InsertAfter { anchor, fallback } => {
                    if let Some(merged) = insert_after(document, anchor, &wrapped) {
                        return outcome(merged, requested, "insert-after", depth);
                    }
                    current = fallback.as_ref();
                }
                MergeStrategy::InsertBefore { anchor, fallback } => {
                    if let Some(merged) = insert_before(document, anchor, &wrapped) {
                        return outcome(merged, requested, "insert-before", depth);
                    }
                    current = fallback.as_ref();
                }
                MergeStrategy::Append => {
                    return outcome(append(document, &wrapped), requested, "append", depth);
                }
            }

            depth += 1;
            debug!(
                feature = %fragment.feature_id,
                next = current.kind(),
                "merge anchor not found, falling back"
            );
        }
    }
}

fn outcome(document: String, requested: &'static str, applied: &'static str, depth: usize) -> MergeOutcome {
    MergeOutcome {
        document,
        requested,
        applied,
        fell_back: depth > 0,
    }
}

/// Wraps a fragment in a traceable container tagged with its feature id.
#[must_use]
pub fn wrap_fragment(feature_id: &str, content: &str) -> String {
    format!(r#"<div data-feature="{feature_id}">{content}</div>"#)
}

fn splice(document: &str, start: usize, end: usize, insert: &str) -> String {
    let mut merged = String::with_capacity(document.len() + insert.len());
    merged.push_str(&document[..start]);
    merged.push_str(insert);
    merged.push_str(&document[end..]);
    merged
}

fn replace_section(
    document: &str,
    anchor: &str,
    end_anchor: &str,
    wrapped: &str,
) -> Option<String> {
    let start = document.find(anchor)?;
    let relative_end = document[start..].find(end_anchor)?;
    let end = start + relative_end + end_anchor.len();
    Some(splice(document, start, end, wrapped))
}

fn insert_after(document: &str, anchor: &str, wrapped: &str) -> Option<String> {
    let start = document.find(anchor)?;
    let at = block_end(document, start);
    Some(splice(document, at, at, wrapped))
}

fn insert_before(document: &str, anchor: &str, wrapped: &str) -> Option<String> {
    let start = document.find(anchor)?;
    Some(splice(document, start, start, wrapped))
}

/// Finds the insertion point after the structural block containing the
/// anchor: the nearest section end, then the nearest div end, then just
/// before the document's terminal marker, then the end of the document.
fn block_end(document: &str, anchor_start: usize) -> usize {
    let tail = &document[anchor_start..];
    if let Some(pos) = tail.find(SECTION_END) {
        return anchor_start + pos + SECTION_END.len();
    }
    if let Some(pos) = tail.find(DIV_END) {
        return anchor_start + pos + DIV_END.len();
    }
    if let Some(pos) = tail.find(BODY_END) {
        return anchor_start + pos;
    }
    document.len()
}

fn append(document: &str, wrapped: &str) -> String {
    document.rfind(BODY_END).map_or_else(
        || {
            let mut merged = document.to_string();
            merged.push_str(wrapped);
            merged
        },
        |pos| splice(document, pos, pos, wrapped),
    )
}
