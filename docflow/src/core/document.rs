//! The evolving enhancement document.

use serde::{Deserialize, Serialize};

/// The document being enhanced: an immutable base plus the working copy.
///
/// `current` is owned exclusively by the run's orchestrator and merge
/// engine; every successful merge replaces it wholesale via [`apply`].
/// External readers take an owned snapshot instead of borrowing into the
/// run's state.
///
/// [`apply`]: Document::apply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    base: String,
    current: String,
}

impl Document {
    /// Creates a document from the fetched base content.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let current = base.clone();
        Self { base, current }
    }

    /// Returns the original content, fetched once per run.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Returns the working content.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Replaces the working content with a merged result.
    pub fn apply(&mut self, merged: String) {
        self.current = merged;
    }

    /// Returns an owned copy of the working content for external readers.
    #[must_use]
    pub fn snapshot(&self) -> String {
        self.current.clone()
    }
}
