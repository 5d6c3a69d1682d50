//! Contracts for the pipeline's external collaborators.
//!
//! The orchestration core only ever talks to these traits; transports
//! (HTTP, in-process fakes, push channels) stay behind them.

use crate::errors::DocumentSourceError;
use crate::planner::PreferenceWeights;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "remote-http")]
mod http;

#[cfg(feature = "remote-http")]
pub use http::HttpGenerationService;

/// The payload returned by the remote generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// True when generation produced a fragment.
    pub success: bool,
    /// The generated fragment, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
    /// The remote failure message, present on rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationResponse {
    /// Creates a successful response.
    #[must_use]
    pub fn ok(fragment: impl Into<String>) -> Self {
        Self {
            success: true,
            fragment: Some(fragment.into()),
            error: None,
        }
    }

    /// Creates a rejection response.
    #[must_use]
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            fragment: None,
            error: Some(error.into()),
        }
    }
}

/// Source of the base document a run enhances.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetches the base document for a run. Fails with
    /// [`DocumentSourceError::NotFound`] when none exists yet.
    async fn fetch_base_document(&self, run_id: Uuid) -> Result<String, DocumentSourceError>;
}

/// The remote generation service that produces content fragments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Invokes one generation operation for one feature.
    async fn invoke(&self, operation: &str, run_id: Uuid, feature_id: &str) -> GenerationResponse;
}

/// Store of per-user preference weights, consumed once per run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Returns the preference weights for a user.
    async fn user_preferences(&self, user_id: &str) -> PreferenceWeights;
}
