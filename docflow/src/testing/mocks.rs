//! Scripted service implementations.

use crate::errors::DocumentSourceError;
use crate::planner::PreferenceWeights;
use crate::services::{DocumentSource, GenerationResponse, GenerationService, PreferenceStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// One scripted response from the generation service.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Return a successful fragment.
    Succeed(String),
    /// Return a rejection with the given message.
    Reject(String),
    /// Never resolve, forcing the executor's timeout.
    Hang,
}

/// A generation service that replays per-feature scripted outcomes.
///
/// Each call pops the next outcome from the feature's queue; calls with
/// no script are rejected so tests fail loudly on unexpected requests.
#[derive(Debug, Default)]
pub struct ScriptedGenerationService {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedOutcome>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGenerationService {
    /// Creates a service with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an outcome to a feature's script.
    pub fn script(&self, feature_id: &str, outcome: ScriptedOutcome) {
        self.scripts
            .lock()
            .entry(feature_id.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Appends `count` copies of an outcome to a feature's script.
    pub fn script_repeated(&self, feature_id: &str, outcome: &ScriptedOutcome, count: usize) {
        for _ in 0..count {
            self.script(feature_id, outcome.clone());
        }
    }

    /// Returns how many times a feature was invoked.
    #[must_use]
    pub fn call_count(&self, feature_id: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|id| id.as_str() == feature_id)
            .count()
    }

    /// Returns all invoked feature ids in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerationService {
    async fn invoke(&self, _operation: &str, _run_id: Uuid, feature_id: &str) -> GenerationResponse {
        self.calls.lock().push(feature_id.to_string());

        let outcome = self
            .scripts
            .lock()
            .get_mut(feature_id)
            .and_then(VecDeque::pop_front);

        match outcome {
            Some(ScriptedOutcome::Succeed(fragment)) => GenerationResponse::ok(fragment),
            Some(ScriptedOutcome::Reject(message)) => GenerationResponse::rejected(message),
            Some(ScriptedOutcome::Hang) => std::future::pending::<GenerationResponse>().await,
            None => GenerationResponse::rejected(format!(
                "no scripted outcome for feature '{feature_id}'"
            )),
        }
    }
}

/// A document source holding one optional base document.
#[derive(Debug, Clone, Default)]
pub struct StaticDocumentSource {
    document: Option<String>,
}

impl StaticDocumentSource {
    /// Creates a source that serves the given document.
    #[must_use]
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: Some(document.into()),
        }
    }

    /// Creates a source with no document; fetches fail with `NotFound`.
    #[must_use]
    pub fn missing() -> Self {
        Self { document: None }
    }
}

#[async_trait]
impl DocumentSource for StaticDocumentSource {
    async fn fetch_base_document(&self, run_id: Uuid) -> Result<String, DocumentSourceError> {
        self.document
            .clone()
            .ok_or(DocumentSourceError::NotFound { run_id })
    }
}

/// A preference store returning fixed weights.
#[derive(Debug, Clone, Default)]
pub struct StaticPreferenceStore {
    weights: PreferenceWeights,
}

impl StaticPreferenceStore {
    /// Creates a store serving the given weights.
    #[must_use]
    pub fn new(weights: PreferenceWeights) -> Self {
        Self { weights }
    }
}

#[async_trait]
impl PreferenceStore for StaticPreferenceStore {
    async fn user_preferences(&self, _user_id: &str) -> PreferenceWeights {
        self.weights.clone()
    }
}
