//! HTTP-backed generation service.

use super::{GenerationResponse, GenerationService};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    operation: &'a str,
    run_id: Uuid,
    feature_id: &'a str,
}

/// Calls a remote generation endpoint over HTTP.
///
/// Transport failures are reported as rejections so the recovery
/// controller can classify them; timeouts are enforced by the task
/// executor, not here.
#[derive(Debug, Clone)]
pub struct HttpGenerationService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGenerationService {
    /// Creates a service posting to the given endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Creates a service with a preconfigured client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn invoke(&self, operation: &str, run_id: Uuid, feature_id: &str) -> GenerationResponse {
        let request = InvokeRequest {
            operation,
            run_id,
            feature_id,
        };

        debug!(operation, %run_id, feature = feature_id, "invoking remote generation");

        let response = match self.client.post(&self.endpoint).json(&request).send().await {
            Ok(response) => response,
            Err(err) => {
                return GenerationResponse::rejected(format!("transport error: {err}"));
            }
        };

        if !response.status().is_success() {
            return GenerationResponse::rejected(format!(
                "remote returned status {}",
                response.status()
            ));
        }

        match response.json::<GenerationResponse>().await {
            Ok(payload) => payload,
            Err(err) => GenerationResponse::rejected(format!("malformed response: {err}")),
        }
    }
}
