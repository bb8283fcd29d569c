use std::time::Duration;

use serde::Deserialize;

use crate::error::{LlmError, classify_status};
use crate::types::{LlmResponse, ResponseRequest};

/// HTTP timeout for catalog listing; generation calls carry their own
/// wall-clock budget at the call site.
const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin client over the provider's responses API.
///
/// Cheap to clone and safe for concurrent use; the decision engine and the
/// planner share one instance.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One generation call.  Status classification decides retryability for
    /// the caller; this method itself never retries.
    pub async fn respond(&self, request: &ResponseRequest) -> Result<LlmResponse, LlmError> {
        let endpoint = format!("{}/responses", self.base_url);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|err| LlmError::Parse(err.to_string()))
    }

    /// Model ids advertised by the provider, unordered.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let endpoint = format!("{}/models", self.base_url);
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(&self.api_key)
            .timeout(CATALOG_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }

        let catalog: ModelCatalog =
            serde_json::from_str(&body).map_err(|err| LlmError::Parse(err.to_string()))?;
        Ok(catalog.data.into_iter().map(|m| m.id).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ModelCatalog {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}
