//! HTTP-backed implementations of the external collaborator traits:
//! the AI section generator, the enrichment source, and the status client
//! the CLI poller uses against a running server.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::generate::{SectionError, SectionGenerator};
use crate::models::{Report, SectionKey, StatusView};
use crate::pipeline::{EnrichmentError, EnrichmentSource};
use crate::poll::{PollError, StatusClient};

/// Per-section generation over an HTTP AI endpoint.
pub struct HttpSectionGenerator {
    client: Client,
    endpoint: String,
}

impl HttpSectionGenerator {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl SectionGenerator for HttpSectionGenerator {
    async fn generate_section(
        &self,
        key: SectionKey,
        lead: &Value,
        enrichment: &Value,
    ) -> Result<Value, SectionError> {
        // A non-object lead is a malformed batch input, not a provider blip
        if !lead.is_object() {
            return Err(SectionError::Fatal("lead payload is not an object".to_string()));
        }

        let body = json!({
            "section": key.as_str(),
            "lead": lead,
            "enrichment": enrichment,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SectionError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SectionError::Provider(format!(
                "generation endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SectionError::Provider(format!("bad generation payload: {e}")))
    }
}

/// Enrichment lookup over an HTTP news/company-data endpoint.
pub struct HttpEnrichmentSource {
    client: Client,
    endpoint: String,
}

impl HttpEnrichmentSource {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl EnrichmentSource for HttpEnrichmentSource {
    async fn fetch(&self, lead: &Value) -> Result<Value, EnrichmentError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(lead)
            .send()
            .await
            .map_err(|e| EnrichmentError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EnrichmentError(format!(
                "enrichment endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| EnrichmentError(format!("bad enrichment payload: {e}")))
    }
}

/// Status/record client over the service's own REST surface, used by the
/// CLI's polling campaign.
pub struct HttpStatusClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpStatusClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, PollError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PollError::NotFound);
        }
        if !response.status().is_success() {
            return Err(PollError::Transport(format!(
                "server returned {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PollError::Transport(format!("bad response payload: {e}")))
    }
}

#[async_trait]
impl StatusClient for HttpStatusClient {
    async fn fetch_status(&self, report_id: Uuid) -> Result<StatusView, PollError> {
        self.get_json(&format!("/reports/{report_id}/status")).await
    }

    async fn fetch_report(&self, report_id: Uuid) -> Result<Report, PollError> {
        self.get_json(&format!("/reports/{report_id}")).await
    }
}
