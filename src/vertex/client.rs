use async_trait::async_trait;
use std::time::{Duration, Instant};

use super::GenerativeModel;
use super::credentials::TokenSource;
use super::types::{GenerateContentRequest, GenerateContentResponse, GoogleError};
use crate::config::VertexConfig;
use crate::error::{ConfigError, UpstreamError};
use crate::metrics::UPSTREAM_LATENCY;

/// HTTP client for the Vertex AI `generateContent` publisher-model endpoint.
pub struct VertexClient {
    endpoint: String,
    project_id: String,
    location: String,
    tokens: TokenSource,
    http: reqwest::Client,
    timeout: Duration,
}

impl VertexClient {
    pub fn new(config: &VertexConfig, tokens: TokenSource) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            project_id: config.project_id.clone(),
            location: config.location.clone(),
            tokens,
            http,
            timeout: config.timeout,
        })
    }

    fn model_url(&self, model: &str) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.endpoint, self.project_id, self.location, model
        )
    }
}

#[async_trait]
impl GenerativeModel for VertexClient {
    async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<GenerateContentResponse, UpstreamError> {
        // token minting shares the per-call timeout
        let token = tokio::time::timeout(self.timeout, self.tokens.access_token())
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))??;
        let url = self.model_url(model);
        let start_time = Instant::now();

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&GenerateContentRequest::user_prompt(prompt))
            .send()
            .await;
        UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());
        let response = response?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<GoogleError>(&text) {
                Ok(err) => err.error.message,
                Err(_) if text.is_empty() => status.to_string(),
                Err(_) => text,
            };
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
