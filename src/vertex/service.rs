use serde_json::{Map, Value};
use std::sync::Arc;

use super::GenerativeModel;
use crate::config::VertexConfig;
use crate::error::UpstreamError;
use crate::metrics::{EMPTY_GENERATIONS, UPSTREAM_FAILURES};
use crate::models::{AgentRequest, AgentResponse, ConnectionDetails, ConnectionReport, NO_RESPONSE_TEXT};

pub const CONNECTION_TEST_PROMPT: &str =
    "Hello, this is a connection test. Please respond with \"Connection successful\".";
pub const NOT_INITIALIZED: &str = "Vertex AI client not initialized";

pub fn agent_prompt(prompt: &str) -> String {
    format!("Acting as a test agent, please respond to this prompt: {}", prompt)
}

enum Backend {
    Ready(Arc<dyn GenerativeModel>),
    Uninitialized(String),
}

/// Configured access to the model behind the test agent.
///
/// Built once at startup. When the credential material could not be loaded the
/// service still exists but answers every call with a "not initialized"
/// outcome without touching the network.
pub struct AgentService {
    backend: Backend,
    project_id: String,
    location: String,
    model: String,
}

impl AgentService {
    pub fn new(config: &VertexConfig, model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            backend: Backend::Ready(model),
            project_id: config.project_id.clone(),
            location: config.location.clone(),
            model: config.model.clone(),
        }
    }

    pub fn uninitialized(config: &VertexConfig, reason: impl Into<String>) -> Self {
        Self {
            backend: Backend::Uninitialized(reason.into()),
            project_id: config.project_id.clone(),
            location: config.location.clone(),
            model: config.model.clone(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.backend, Backend::Ready(_))
    }

    fn ready(&self) -> Option<&Arc<dyn GenerativeModel>> {
        match &self.backend {
            Backend::Ready(model) => Some(model),
            Backend::Uninitialized(reason) => {
                tracing::debug!(reason = %reason, "agent service used while uninitialized");
                None
            }
        }
    }

    /// Sends the diagnostic prompt. Upstream failures become an unsuccessful
    /// report rather than an error.
    pub async fn test_connection(&self) -> ConnectionReport {
        let Some(model) = self.ready() else {
            return ConnectionReport {
                success: false,
                message: NOT_INITIALIZED.to_string(),
                details: None,
            };
        };

        match model.generate_content(&self.model, CONNECTION_TEST_PROMPT).await {
            Ok(result) => ConnectionReport {
                success: true,
                message: "Vertex AI connection successful".to_string(),
                details: Some(ConnectionDetails {
                    project_id: self.project_id.clone(),
                    location: self.location.clone(),
                    test_response: result.first_text().map(str::to_string),
                    error: None,
                }),
            },
            Err(err) => {
                UPSTREAM_FAILURES.inc();
                tracing::warn!(error = %err, "Vertex AI connection test failed");
                ConnectionReport {
                    success: false,
                    message: format!("Connection test failed: {}", err),
                    details: Some(ConnectionDetails {
                        project_id: self.project_id.clone(),
                        location: self.location.clone(),
                        test_response: None,
                        error: Some(err.to_string()),
                    }),
                }
            }
        }
    }

    /// Runs the prompt through the model. `Ok(None)` means the service is not
    /// initialized; the gateway turns both that and `Err` into error envelopes.
    pub async fn call_agent(
        &self,
        request: &AgentRequest,
    ) -> Result<Option<AgentResponse>, UpstreamError> {
        let Some(model) = self.ready() else {
            return Ok(None);
        };

        let result = model
            .generate_content(&self.model, &agent_prompt(&request.prompt))
            .await
            .inspect_err(|_| UPSTREAM_FAILURES.inc())?;

        let text = match result.first_text() {
            Some(text) => text.to_string(),
            None => {
                EMPTY_GENERATIONS.inc();
                tracing::warn!(
                    agent = %request.agent_name,
                    candidates = result.candidates.len(),
                    finish_reason = result.finish_reason().unwrap_or("none"),
                    "model returned no text, substituting placeholder"
                );
                NO_RESPONSE_TEXT.to_string()
            }
        };

        let mut metadata = Map::new();
        metadata.insert("projectId".into(), Value::String(self.project_id.clone()));
        metadata.insert("location".into(), Value::String(self.location.clone()));
        metadata.insert("model".into(), Value::String(self.model.clone()));
        metadata.insert("context".into(), Value::Object(request.context.clone()));

        Ok(Some(AgentResponse::success(
            request.agent_name.clone(),
            text,
            metadata,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentStatus;
    use crate::vertex::mock::MockModel;

    fn config() -> VertexConfig {
        VertexConfig::new("test-project", "us-central1")
    }

    fn request(prompt: &str) -> AgentRequest {
        let mut context = Map::new();
        context.insert("userId".into(), Value::String("u1".into()));
        AgentRequest {
            prompt: prompt.to_string(),
            context,
            agent_name: "test-agent".to_string(),
            parameters: None,
        }
    }

    #[tokio::test]
    async fn connection_test_success_embeds_config() {
        let model = Arc::new(MockModel::replying("Connection successful"));
        let service = AgentService::new(&config(), model.clone());

        let report = service.test_connection().await;
        assert!(report.success);
        assert_eq!(report.message, "Vertex AI connection successful");
        let details = report.details.unwrap();
        assert_eq!(details.project_id, "test-project");
        assert_eq!(details.location, "us-central1");
        assert_eq!(details.test_response.as_deref(), Some("Connection successful"));
        assert_eq!(model.last_prompt().as_deref(), Some(CONNECTION_TEST_PROMPT));
        assert_eq!(model.last_model().as_deref(), Some("gemini-1.5-flash"));
    }

    #[tokio::test]
    async fn connection_test_failure_is_recovered() {
        let service = AgentService::new(&config(), Arc::new(MockModel::failing("Invalid credentials")));

        let report = service.test_connection().await;
        assert!(!report.success);
        assert!(report.message.starts_with("Connection test failed: "));
        assert!(report.message.contains("Invalid credentials"));
        let details = report.details.unwrap();
        assert_eq!(details.project_id, "test-project");
        assert!(details.error.unwrap().contains("Invalid credentials"));
    }

    #[tokio::test]
    async fn uninitialized_service_short_circuits() {
        let service = AgentService::uninitialized(&config(), "bad key");
        assert!(!service.is_initialized());

        let report = service.test_connection().await;
        assert!(!report.success);
        assert_eq!(report.message, NOT_INITIALIZED);
        assert!(report.details.is_none());

        assert!(service.call_agent(&request("ping")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn call_agent_wraps_prompt_and_echoes_context() {
        let model = Arc::new(MockModel::replying("pong"));
        let service = AgentService::new(&config(), model.clone());

        let response = service.call_agent(&request("ping")).await.unwrap().unwrap();
        assert_eq!(response.status, AgentStatus::Success);
        assert_eq!(response.response, "pong");
        assert_eq!(response.agent, "test-agent");
        assert_eq!(response.version, "1.0.0");
        assert_eq!(
            model.last_prompt().as_deref(),
            Some("Acting as a test agent, please respond to this prompt: ping")
        );

        let metadata = response.metadata.unwrap();
        assert_eq!(metadata["projectId"], "test-project");
        assert_eq!(metadata["context"]["userId"], "u1");
    }

    #[tokio::test]
    async fn empty_generation_is_success_with_placeholder() {
        let service = AgentService::new(&config(), Arc::new(MockModel::empty()));

        let response = service.call_agent(&request("ping")).await.unwrap().unwrap();
        assert!(response.is_success());
        assert_eq!(response.response, "No response generated");
    }

    #[tokio::test]
    async fn blocked_generation_is_success_with_placeholder() {
        let model = Arc::new(MockModel::blocked("SAFETY"));
        let service = AgentService::new(&config(), model.clone());

        let response = service.call_agent(&request("ping")).await.unwrap().unwrap();
        assert!(response.is_success());
        assert_eq!(response.response, "No response generated");
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn upstream_error_is_returned() {
        let service = AgentService::new(&config(), Arc::new(MockModel::failing("quota exhausted")));

        let err = service.call_agent(&request("ping")).await.err().unwrap();
        assert!(err.to_string().contains("quota exhausted"));
    }
}
