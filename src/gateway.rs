use serde_json::Value;
use std::sync::Arc;

use crate::auth::fingerprint;
use crate::error::GatewayError;
use crate::metrics::{AUTH_FAILURES, RATE_LIMITED_TOTAL, REQUEST_TOTAL};
use crate::models::{
    AgentRequest, AgentRequestBody, AgentResponse, ConnectionReport, DEFAULT_AGENT_NAME, iso_now,
};
use crate::rate_limit::RateLimiter;
use crate::vertex::{AgentService, NOT_INITIALIZED};

/// Authenticated, rate-limited front door to the agent service.
///
/// Every call walks the same path: authentication, rate admission, then
/// (for `invoke`) validation, and only then the upstream model. Rejections
/// come back as `GatewayError`; upstream trouble is folded into the
/// successful return value.
pub struct AgentGateway {
    limiter: Arc<RateLimiter>,
    service: AgentService,
}

impl AgentGateway {
    pub fn new(limiter: Arc<RateLimiter>, service: AgentService) -> Self {
        Self { limiter, service }
    }

    #[cfg(test)]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn service(&self) -> &AgentService {
        &self.service
    }

    fn admit(&self, caller_id: Option<&str>) -> Result<String, GatewayError> {
        REQUEST_TOTAL.inc();

        let Some(caller_id) = caller_id.filter(|id| !id.is_empty()) else {
            AUTH_FAILURES.inc();
            return Err(GatewayError::Authentication);
        };

        if !self.limiter.admit(caller_id) {
            RATE_LIMITED_TOTAL.inc();
            tracing::warn!(caller = %fingerprint(caller_id), "rate limit exceeded");
            return Err(GatewayError::RateLimited {
                limit: self.limiter.limit(),
                window: self.limiter.window(),
                retry_after: self.limiter.retry_after(caller_id),
            });
        }

        Ok(caller_id.to_string())
    }

    pub async fn health_check(&self, caller_id: Option<&str>) -> Result<ConnectionReport, GatewayError> {
        let caller_id = self.admit(caller_id)?;

        let report = self.service.test_connection().await;
        tracing::info!(
            caller = %fingerprint(&caller_id),
            success = report.success,
            "agent connection test finished"
        );
        Ok(report)
    }

    pub async fn invoke(
        &self,
        caller_id: Option<&str>,
        body: &[u8],
    ) -> Result<AgentResponse, GatewayError> {
        let caller_id = self.admit(caller_id)?;
        let request = validate(body, &caller_id)?;

        let response = match self.service.call_agent(&request).await {
            Ok(Some(response)) => response,
            Ok(None) => AgentResponse::failure(Some(request.agent_name.as_str()), NOT_INITIALIZED),
            Err(err) => {
                tracing::error!(
                    caller = %fingerprint(&caller_id),
                    agent = %request.agent_name,
                    error = %err,
                    "agent call failed"
                );
                AgentResponse::failure(None, format!("Agent call failed: {}", err))
            }
        };

        tracing::info!(
            caller = %fingerprint(&caller_id),
            agent = %response.agent,
            status = ?response.status,
            "agent call finished"
        );
        Ok(response)
    }
}

// Parse the body and build the normalized request, server fields last so a
// caller can never spoof userId or requestTime
fn validate(body: &[u8], caller_id: &str) -> Result<AgentRequest, GatewayError> {
    let body: AgentRequestBody = if body.iter().all(u8::is_ascii_whitespace) {
        AgentRequestBody::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| GatewayError::Validation(format!("Invalid request body: {}", e)))?
    };

    let prompt = match body.prompt {
        Some(prompt) if !prompt.trim().is_empty() => prompt,
        _ => return Err(GatewayError::Validation("Prompt is required".to_string())),
    };

    let mut context = body.context.unwrap_or_default();
    context.insert("userId".into(), Value::String(caller_id.to_string()));
    context.insert("requestTime".into(), Value::String(iso_now()));

    let agent_name = body
        .agent_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string());

    Ok(AgentRequest {
        prompt,
        context,
        agent_name,
        parameters: body.parameters,
    })
}
