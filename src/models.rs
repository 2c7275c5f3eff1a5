use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_AGENT_NAME: &str = "test-agent";
pub const AGENT_VERSION: &str = "1.0.0";
pub const UNKNOWN_AGENT: &str = "unknown";
pub const UNKNOWN_VERSION: &str = "0.0.0";
pub const NO_RESPONSE_TEXT: &str = "No response generated";

// ISO-8601, millisecond precision, "Z" suffix
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Raw POST body, validated into an AgentRequest by the gateway
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequestBody {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
}

/// Normalized request forwarded to the agent service.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub context: Map<String, Value>,
    pub agent_name: String,
    pub parameters: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Success,
    Error,
}

/// Response envelope returned by `POST /api/agent-test`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub agent: String,
    pub version: String,
    pub timestamp: String,
    pub response: String,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    pub fn success(agent: impl Into<String>, response: String, metadata: Map<String, Value>) -> Self {
        Self {
            agent: agent.into(),
            version: AGENT_VERSION.to_string(),
            timestamp: iso_now(),
            response,
            status: AgentStatus::Success,
            metadata: Some(metadata),
            error: None,
        }
    }

    pub fn failure(agent: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            agent: agent.unwrap_or(UNKNOWN_AGENT).to_string(),
            version: UNKNOWN_VERSION.to_string(),
            timestamp: iso_now(),
            response: String::new(),
            status: AgentStatus::Error,
            metadata: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Success
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
    pub project_id: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a connection test against the model backend.
#[derive(Debug, Clone)]
pub struct ConnectionReport {
    pub success: bool,
    pub message: String,
    pub details: Option<ConnectionDetails>,
}

// Body of GET /api/agent-test, details are always present on the wire
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResponse {
    pub success: bool,
    pub message: String,
    pub details: ConnectionDetails,
}

impl From<ConnectionReport> for HealthCheckResponse {
    fn from(report: ConnectionReport) -> Self {
        let details = report.details.unwrap_or_else(|| ConnectionDetails {
            project_id: "not-configured".to_string(),
            location: crate::config::DEFAULT_LOCATION.to_string(),
            test_response: None,
            error: None,
        });
        Self {
            success: report.success,
            message: report.message,
            details,
        }
    }
}
