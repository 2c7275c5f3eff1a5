use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

// CLI argument structure, every Google/Clerk setting also readable from env
#[derive(Parser, Debug, Clone)]
#[command(name = "agent-gateway")]
#[command(about = "Rate-limited gateway in front of Vertex AI test agents")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Google Cloud project hosting the model
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT_ID")]
    pub project_id: Option<String>,

    // Vertex AI region
    #[arg(long, env = "GOOGLE_CLOUD_REGION", default_value = DEFAULT_LOCATION)]
    pub location: String,

    // Path to a service account or authorized user JSON file
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub credentials_path: Option<PathBuf>,

    // Same JSON, inline. Takes precedence over the path
    #[arg(long, env = "GOOGLE_CLOUD_KEY_JSON", hide_env_values = true)]
    pub credentials_json: Option<String>,

    // Model used for both the connection test and agent calls
    #[arg(long, env = "VERTEX_AI_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    // Override the regional endpoint, e.g. for a proxy
    #[arg(long, env = "VERTEX_AI_ENDPOINT")]
    pub vertex_endpoint: Option<String>,

    // Upstream call timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub upstream_timeout: u64,

    // PEM public key that signs session tokens (RS256)
    #[arg(long, env = "CLERK_JWT_KEY", hide_env_values = true)]
    pub session_public_key: Option<String>,

    // Shared secret for HS256 session tokens
    #[arg(long, env = "SESSION_JWT_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    // Rate limit max requests per window
    #[arg(long, default_value_t = 60)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,

    // How often expired rate limit entries are dropped, in seconds
    #[arg(long, default_value_t = 300)]
    pub sweep_interval: u64,
}

/// Settings needed to talk to Vertex AI.
#[derive(Debug, Clone)]
pub struct VertexConfig {
    pub project_id: String,
    pub location: String,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl VertexConfig {
    pub fn new(project_id: impl Into<String>, location: impl Into<String>) -> Self {
        let location = location.into();
        Self {
            project_id: project_id.into(),
            endpoint: regional_endpoint(&location),
            location,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub fn regional_endpoint(location: &str) -> String {
    format!("https://{}-aiplatform.googleapis.com", location)
}

pub enum SessionKey {
    RsaPem(String),
    Secret(String),
}

impl Args {
    pub fn vertex_config(&self) -> Result<VertexConfig, ConfigError> {
        let project_id = self
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingProjectId)?;

        let location = match self.location.trim() {
            "" => DEFAULT_LOCATION,
            loc => loc,
        };

        let mut config = VertexConfig::new(project_id, location);
        config.model = self.model.clone();
        config.timeout = Duration::from_secs(self.upstream_timeout);
        if let Some(endpoint) = self.vertex_endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            config.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        Ok(config)
    }

    // Public key wins when both are configured
    pub fn session_key(&self) -> Result<SessionKey, ConfigError> {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());

        if let Some(pem) = non_empty(&self.session_public_key) {
            return Ok(SessionKey::RsaPem(pem));
        }
        if let Some(secret) = non_empty(&self.session_secret) {
            return Ok(SessionKey::Secret(secret));
        }
        Err(ConfigError::MissingSessionKey)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }
}
