use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::{CredentialsError, UpstreamError};

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
// refresh a bit before Google would reject the token
const REFRESH_MARGIN: Duration = Duration::from_secs(60);
// Google never hands out tokens living longer than this
const MAX_TOKEN_LIFETIME_SECS: u64 = 12 * 3600;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

// The two key file layouts gcloud produces
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default)]
        private_key_id: Option<String>,
        #[serde(default = "default_token_uri")]
        token_uri: String,
    },
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default = "default_token_uri")]
        token_uri: String,
    },
}

pub struct ServiceAccount {
    client_email: String,
    key_id: Option<String>,
    key: EncodingKey,
    token_uri: String,
}

pub struct AuthorizedUser {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_uri: String,
}

/// Where access tokens for Vertex AI come from.
pub enum Credentials {
    ServiceAccount(ServiceAccount),
    AuthorizedUser(AuthorizedUser),
    /// Application default credentials from the GCE metadata server.
    Metadata,
}

impl Credentials {
    /// Inline JSON wins over a file path; with neither we fall back to the
    /// metadata server.
    pub fn resolve(json: Option<&str>, path: Option<&Path>) -> Result<Self, CredentialsError> {
        if let Some(json) = json.filter(|j| !j.trim().is_empty()) {
            return Self::from_json(json);
        }

        if let Some(path) = path {
            let raw = std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
                path: path.display().to_string(),
                source,
            })?;
            return Self::from_json(&raw);
        }

        tracing::warn!("No Google Cloud credentials found. Using application default credentials.");
        Ok(Credentials::Metadata)
    }

    pub fn from_json(json: &str) -> Result<Self, CredentialsError> {
        let parsed: CredentialsFile = serde_json::from_str(json)?;

        Ok(match parsed {
            CredentialsFile::ServiceAccount {
                client_email,
                private_key,
                private_key_id,
                token_uri,
            } => {
                let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
                    .map_err(CredentialsError::PrivateKey)?;
                Credentials::ServiceAccount(ServiceAccount {
                    client_email,
                    key_id: private_key_id,
                    key,
                    token_uri,
                })
            }
            CredentialsFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => Credentials::AuthorizedUser(AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            }),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::ServiceAccount(_) => "service_account",
            Credentials::AuthorizedUser(_) => "authorized_user",
            Credentials::Metadata => "metadata_server",
        }
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct OAuthError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Mints and caches OAuth access tokens.
///
/// The cache sits behind an async mutex held across the refresh, so a burst of
/// requests arriving with an expired token triggers a single token exchange.
pub struct TokenSource {
    credentials: Credentials,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(credentials: Credentials, http: reqwest::Client) -> Self {
        Self {
            credentials,
            http,
            cached: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.credentials.kind()
    }

    pub async fn access_token(&self) -> Result<String, UpstreamError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() + REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch().await?;
        tracing::debug!(
            source = self.kind(),
            expires_in = fresh.expires_in,
            "minted Google access token"
        );

        let value = fresh.access_token.clone();
        *cached = Some(CachedToken {
            value: fresh.access_token,
            expires_at: Instant::now() + Duration::from_secs(fresh.expires_in.min(MAX_TOKEN_LIFETIME_SECS)),
        });
        Ok(value)
    }

    async fn fetch(&self) -> Result<TokenResponse, UpstreamError> {
        let response = match &self.credentials {
            Credentials::ServiceAccount(account) => {
                let assertion = sign_assertion(account)?;
                self.http
                    .post(&account.token_uri)
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
                    .send()
                    .await?
            }
            Credentials::AuthorizedUser(user) => {
                self.http
                    .post(&user.token_uri)
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("client_id", user.client_id.as_str()),
                        ("client_secret", user.client_secret.as_str()),
                        ("refresh_token", user.refresh_token.as_str()),
                    ])
                    .send()
                    .await?
            }
            Credentials::Metadata => {
                self.http
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<OAuthError>(&text) {
                Ok(err) => err.error_description.unwrap_or(err.error),
                Err(_) if text.is_empty() => status.to_string(),
                Err(_) => text,
            };
            return Err(UpstreamError::Token(format!("{} ({})", reason, status.as_u16())));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn sign_assertion(account: &ServiceAccount) -> Result<String, UpstreamError> {
    let now = chrono::Utc::now().timestamp();
    let claims = AssertionClaims {
        iss: &account.client_email,
        scope: CLOUD_PLATFORM_SCOPE,
        aud: &account.token_uri,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = account.key_id.clone();
    Ok(jsonwebtoken::encode(&header, &claims, &account.key)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Form, Json, Router, extract::State, routing::post};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn no_material_falls_back_to_metadata_server() {
        let creds = Credentials::resolve(None, None).unwrap();
        assert_eq!(creds.kind(), "metadata_server");

        let blank = Credentials::resolve(Some("   "), None).unwrap();
        assert_eq!(blank.kind(), "metadata_server");
    }

    #[test]
    fn authorized_user_json_is_accepted() {
        let creds = Credentials::from_json(
            r#"{"type":"authorized_user","client_id":"id","client_secret":"secret","refresh_token":"rt"}"#,
        )
        .unwrap();
        assert_eq!(creds.kind(), "authorized_user");
    }

    #[test]
    fn malformed_material_is_rejected() {
        assert!(matches!(
            Credentials::from_json("{not json"),
            Err(CredentialsError::Parse(_))
        ));
        assert!(matches!(
            Credentials::from_json(r#"{"type":"external_account"}"#),
            Err(CredentialsError::Parse(_))
        ));
        assert!(matches!(
            Credentials::from_json(
                r#"{"type":"service_account","client_email":"sa@p.iam.gserviceaccount.com","private_key":"fake-key"}"#
            ),
            Err(CredentialsError::PrivateKey(_))
        ));
    }

    #[test]
    fn unreadable_file_is_reported_with_path() {
        let result = Credentials::resolve(None, Some(Path::new("/nonexistent/key.json")));
        match result {
            Err(CredentialsError::Read { path, .. }) => assert_eq!(path, "/nonexistent/key.json"),
            _ => panic!("expected a read error"),
        }
    }

    const TEST_PRIVATE_KEY: &str = include_str!("testdata/service_account_key.pem");
    const TEST_PUBLIC_KEY: &str = include_str!("testdata/service_account_key.pub.pem");

    async fn serve(app: Router) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    fn authorized_user(addr: std::net::SocketAddr) -> Credentials {
        Credentials::from_json(&format!(
            r#"{{"type":"authorized_user","client_id":"id","client_secret":"secret","refresh_token":"rt","token_uri":"http://{}/token"}}"#,
            addr
        ))
        .unwrap()
    }

    async fn token_endpoint(
        State(hits): State<Arc<AtomicUsize>>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        hits.fetch_add(1, Ordering::SeqCst);
        assert_eq!(form.get("grant_type").map(String::as_str), Some("refresh_token"));
        assert_eq!(form.get("refresh_token").map(String::as_str), Some("rt"));
        Json(serde_json::json!({"access_token": "ya29.test", "expires_in": 3600, "token_type": "Bearer"}))
    }

    #[tokio::test]
    async fn refresh_token_grant_is_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/token", post(token_endpoint))
            .with_state(Arc::clone(&hits));
        let addr = serve(app).await;

        let source = TokenSource::new(authorized_user(addr), reqwest::Client::new());

        assert_eq!(source.access_token().await.unwrap(), "ya29.test");
        assert_eq!(source.access_token().await.unwrap(), "ya29.test");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    type Captured = Arc<std::sync::Mutex<Vec<HashMap<String, String>>>>;

    #[tokio::test]
    async fn service_account_signs_jwt_bearer_assertion() {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/token",
                post(
                    |State(captured): State<Captured>, Form(form): Form<HashMap<String, String>>| async move {
                        captured.lock().unwrap().push(form);
                        Json(serde_json::json!({"access_token": "ya29.sa", "expires_in": 3599}))
                    },
                ),
            )
            .with_state(Arc::clone(&captured));
        let addr = serve(app).await;
        let token_uri = format!("http://{}/token", addr);

        let key_file = serde_json::json!({
            "type": "service_account",
            "project_id": "brief-lab",
            "private_key_id": "key-123",
            "private_key": TEST_PRIVATE_KEY,
            "client_email": "agent-gateway@brief-lab.iam.gserviceaccount.com",
            "token_uri": token_uri,
        });
        let creds = Credentials::from_json(&key_file.to_string()).unwrap();
        assert_eq!(creds.kind(), "service_account");
        let source = TokenSource::new(creds, reqwest::Client::new());

        assert_eq!(source.access_token().await.unwrap(), "ya29.sa");
        assert_eq!(source.access_token().await.unwrap(), "ya29.sa");

        let forms = captured.lock().unwrap().clone();
        assert_eq!(forms.len(), 1, "second call should be served from cache");
        let form = &forms[0];
        assert_eq!(form.get("grant_type").map(String::as_str), Some(JWT_BEARER_GRANT));

        let assertion = form.get("assertion").expect("assertion posted");
        let header = jsonwebtoken::decode_header(assertion).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("key-123"));

        let mut validation = jsonwebtoken::Validation::new(Algorithm::RS256);
        validation.set_audience(&[token_uri.as_str()]);
        let claims = jsonwebtoken::decode::<serde_json::Value>(
            assertion,
            &jsonwebtoken::DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap()
        .claims;
        assert_eq!(claims["iss"], "agent-gateway@brief-lab.iam.gserviceaccount.com");
        assert_eq!(claims["scope"], CLOUD_PLATFORM_SCOPE);
        assert_eq!(claims["aud"], token_uri.as_str());
        let lifetime = claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap();
        assert_eq!(lifetime, ASSERTION_LIFETIME_SECS);
    }

    #[tokio::test]
    async fn absurd_token_lifetime_is_clamped() {
        let app = Router::new().route(
            "/token",
            post(|| async { Json(serde_json::json!({"access_token": "ya29.forever", "expires_in": u64::MAX})) }),
        );
        let addr = serve(app).await;
        let source = TokenSource::new(authorized_user(addr), reqwest::Client::new());

        assert_eq!(source.access_token().await.unwrap(), "ya29.forever");
        let expires_at = source.cached.lock().await.as_ref().unwrap().expires_at;
        assert!(expires_at <= Instant::now() + Duration::from_secs(MAX_TOKEN_LIFETIME_SECS));
    }

    #[tokio::test]
    async fn malformed_token_response_is_a_decode_error() {
        let app = Router::new().route("/token", post(|| async { "<html>captive portal</html>" }));
        let addr = serve(app).await;
        let source = TokenSource::new(authorized_user(addr), reqwest::Client::new());

        assert!(matches!(
            source.access_token().await,
            Err(UpstreamError::Deserialize(_))
        ));
    }

    #[tokio::test]
    async fn oauth_error_description_is_surfaced() {
        let app = Router::new().route(
            "/token",
            post(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": "invalid_grant", "error_description": "Token has been expired or revoked."})),
                )
            }),
        );
        let addr = serve(app).await;
        let source = TokenSource::new(authorized_user(addr), reqwest::Client::new());

        let err = source.access_token().await.err().expect("token exchange should fail");
        assert_eq!(
            err.to_string(),
            "token request failed: Token has been expired or revoked. (400)"
        );
    }
}
