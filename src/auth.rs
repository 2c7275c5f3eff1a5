use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::SessionKey;
use crate::error::{AuthError, ConfigError};

// Cookie the identity provider stores the session token in
const SESSION_COOKIE: &str = "__session";

#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
}

/// Verifies identity provider session tokens and yields the caller id.
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn from_key(key: SessionKey) -> Result<Self, ConfigError> {
        match key {
            SessionKey::RsaPem(pem) => Self::from_rsa_pem(&pem),
            SessionKey::Secret(secret) => Ok(Self::from_secret(secret.as_bytes())),
        }
    }

    pub fn from_rsa_pem(pem: &str) -> Result<Self, ConfigError> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(ConfigError::InvalidSessionKey)?;
        Ok(Self {
            key,
            validation: session_validation(Algorithm::RS256),
        })
    }

    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: session_validation(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.key, &self.validation)?;
        let sub = data.claims.sub.trim();
        if sub.is_empty() {
            return Err(AuthError::MissingSubject);
        }
        Ok(sub.to_string())
    }

    /// Resolves the caller id for a request, from the bearer token or the
    /// session cookie.
    pub fn caller_id(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let token = match bearer_token(headers)? {
            Some(token) => token,
            None => session_cookie(headers).ok_or(AuthError::MissingToken)?,
        };
        self.verify(token)
    }
}

fn session_validation(algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.validate_nbf = true;
    // session tokens carry azp, not aud
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation
}

pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;

    match value.split_once(' ') {
        Some(("Bearer", token)) if !token.trim().is_empty() => Ok(Some(token.trim())),
        _ => Err(AuthError::MalformedHeader),
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

// Short stable fingerprint so logs never carry raw user ids
pub fn fingerprint(caller_id: &str) -> String {
    let digest = Sha256::digest(caller_id.as_bytes());
    format!("{:x}", digest)[..12].to_string()
}
