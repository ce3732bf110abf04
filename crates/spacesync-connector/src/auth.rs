//! Service-account authentication with domain-wide delegation.
//!
//! Google's service-account grant: sign a JWT assertion with the account's
//! private key, exchange it at the token endpoint for a short-lived access
//! token. The `sub` claim impersonates the configured admin user, which is
//! what grants the Directory and Chat scopes effect.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ConnectorError, ConnectorResult};

/// Source of bearer tokens for authorized API calls.
///
/// [`GoogleAuth`] is the production implementation; [`StaticToken`] serves
/// tests and local experimentation with a pre-issued token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get a currently valid access token.
    async fn token(&self) -> ConnectorResult<String>;
}

/// A fixed, never-refreshed token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> ConnectorResult<String> {
        Ok(self.0.clone())
    }
}

/// Default OAuth2 token endpoint.
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh the token this many seconds before its actual expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Parsed service-account key file (the JSON Google hands out).
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Service account email, used as the JWT issuer.
    pub client_email: String,
    /// PEM-encoded RSA private key.
    pub private_key: String,
    /// Token endpoint; present in the key file, defaulted if absent.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Load and parse a key file from disk.
    pub fn from_file(path: &Path) -> ConnectorResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::invalid_configuration(format!(
                "cannot read service account file {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ConnectorError::invalid_configuration(format!(
                "invalid service account file {}: {e}",
                path.display()
            ))
        })
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    sub: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    /// Unix timestamp after which the token must not be used.
    expires_at: i64,
}

/// Token provider for the Google connectors.
///
/// Caches the access token and refreshes it shortly before expiry.
pub struct GoogleAuth {
    key: ServiceAccountKey,
    subject: String,
    scopes: Vec<String>,
    client: Client,
    cached: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for GoogleAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleAuth")
            .field("client_email", &self.key.client_email)
            .field("subject", &self.subject)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl GoogleAuth {
    /// Create a token provider impersonating `subject` with the given scopes.
    pub fn new(
        key: ServiceAccountKey,
        subject: impl Into<String>,
        scopes: Vec<String>,
    ) -> ConnectorResult<Self> {
        if scopes.is_empty() {
            return Err(ConnectorError::invalid_configuration(
                "at least one OAuth scope is required",
            ));
        }
        Ok(Self {
            key,
            subject: subject.into(),
            scopes,
            client: Client::new(),
            cached: RwLock::new(None),
        })
    }

    /// Get a valid access token, refreshing if the cached one is near expiry.
    pub async fn token(&self) -> ConnectorResult<String> {
        let now = Utc::now().timestamp();

        {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at - EXPIRY_MARGIN_SECS > now {
                    return Ok(cached.token.clone());
                }
            }
        }

        let fresh = self.fetch_token(now).await?;

        let mut guard = self.cached.write().await;
        *guard = Some(fresh.clone());
        Ok(fresh.token)
    }

    /// Drop the cached token, forcing a refresh on the next request.
    pub async fn invalidate(&self) {
        let mut guard = self.cached.write().await;
        *guard = None;
    }

    async fn fetch_token(&self, now: i64) -> ConnectorResult<CachedToken> {
        let claims = Claims {
            iss: &self.key.client_email,
            sub: &self.subject,
            scope: self.scopes.join(" "),
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };

        let encoding_key =
            EncodingKey::from_rsa_pem(self.key.private_key.as_bytes()).map_err(|e| {
                ConnectorError::invalid_configuration(format!("invalid RSA private key: {e}"))
            })?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| ConnectorError::authentication(format!("failed to sign JWT: {e}")))?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::authentication(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::invalid_response(format!("token response: {e}")))?;

        debug!(
            subject = %self.subject,
            expires_in = token.expires_in,
            "Fetched access token"
        );

        Ok(CachedToken {
            token: token.access_token,
            expires_at: now + token.expires_in,
        })
    }
}

#[async_trait]
impl TokenProvider for GoogleAuth {
    async fn token(&self) -> ConnectorResult<String> {
        GoogleAuth::token(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_file_defaults_token_uri() {
        let key: ServiceAccountKey = serde_json::from_str(
            r#"{"client_email": "svc@example.iam.gserviceaccount.com", "private_key": "pem"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn new_rejects_empty_scopes() {
        let key = ServiceAccountKey {
            client_email: "svc@example.com".into(),
            private_key: "pem".into(),
            token_uri: DEFAULT_TOKEN_URI.into(),
        };
        let result = GoogleAuth::new(key, "admin@example.com", vec![]);
        assert!(result.is_err());
    }
}
