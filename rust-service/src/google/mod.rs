//! Google service account authentication.
//!
//! Implements the OAuth 2.0 JWT-bearer grant: a short-lived RS256-signed
//! assertion is exchanged at the token endpoint for an access token, which
//! is cached and shared by the Sheets and Drive clients until shortly
//! before expiry.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ValidatedConfig;

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";

/// Tokens are refreshed this many seconds before their reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Issues and caches access tokens for the configured service account.
pub struct Authenticator {
    http: reqwest::Client,
    client_email: String,
    encoding_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl Authenticator {
    /// Build an authenticator from validated configuration.
    ///
    /// Fails if the private key PEM cannot be parsed, the one credential
    /// problem the normalization step cannot detect.
    pub fn new(config: &ValidatedConfig, timeout: Duration) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(config.private_key.as_bytes())
            .context("Service account private key is not a valid RSA PEM")?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for token endpoint")?;

        Ok(Self {
            http,
            client_email: config.service_account_email.clone(),
            encoding_key,
            cached: Mutex::new(None),
        })
    }

    /// Return a valid access token, fetching a fresh one if the cached
    /// token is missing or close to expiry.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - EXPIRY_MARGIN_SECS > now {
                debug!(expires_at = token.expires_at, "google_token_cache_hit");
                return Ok(token.access_token.clone());
            }
        }

        let token = self.fetch_token(now).await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);

        Ok(access_token)
    }

    async fn fetch_token(&self, now: i64) -> Result<CachedToken> {
        let claims = Claims {
            iss: &self.client_email,
            scope: SCOPES,
            aud: TOKEN_ENDPOINT,
            iat: now,
            exp: now + 3600,
        };

        let assertion = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )
        .context("Failed to sign service account assertion")?;

        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("Token endpoint request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            anyhow::bail!("Token endpoint returned {}: {}", status, snippet);
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Token endpoint returned invalid JSON")?;

        info!(expires_in = token.expires_in, "google_token_fetched");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: now + token.expires_in,
        })
    }
}
