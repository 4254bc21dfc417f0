//! `PayPal` OAuth client-credentials tokens.
//!
//! Tokens are cached in a `moka` cache and refreshed once they are within
//! [`REFRESH_MARGIN_SECS`] of expiry. Concurrent requests for a missing token
//! share one fetch.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use super::PayPalError;
use super::types::TokenResponse;

/// Refresh tokens this many seconds before they expire.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Upper bound on how long any token stays cached.
const MAX_TOKEN_AGE: Duration = Duration::from_secs(8 * 60 * 60);

const CACHE_KEY: &str = "client_credentials";

/// An access token and the unix time it expires at.
#[derive(Clone)]
pub struct AccessToken {
    pub access_token: SecretString,
    pub expires_at: i64,
}

impl AccessToken {
    /// Whether the token must be replaced before use at `now`.
    #[must_use]
    pub const fn needs_refresh(&self, now: i64) -> bool {
        now >= self.expires_at - REFRESH_MARGIN_SECS
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Fetches and caches access tokens for one set of credentials.
#[derive(Clone)]
pub struct TokenProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    secret_key: SecretString,
    cache: Cache<&'static str, AccessToken>,
}

impl TokenProvider {
    pub fn new(
        client: reqwest::Client,
        api_base: &str,
        client_id: String,
        secret_key: SecretString,
    ) -> Self {
        Self {
            client,
            token_url: format!("{api_base}/v1/oauth2/token"),
            client_id,
            secret_key,
            cache: Cache::builder()
                .max_capacity(1)
                .time_to_live(MAX_TOKEN_AGE)
                .build(),
        }
    }

    /// Return a valid access token, fetching a new one if needed.
    ///
    /// # Errors
    ///
    /// Returns `PayPalError::AuthenticationFailed` if the token request fails.
    pub async fn token(&self) -> Result<SecretString, PayPalError> {
        let now = chrono::Utc::now().timestamp();

        if let Some(token) = self.cache.get(CACHE_KEY).await {
            if !token.needs_refresh(now) {
                return Ok(token.access_token);
            }
            debug!("PayPal access token expiring, refreshing");
            self.cache.invalidate(CACHE_KEY).await;
        }

        let token = self
            .cache
            .try_get_with(CACHE_KEY, self.fetch())
            .await
            .map_err(|e: Arc<PayPalError>| PayPalError::AuthenticationFailed(e.to_string()))?;
        Ok(token.access_token)
    }

    #[instrument(skip(self), fields(client_id = %self.client_id))]
    async fn fetch(&self) -> Result<AccessToken, PayPalError> {
        let now = chrono::Utc::now().timestamp();

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(self.secret_key.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PayPalError::AuthenticationFailed(format!(
                "HTTP {status}: {message}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PayPalError::Parse(e.to_string()))?;

        debug!(expires_in = body.expires_in, "PayPal access token issued");
        Ok(AccessToken {
            access_token: SecretString::from(body.access_token),
            expires_at: now + body.expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_refresh_inside_margin() {
        let token = AccessToken {
            access_token: SecretString::from("A21AAF"),
            expires_at: 10_000,
        };
        assert!(!token.needs_refresh(9_000));
        assert!(!token.needs_refresh(9_939));
        assert!(token.needs_refresh(9_940));
        assert!(token.needs_refresh(10_001));
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = AccessToken {
            access_token: SecretString::from("A21AAFsecretvalue"),
            expires_at: 0,
        };
        let debug = format!("{token:?}");
        assert!(!debug.contains("A21AAFsecretvalue"));
    }
}
