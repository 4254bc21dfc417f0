//! Identity provider webhooks.
//!
//! Webhooks are signed with the Svix scheme: the HMAC-SHA256 of
//! `{svix-id}.{svix-timestamp}.{body}`, keyed with the base64 part of the
//! `whsec_` secret, base64 encoded and listed as `v1,<signature>` in the
//! space separated `svix-signature` header.

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

/// Maximum accepted age (and clock skew) of a webhook, in seconds.
pub const TOLERANCE_SECS: i64 = 5 * 60;

pub const ID_HEADER: &str = "svix-id";
pub const TIMESTAMP_HEADER: &str = "svix-timestamp";
pub const SIGNATURE_HEADER: &str = "svix-signature";

/// Webhook verification and parsing errors.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// A signature header is absent.
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    /// The signing secret is not a valid `whsec_` value.
    #[error("invalid webhook secret")]
    InvalidSecret,

    /// The timestamp is malformed or outside the tolerance window.
    #[error("webhook timestamp {0}")]
    Timestamp(&'static str),

    /// No signature matched.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// The body is not a webhook event.
    #[error("invalid webhook payload: {0}")]
    Payload(String),
}

impl WebhookError {
    /// Whether the error means the sender could not be authenticated.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        !matches!(self, Self::Payload(_) | Self::InvalidSecret)
    }
}

/// The three Svix headers of a delivery.
#[derive(Debug, Clone, Copy)]
pub struct SignedHeaders<'a> {
    pub id: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
}

/// Verifies webhook signatures with one signing secret.
pub struct WebhookVerifier {
    key: Vec<u8>,
}

impl WebhookVerifier {
    /// Create a verifier from a `whsec_...` secret.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::InvalidSecret` if the secret is not base64.
    pub fn new(secret: &SecretString) -> Result<Self, WebhookError> {
        let raw = secret.expose_secret();
        let encoded = raw.strip_prefix("whsec_").unwrap_or(raw);
        let key = STANDARD
            .decode(encoded)
            .map_err(|_| WebhookError::InvalidSecret)?;
        Ok(Self { key })
    }

    /// Verify a delivery received at unix time `now`.
    ///
    /// # Errors
    ///
    /// Returns an error when a header is missing, the timestamp is outside
    /// [`TOLERANCE_SECS`], or no `v1` signature matches.
    pub fn verify(
        &self,
        headers: SignedHeaders<'_>,
        body: &[u8],
        now: i64,
    ) -> Result<(), WebhookError> {
        let id = headers.id.ok_or(WebhookError::MissingHeader(ID_HEADER))?;
        let timestamp = headers
            .timestamp
            .ok_or(WebhookError::MissingHeader(TIMESTAMP_HEADER))?;
        let signatures = headers
            .signature
            .ok_or(WebhookError::MissingHeader(SIGNATURE_HEADER))?;

        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| WebhookError::Timestamp("is not a number"))?;
        if now.saturating_sub(ts) > TOLERANCE_SECS {
            return Err(WebhookError::Timestamp("is too old"));
        }
        if ts.saturating_sub(now) > TOLERANCE_SECS {
            return Err(WebhookError::Timestamp("is in the future"));
        }

        let expected = self.sign(id, timestamp.trim(), body)?;
        let matched = signatures
            .split_whitespace()
            .filter_map(|entry| entry.strip_prefix("v1,"))
            .any(|candidate| constant_time_compare(candidate, &expected));
        if !matched {
            return Err(WebhookError::SignatureMismatch);
        }

        debug!(webhook_id = %id, "Webhook signature verified");
        Ok(())
    }

    /// Base64 signature of a delivery.
    fn sign(&self, id: &str, timestamp: &str, body: &[u8]) -> Result<String, WebhookError> {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.key).map_err(|_| WebhookError::InvalidSecret)?;
        mac.update(id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

// =============================================================================
// Events
// =============================================================================

/// A webhook event envelope.
#[derive(Debug, Deserialize)]
pub struct ClerkEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The user object carried by `user.*` events.
#[derive(Debug, Deserialize)]
pub struct ClerkUser {
    pub id: String,
    #[serde(default)]
    pub email_addresses: Vec<ClerkEmailAddress>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClerkEmailAddress {
    pub email_address: String,
}

impl ClerkEvent {
    /// Parse an event body.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Payload` if the body is not an event.
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body).map_err(|e| WebhookError::Payload(e.to_string()))
    }

    /// The new user, for `user.created` events.
    #[must_use]
    pub fn created_user(&self) -> Option<ClerkUser> {
        if self.event_type != "user.created" {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}

impl ClerkUser {
    /// First listed email address.
    #[must_use]
    pub fn primary_email(&self) -> Option<&str> {
        self.email_addresses
            .first()
            .map(|e| e.email_address.as_str())
    }

    /// First and last name joined and trimmed.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}
