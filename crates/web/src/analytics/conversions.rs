//! Server-side conversion relay (Reddit Conversions API).
//!
//! Conversions are best effort: a failed send is logged and reported as
//! `false`, never retried, and never blocks the visitor.

use std::sync::Arc;

use async_trait::async_trait;
use match_magnet_core::{FunnelEvent, Money};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::prelude::ToPrimitive;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::AnalyticsConfig;

/// Errors that can occur when sending a conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// No access token is configured.
    #[error("conversion API is not configured")]
    NotConfigured,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// Visitor identifiers attached to a conversion.
///
/// Email and phone are only ever sent hashed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub em: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ph: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_user_agent: Option<String>,
}

impl UserData {
    /// Hash the email and phone when present; blank values are skipped.
    #[must_use]
    pub fn hashed(email: Option<&str>, phone: Option<&str>) -> Self {
        Self {
            em: email.filter(|e| !e.trim().is_empty()).map(|e| vec![hash_email(e)]),
            ph: phone.and_then(hash_phone).map(|p| vec![p]),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_client(mut self, ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.client_ip_address = Some(ip.into());
        self.client_user_agent = Some(user_agent.into());
        self
    }

    /// JSON object with `overrides` laid over the computed fields.
    #[must_use]
    pub fn merged(&self, overrides: Option<&Map<String, Value>>) -> Map<String, Value> {
        let mut merged = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if let Some(overrides) = overrides {
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

/// One conversion as sent to the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionEvent {
    pub event_type: String,
    /// Unix seconds.
    pub event_time: i64,
    pub user_data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Map<String, Value>>,
    pub action_source: &'static str,
}

impl ConversionEvent {
    #[must_use]
    pub fn new(event: &FunnelEvent, user_data: Map<String, Value>) -> Self {
        Self {
            event_type: event.as_str().to_string(),
            event_time: chrono::Utc::now().timestamp(),
            user_data,
            custom_data: None,
            action_source: "website",
        }
    }

    #[must_use]
    pub fn with_custom_data(mut self, custom_data: Map<String, Value>) -> Self {
        self.custom_data = Some(custom_data);
        self
    }
}

/// Custom data for a purchase: value and currency first, then the package
/// and order, then caller supplied fields on top.
#[must_use]
pub fn purchase_data(
    amount: Option<&Money>,
    currency: &str,
    package_name: Option<&str>,
    order_id: Option<&str>,
) -> Map<String, Value> {
    let mut data = Map::new();
    let value = amount
        .and_then(|m| m.amount.to_f64())
        .map_or_else(|| Value::from(0), Value::from);
    data.insert("value".to_string(), value);
    data.insert("currency".to_string(), Value::from(currency));
    if let Some(name) = package_name {
        data.insert("content_name".to_string(), Value::from(name));
    }
    data.insert("content_category".to_string(), Value::from("pricing_package"));
    if let Some(order_id) = order_id {
        data.insert("order_id".to_string(), Value::from(order_id));
    }
    data
}

/// Default content fields for events that have them.
#[must_use]
pub fn content_data(
    event: &FunnelEvent,
    content_name: Option<&str>,
) -> Option<Map<String, Value>> {
    let (default_name, category) = event.default_content()?;
    let name = match event {
        FunnelEvent::CompleteRegistration => default_name,
        _ => content_name.unwrap_or(default_name),
    };
    let mut data = Map::new();
    data.insert("content_name".to_string(), Value::from(name));
    data.insert("content_category".to_string(), Value::from(category));
    Some(data)
}

/// Lay `overrides` over `base`.
#[must_use]
pub fn overlay(
    mut base: Map<String, Value>,
    overrides: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            base.insert(key.clone(), value.clone());
        }
    }
    base
}

/// SHA-256 hex of the trimmed, lowercased email.
#[must_use]
pub fn hash_email(email: &str) -> String {
    hex::encode(Sha256::digest(email.trim().to_lowercase().as_bytes()))
}

/// SHA-256 hex of the phone's digits, or `None` when it has none.
#[must_use]
pub fn hash_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    Some(hex::encode(Sha256::digest(digits.as_bytes())))
}

/// Destination for server-side conversions.
#[async_trait]
pub trait ConversionSink: Send + Sync {
    async fn send(&self, event: &ConversionEvent) -> Result<(), ConversionError>;
}

/// Reddit Conversions API client.
#[derive(Clone)]
pub struct RedditConversions {
    client: reqwest::Client,
    api_url: String,
    token: Option<SecretString>,
}

impl RedditConversions {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &AnalyticsConfig) -> Result<Self, ConversionError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static("MatchMagnet-Conversions/1.0"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        if config.reddit_conversion_token.is_none() {
            tracing::warn!(
                "REDDIT_CONVERSION_TOKEN not set, server-side conversions are disabled"
            );
        }

        Ok(Self {
            client,
            api_url: config.reddit_conversion_api_url.clone(),
            token: config.reddit_conversion_token.clone(),
        })
    }
}

#[async_trait]
impl ConversionSink for RedditConversions {
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    async fn send(&self, event: &ConversionEvent) -> Result<(), ConversionError> {
        let token = self.token.as_ref().ok_or(ConversionError::NotConfigured)?;

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(token.expose_secret())
            .json(&serde_json::json!({ "data": [event] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ConversionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!("Conversion sent");
        Ok(())
    }
}

/// Send a conversion and report whether it was accepted. Never fails.
pub async fn send_logged(sink: &dyn ConversionSink, event: &ConversionEvent) -> bool {
    match sink.send(event).await {
        Ok(()) => true,
        Err(ConversionError::NotConfigured) => {
            tracing::debug!(event_type = %event.event_type, "Conversion skipped, no token");
            false
        }
        Err(e) => {
            tracing::warn!(event_type = %event.event_type, error = %e, "Conversion failed");
            false
        }
    }
}

/// Send a conversion in the background.
pub fn fire_and_forget(sink: Arc<dyn ConversionSink>, event: ConversionEvent) {
    tokio::spawn(async move {
        send_logged(sink.as_ref(), &event).await;
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_email_normalizes() {
        assert_eq!(hash_email("  User@Example.COM "), hash_email("user@example.com"));
        assert_eq!(
            hash_email("user@example.com"),
            "b4c9a289323b21a01c3e940f150eb9b8c542587f1abfd8f0e1cc1ffc5e475514"
        );
    }

    #[test]
    fn test_hash_phone_uses_digits() {
        assert_eq!(hash_phone("+1 (555) 010-0199"), hash_phone("15550100199"));
        assert_eq!(hash_phone("n/a"), None);
    }

    #[test]
    fn test_user_data_overrides_win() {
        let user = UserData::hashed(Some("a@b.co"), None).with_client("10.0.0.1", "curl/8");
        let mut overrides = Map::new();
        overrides.insert("client_ip_address".to_string(), Value::from("203.0.113.9"));
        let merged = user.merged(Some(&overrides));
        assert_eq!(merged["client_ip_address"], "203.0.113.9");
        assert_eq!(merged["client_user_agent"], "curl/8");
        assert!(merged["em"].is_array());
        assert!(!merged.contains_key("ph"));
    }

    #[test]
    fn test_purchase_data() {
        let data = purchase_data(
            Some(&Money::usd_cents(6900)),
            "USD",
            Some("Most Matches"),
            Some("ORDER-9"),
        );
        assert_eq!(data["value"], 69.0);
        assert_eq!(data["content_category"], "pricing_package");
        assert_eq!(data["order_id"], "ORDER-9");

        let empty = purchase_data(None, "EUR", None, None);
        assert_eq!(empty["value"], 0);
        assert!(!empty.contains_key("content_name"));
    }

    #[test]
    fn test_content_data_defaults() {
        let lead = content_data(&FunnelEvent::Lead, None).unwrap();
        assert_eq!(lead["content_name"], "CTA Click");

        let checkout = content_data(&FunnelEvent::InitiateCheckout, Some("VIP")).unwrap();
        assert_eq!(checkout["content_name"], "VIP");
        assert_eq!(checkout["content_category"], "checkout_initiation");

        let registration =
            content_data(&FunnelEvent::CompleteRegistration, Some("ignored")).unwrap();
        assert_eq!(registration["content_name"], "Onboarding Form");

        assert!(content_data(&FunnelEvent::Custom("x".to_string()), None).is_none());
    }

    #[test]
    fn test_event_serializes_api_shape() {
        let event = ConversionEvent::new(&FunnelEvent::Lead, Map::new());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "lead");
        assert_eq!(json["action_source"], "website");
        assert!(json.get("custom_data").is_none());
    }

    #[tokio::test]
    async fn test_missing_token_fails_without_calling_out() {
        let config = AnalyticsConfig {
            reddit_conversion_api_url: "http://127.0.0.1:9/unreachable".to_string(),
            ..AnalyticsConfig::default()
        };
        let sink = RedditConversions::new(&config).unwrap();
        let event = ConversionEvent::new(&FunnelEvent::Purchase, Map::new());
        assert!(matches!(
            sink.send(&event).await,
            Err(ConversionError::NotConfigured)
        ));
        assert!(!send_logged(&sink, &event).await);
    }
}
