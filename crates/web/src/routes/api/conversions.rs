//! Server-side conversion relay for browser code.
//!
//! The response is always `200 {"success", "message"}`: a conversion that
//! could not be delivered must not break the page that reported it.

use axum::{Json, extract::State, http::HeaderMap};
use match_magnet_core::{CurrencyCode, FunnelEvent, Money};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::instrument;

use crate::analytics::conversions::{content_data, overlay, purchase_data};
use crate::analytics::{ConversionEvent, UserData, send_logged};
use crate::error::{ApiJson, Result};
use crate::models::ValidationError;
use crate::routes::{client_ip, user_agent};
use crate::state::AppState;

const DEFAULT_CURRENCY: &str = "USD";

/// Body of `POST /api/reddit-conversion`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RelayRequest {
    pub event_type: Option<String>,
    /// Fields laid over the computed user data.
    pub user_data: Option<Map<String, Value>>,
    /// Fields laid over the event's default custom data.
    pub custom_data: Option<Map<String, Value>>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Purchase value, as a number or a decimal string.
    pub value: Option<Value>,
    pub currency: Option<String>,
    pub package_name: Option<String>,
    pub transaction_id: Option<String>,
}

impl RelayRequest {
    fn currency(&self) -> &str {
        self.currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
    }

    /// The purchase value, when it is a positive amount.
    fn amount(&self) -> Option<Money> {
        let raw = match self.value.as_ref()? {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => return None,
        };
        let currency = self.currency().parse().unwrap_or(CurrencyCode::USD);
        Money::parse_value(&raw, currency).ok()
    }

    /// Custom data for `event`: defaults for known events, with the
    /// caller's fields on top.
    fn custom_data(&self, event: &FunnelEvent) -> Option<Map<String, Value>> {
        let package_name = self.package_name.as_deref();
        let base = match event {
            FunnelEvent::Purchase => Some(purchase_data(
                self.amount().as_ref(),
                self.currency(),
                package_name,
                self.transaction_id.as_deref(),
            )),
            _ => content_data(event, package_name),
        };
        match base {
            Some(base) => Some(overlay(base, self.custom_data.as_ref())),
            None => self.custom_data.clone(),
        }
    }
}

/// Relay a browser-reported funnel event to the conversions API.
///
/// # Errors
///
/// 400 when the body is not JSON or has no `event_type`. Delivery failures
/// are reported in the body, never as errors.
#[instrument(skip_all)]
pub async fn relay(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<RelayRequest>,
) -> Result<Json<Value>> {
    let event_type = body
        .event_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ValidationError::MissingField("event_type"))?;
    let event = FunnelEvent::parse(event_type);

    let user_data = UserData::hashed(body.email.as_deref(), body.phone.as_deref())
        .with_client(client_ip(&headers), user_agent(&headers))
        .merged(body.user_data.as_ref());
    let mut conversion = ConversionEvent::new(&event, user_data);
    if let Some(custom) = body.custom_data(&event) {
        conversion = conversion.with_custom_data(custom);
    }

    let success = send_logged(state.conversions().as_ref(), &conversion).await;
    let message = if success {
        "Reddit conversion tracked successfully"
    } else {
        "Failed to track Reddit conversion"
    };

    Ok(Json(json!({ "success": success, "message": message })))
}
