//! Browser pixel events.
//!
//! Pages carry a list of [`PixelEvent`]s that `static/js/pixels.js` fires to
//! both the Meta (`fbq`) and Reddit (`rdt`) pixels once they load. The list is
//! embedded in the page as a JSON data island, so it must be escaped for a
//! `<script>` context with [`script_json`].

use match_magnet_core::{FunnelEvent, Money, PricingPackage};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::AnalyticsConfig;

/// One event fired to both pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelEvent {
    pub event: FunnelEvent,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl PixelEvent {
    #[must_use]
    pub fn new(event: FunnelEvent) -> Self {
        Self {
            event,
            params: Map::new(),
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    fn content(self, name: &str, category: &str) -> Self {
        self.param("content_name", name)
            .param("content_category", category)
    }

    fn money(self, amount: &Money) -> Self {
        let value = amount.amount.to_f64().map_or(Value::Null, Value::from);
        self.param("value", value)
            .param("currency", amount.currency.code())
    }

    /// A call-to-action click.
    #[must_use]
    pub fn lead(source: Option<&str>) -> Self {
        Self::new(FunnelEvent::Lead)
            .content(source.unwrap_or("CTA Button Click"), "lead_generation")
    }

    /// A package was picked on the landing page.
    #[must_use]
    pub fn add_to_cart(package: &PricingPackage) -> Self {
        Self::new(FunnelEvent::AddToCart)
            .content(package.name, "pricing_selection")
            .money(&package.price)
    }

    /// The onboarding form was opened.
    #[must_use]
    pub fn initiate_checkout(form: Option<&str>) -> Self {
        Self::new(FunnelEvent::InitiateCheckout)
            .content(form.unwrap_or("Onboarding Form"), "form_start")
    }

    /// The onboarding form was submitted.
    #[must_use]
    pub fn complete_registration() -> Self {
        Self::new(FunnelEvent::CompleteRegistration)
            .content("Onboarding Form Submission", "form_completion")
    }

    /// A payment was captured.
    #[must_use]
    pub fn purchase(amount: &Money, package_name: &str) -> Self {
        Self::new(FunnelEvent::Purchase)
            .content(package_name, "purchase")
            .money(amount)
    }

    /// A page worth reporting was viewed.
    #[must_use]
    pub fn view_content(name: &str, content_type: &str) -> Self {
        Self::new(FunnelEvent::ViewContent)
            .param("content_name", name)
            .param("content_type", content_type)
    }

    /// The captured transaction, reported as a custom event.
    #[must_use]
    pub fn transaction_successful(
        amount: &Money,
        package_name: &str,
        transaction_id: &str,
    ) -> Self {
        Self::new(FunnelEvent::Custom("TransactionSuccessful".to_string()))
            .content(package_name, "transaction_success")
            .money(amount)
            .param("transaction_id", transaction_id)
    }

    /// Shape handed to the browser: `{"name": "...", "params": {...}}`.
    ///
    /// Custom events go out as `CustomEvent` with their own name in
    /// `params.event_name`.
    #[must_use]
    pub fn to_client(&self) -> Value {
        let mut params = self.params.clone();
        if let FunnelEvent::Custom(name) = &self.event {
            params.insert("event_name".to_string(), Value::String(name.clone()));
        }
        serde_json::json!({
            "name": self.event.pixel_name(),
            "params": params,
        })
    }
}

/// Pixel ids rendered into every page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelSettings {
    pub meta_pixel_id: Option<String>,
    pub reddit_pixel_id: Option<String>,
}

impl PixelSettings {
    #[must_use]
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self {
            meta_pixel_id: config.meta_pixel_id.clone(),
            reddit_pixel_id: config.reddit_pixel_id.clone(),
        }
    }

    /// Whether any pixel should be loaded.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.meta_pixel_id.is_some() || self.reddit_pixel_id.is_some()
    }
}

/// Serialize events for a `<script type="application/json">` data island.
///
/// `<`, `>`, `&` and the JavaScript line separators are escaped so the
/// payload cannot close the script element.
#[must_use]
pub fn script_json(events: &[PixelEvent]) -> String {
    let client: Vec<Value> = events.iter().map(PixelEvent::to_client).collect();
    let raw = Value::Array(client).to_string();

    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_defaults() {
        let event = PixelEvent::lead(None);
        assert_eq!(event.params["content_name"], "CTA Button Click");
        assert_eq!(event.params["content_category"], "lead_generation");
    }

    #[test]
    fn test_purchase_carries_value() {
        let event = PixelEvent::purchase(&Money::usd_cents(6900), "Most Matches");
        let client = event.to_client();
        assert_eq!(client["name"], "Purchase");
        assert_eq!(client["params"]["value"], 69.0);
        assert_eq!(client["params"]["currency"], "USD");
        assert_eq!(client["params"]["content_name"], "Most Matches");
    }

    #[test]
    fn test_custom_event_named_in_params() {
        let event =
            PixelEvent::transaction_successful(&Money::usd_cents(100), "VIP", "ORDER-1");
        let client = event.to_client();
        assert_eq!(client["name"], "CustomEvent");
        assert_eq!(client["params"]["event_name"], "TransactionSuccessful");
        assert_eq!(client["params"]["transaction_id"], "ORDER-1");
    }

    #[test]
    fn test_script_json_escapes_markup() {
        let event = PixelEvent::lead(Some("</script><script>alert(1)</script>"));
        let json = script_json(&[event]);
        assert!(!json.contains('<'));
        assert!(!json.contains('>'));
        assert!(json.contains("\\u003c/script\\u003e"));

        // Escapes are valid JSON and decode back to the original text.
        let decoded: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            decoded[0]["params"]["content_name"],
            "</script><script>alert(1)</script>"
        );
    }

    #[test]
    fn test_round_trips_through_session_json() {
        let event = PixelEvent::initiate_checkout(None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "initiate_checkout");
        let back: PixelEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_settings_enabled() {
        assert!(!PixelSettings::default().is_enabled());
        let settings = PixelSettings {
            meta_pixel_id: Some("123".to_string()),
            reddit_pixel_id: None,
        };
        assert!(settings.is_enabled());
    }
}
