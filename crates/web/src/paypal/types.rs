//! `PayPal` Orders API request and response types.

use match_magnet_core::{CurrencyCode, Money};
use serde::{Deserialize, Serialize};

use super::PayPalError;

// =============================================================================
// Requests
// =============================================================================

/// What the service wants to charge for.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Package id, echoed back as the purchase unit reference.
    pub reference_id: String,
    /// Package name shown in the popup.
    pub description: String,
    pub amount: Money,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateOrderBody<'a> {
    pub intent: &'static str,
    pub purchase_units: [PurchaseUnitRequest<'a>; 1],
}

#[derive(Debug, Serialize)]
pub(super) struct PurchaseUnitRequest<'a> {
    pub reference_id: &'a str,
    pub description: &'a str,
    pub amount: Amount,
}

/// Money as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub currency_code: String,
    pub value: String,
}

impl Amount {
    /// Convert to [`Money`].
    ///
    /// # Errors
    ///
    /// Returns `PayPalError::Parse` for unknown currencies or malformed values.
    pub fn to_money(&self) -> Result<Money, PayPalError> {
        let currency: CurrencyCode = self
            .currency_code
            .parse()
            .map_err(|e| PayPalError::Parse(format!("{e}")))?;
        Money::parse_value(&self.value, currency).map_err(|e| PayPalError::Parse(e.to_string()))
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
}

/// A freshly created order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct CaptureResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub purchase_units: Vec<CapturedUnit>,
    #[serde(default)]
    pub payer: Option<Payer>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CapturedUnit {
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub payments: Option<UnitPayments>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UnitPayments {
    #[serde(default)]
    pub captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Capture {
    pub id: String,
    pub status: String,
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub(super) struct Payer {
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub name: Option<PayerName>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PayerName {
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
}

/// Result of a completed capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPayment {
    pub order_id: String,
    pub capture_id: String,
    pub amount: Money,
    pub reference_id: Option<String>,
    pub payer_email: Option<String>,
    pub payer_name: Option<String>,
}

impl CaptureResponse {
    /// Flatten the nested response into a [`CapturedPayment`].
    ///
    /// # Errors
    ///
    /// Returns `CaptureIncomplete` unless the order and its first capture are
    /// `COMPLETED`.
    pub fn into_payment(self) -> Result<CapturedPayment, PayPalError> {
        if self.status != "COMPLETED" {
            return Err(PayPalError::CaptureIncomplete(format!(
                "order status {}",
                self.status
            )));
        }

        let unit = self
            .purchase_units
            .into_iter()
            .next()
            .ok_or_else(|| PayPalError::Parse("capture has no purchase units".to_string()))?;
        let capture = unit
            .payments
            .and_then(|p| p.captures.into_iter().next())
            .ok_or_else(|| PayPalError::Parse("capture has no captures".to_string()))?;
        if capture.status != "COMPLETED" {
            return Err(PayPalError::CaptureIncomplete(format!(
                "capture status {}",
                capture.status
            )));
        }

        let payer_name = self.payer.as_ref().and_then(|p| p.name.as_ref()).map(|n| {
            [n.given_name.as_deref(), n.surname.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
        });

        Ok(CapturedPayment {
            order_id: self.id,
            capture_id: capture.id,
            amount: capture.amount.to_money()?,
            reference_id: unit.reference_id,
            payer_email: self.payer.and_then(|p| p.email_address),
            payer_name: payer_name.filter(|n| !n.is_empty()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CAPTURED: &str = r#"{
        "id": "5O190127TN364715T",
        "status": "COMPLETED",
        "payer": {
            "name": {"given_name": "Jane", "surname": "Doe"},
            "email_address": "jane@example.com"
        },
        "purchase_units": [{
            "reference_id": "most-matches",
            "payments": {"captures": [{
                "id": "3C679366HH908993F",
                "status": "COMPLETED",
                "amount": {"currency_code": "USD", "value": "69.00"}
            }]}
        }]
    }"#;

    #[test]
    fn test_capture_response_flattens() {
        let response: CaptureResponse = serde_json::from_str(CAPTURED).unwrap();
        let payment = response.into_payment().unwrap();
        assert_eq!(payment.order_id, "5O190127TN364715T");
        assert_eq!(payment.capture_id, "3C679366HH908993F");
        assert_eq!(payment.amount, Money::usd_cents(6900));
        assert_eq!(payment.reference_id.as_deref(), Some("most-matches"));
        assert_eq!(payment.payer_email.as_deref(), Some("jane@example.com"));
        assert_eq!(payment.payer_name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_capture_pending_is_incomplete() {
        let mut json: serde_json::Value = serde_json::from_str(CAPTURED).unwrap();
        json["purchase_units"][0]["payments"]["captures"][0]["status"] = "PENDING".into();
        let response: CaptureResponse = serde_json::from_value(json).unwrap();
        assert!(matches!(
            response.into_payment(),
            Err(PayPalError::CaptureIncomplete(_))
        ));
    }

    #[test]
    fn test_order_not_completed() {
        let response = CaptureResponse {
            id: "X".to_string(),
            status: "PAYER_ACTION_REQUIRED".to_string(),
            purchase_units: vec![],
            payer: None,
        };
        assert!(matches!(
            response.into_payment(),
            Err(PayPalError::CaptureIncomplete(_))
        ));
    }

    #[test]
    fn test_create_body_shape() {
        let body = CreateOrderBody {
            intent: "CAPTURE",
            purchase_units: [PurchaseUnitRequest {
                reference_id: "vip",
                description: "VIP",
                amount: super::super::wire_amount(&Money::usd_cents(9900)),
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["intent"], "CAPTURE");
        assert_eq!(json["purchase_units"][0]["reference_id"], "vip");
        assert_eq!(json["purchase_units"][0]["amount"]["value"], "99.00");
        assert_eq!(json["purchase_units"][0]["amount"]["currency_code"], "USD");
    }
}
