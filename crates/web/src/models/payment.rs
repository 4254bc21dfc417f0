//! Payment records.

use chrono::{DateTime, Utc};
use match_magnet_core::{CurrencyCode, Email, PaymentId, PaymentStatus, PricingPackage};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ValidationError;
use crate::paypal::CapturedPayment;

/// A row of the `payments` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: PaymentId,
    pub order_id: String,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub package_id: String,
    pub package_name: String,
    pub customer_email: String,
    pub customer_name: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Record for a captured order.
    ///
    /// The payer details reported by the provider are used when the visitor
    /// did not give their own.
    #[must_use]
    pub fn from_capture(
        payment_id: PaymentId,
        capture: &CapturedPayment,
        package: &PricingPackage,
        email: Option<&Email>,
        name: Option<&str>,
    ) -> Self {
        let customer_email = email
            .map(|e| e.as_str().to_string())
            .or_else(|| capture.payer_email.clone())
            .unwrap_or_default();
        let customer_name = name
            .map(str::to_string)
            .or_else(|| capture.payer_name.clone())
            .unwrap_or_default();

        Self {
            payment_id,
            order_id: capture.order_id.clone(),
            amount: capture.amount.amount,
            currency: capture.amount.currency,
            package_id: package.id.to_string(),
            package_name: package.name.to_string(),
            customer_email,
            customer_name,
            status: PaymentStatus::Completed,
            created_at: Utc::now(),
        }
    }
}

/// Body of `POST /api/create-payment`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPayment {
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub package_id: Option<String>,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub status: Option<PaymentStatus>,
}

impl NewPayment {
    /// Check the body and build the row to insert.
    ///
    /// A `payment_id` is minted unless the caller supplies one.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for missing or malformed fields.
    pub fn validate(self) -> Result<PaymentRecord, ValidationError> {
        let payment_id = match non_blank(self.payment_id) {
            Some(raw) => raw.parse().map_err(|_| ValidationError::Invalid {
                field: "payment_id",
                reason: "must be a UUID".to_string(),
            })?,
            None => PaymentId::generate(),
        };
        let order_id = non_blank(self.order_id).ok_or(ValidationError::MissingField("order_id"))?;
        let amount = self.amount.ok_or(ValidationError::MissingField("amount"))?;
        if amount <= Decimal::ZERO {
            return Err(ValidationError::Invalid {
                field: "amount",
                reason: "must be positive".to_string(),
            });
        }
        let currency = match non_blank(self.currency) {
            Some(code) => code.parse().map_err(|e: match_magnet_core::MoneyError| {
                ValidationError::Invalid {
                    field: "currency",
                    reason: e.to_string(),
                }
            })?,
            None => CurrencyCode::USD,
        };
        let package_id =
            non_blank(self.package_id).ok_or(ValidationError::MissingField("package_id"))?;
        let package_name = non_blank(self.package_name)
            .or_else(|| PricingPackage::find(&package_id).map(|p| p.name.to_string()))
            .unwrap_or_default();
        let customer_email = match non_blank(self.customer_email) {
            Some(raw) => Email::parse(&raw)
                .map_err(ValidationError::InvalidEmail)?
                .into(),
            None => String::new(),
        };

        Ok(PaymentRecord {
            payment_id,
            order_id,
            amount,
            currency,
            package_id,
            package_name,
            customer_email,
            customer_name: non_blank(self.customer_name).unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            created_at: Utc::now(),
        })
    }
}

/// Trimmed value, or `None` when absent or blank.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use match_magnet_core::Money;

    fn body() -> NewPayment {
        serde_json::from_value(serde_json::json!({
            "order_id": "5O190127TN364715T",
            "amount": 69.0,
            "currency": "USD",
            "package_id": "most-matches",
            "customer_email": " jane@example.com ",
            "customer_name": "Jane Doe"
        }))
        .unwrap()
    }

    #[test]
    fn test_validate_fills_defaults() {
        let record = body().validate().unwrap();
        assert_eq!(record.package_name, "Most Matches");
        assert_eq!(record.customer_email, "jane@example.com");
        assert_eq!(record.status, PaymentStatus::Completed);
        assert_eq!(record.amount, Decimal::new(69, 0));
    }

    #[test]
    fn test_validate_accepts_string_amount() {
        let payment: NewPayment = serde_json::from_value(serde_json::json!({
            "order_id": "test_deployed_1700000000000",
            "amount": "1.00",
            "package_id": "test_package",
            "package_name": "Deployed Test Package"
        }))
        .unwrap();
        let record = payment.validate().unwrap();
        assert_eq!(record.amount, Decimal::new(100, 2));
        assert_eq!(record.currency, CurrencyCode::USD);
        assert_eq!(record.package_name, "Deployed Test Package");
    }

    #[test]
    fn test_validate_rejects_missing_order() {
        let mut payment = body();
        payment.order_id = Some("  ".to_string());
        assert_eq!(
            payment.validate().unwrap_err().to_string(),
            "Missing required field: order_id"
        );
    }

    #[test]
    fn test_validate_rejects_bad_payment_id() {
        let mut payment = body();
        payment.payment_id = Some("local-1700000000".to_string());
        assert!(matches!(
            payment.validate(),
            Err(ValidationError::Invalid {
                field: "payment_id",
                ..
            })
        ));
    }

    #[test]
    fn test_from_capture_prefers_visitor_details() {
        let capture = CapturedPayment {
            order_id: "ORDER-1".to_string(),
            capture_id: "CAPTURE-1".to_string(),
            amount: Money::usd_cents(6900),
            reference_id: Some("most-matches".to_string()),
            payer_email: Some("payer@example.com".to_string()),
            payer_name: Some("Pay Er".to_string()),
        };
        let package = PricingPackage::default_package();
        let email = Email::parse("visitor@example.com").unwrap();

        let record = PaymentRecord::from_capture(
            PaymentId::generate(),
            &capture,
            &package,
            Some(&email),
            None,
        );
        assert_eq!(record.customer_email, "visitor@example.com");
        assert_eq!(record.customer_name, "Pay Er");
        assert_eq!(record.order_id, "ORDER-1");
        assert_eq!(record.amount, Decimal::new(6900, 2));
    }
}
