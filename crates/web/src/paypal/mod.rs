//! Payment provider (`PayPal`) adapter.
//!
//! # Flow
//!
//! 1. The checkout page asks the service to create an order for the selected
//!    package ([`PaymentGateway::create_order`]).
//! 2. The visitor approves the order in the `PayPal` popup.
//! 3. The service captures the order ([`PaymentGateway::capture_order`]) and
//!    only then persists anything.
//!
//! The REST client authenticates with client credentials; access tokens are
//! cached until shortly before they expire.

mod auth;
pub mod checkout;
mod client;
pub mod types;

use async_trait::async_trait;
use match_magnet_core::Money;
use thiserror::Error;

pub use checkout::{AmountPolicy, CheckoutError, CheckoutState};
pub use client::PayPalClient;
pub use types::{CapturedPayment, CreatedOrder, OrderRequest};

/// Errors that can occur when interacting with the `PayPal` API.
#[derive(Debug, Error)]
pub enum PayPalError {
    /// Client credentials are missing.
    #[error("payment provider is not configured")]
    NotConfigured,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Obtaining an access token failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The capture call succeeded but the payment did not complete.
    #[error("Capture not completed: {0}")]
    CaptureIncomplete(String),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Order creation and capture.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Client ID handed to the browser SDK, if the gateway is live.
    fn client_id(&self) -> Option<&str>;

    /// Create an order for the given amount.
    async fn create_order(&self, request: &OrderRequest) -> Result<CreatedOrder, PayPalError>;

    /// Capture an approved order.
    async fn capture_order(&self, order_id: &str) -> Result<CapturedPayment, PayPalError>;
}

/// Gateway used when no credentials are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    fn client_id(&self) -> Option<&str> {
        None
    }

    async fn create_order(&self, _request: &OrderRequest) -> Result<CreatedOrder, PayPalError> {
        Err(PayPalError::NotConfigured)
    }

    async fn capture_order(&self, _order_id: &str) -> Result<CapturedPayment, PayPalError> {
        Err(PayPalError::NotConfigured)
    }
}

/// Build the gateway for the given configuration.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn from_config(
    config: &crate::config::PayPalConfig,
) -> Result<std::sync::Arc<dyn PaymentGateway>, PayPalError> {
    match &config.credentials {
        Some(credentials) => Ok(std::sync::Arc::new(PayPalClient::new(
            &config.api_base,
            credentials,
        )?)),
        None => {
            tracing::warn!("PAYPAL_CLIENT_ID not set, checkout is disabled");
            Ok(std::sync::Arc::new(UnconfiguredGateway))
        }
    }
}

/// Amount formatted the way the order API expects.
#[must_use]
pub fn wire_amount(amount: &Money) -> types::Amount {
    types::Amount {
        currency_code: amount.currency.code().to_string(),
        value: amount.value_string(),
    }
}
