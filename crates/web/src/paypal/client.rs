//! `PayPal` Orders v2 REST client.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{info, instrument};

use super::auth::TokenProvider;
use super::types::{
    CaptureResponse, CapturedPayment, CreateOrderBody, CreatedOrder, OrderRequest,
    PurchaseUnitRequest,
};
use super::{PayPalError, PaymentGateway, wire_amount};
use crate::config::PayPalCredentials;

/// `PayPal` REST API client.
#[derive(Clone)]
pub struct PayPalClient {
    client: reqwest::Client,
    api_base: String,
    client_id: String,
    tokens: TokenProvider,
}

impl PayPalClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(api_base: &str, credentials: &PayPalCredentials) -> Result<Self, PayPalError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        let api_base = api_base.trim_end_matches('/').to_string();
        let tokens = TokenProvider::new(
            client.clone(),
            &api_base,
            credentials.client_id.clone(),
            credentials.secret_key.clone(),
        );

        Ok(Self {
            client,
            api_base,
            client_id: credentials.client_id.clone(),
            tokens,
        })
    }

    /// POST a JSON body with bearer auth and an idempotency key.
    async fn post<B, R>(&self, path: &str, body: Option<&B>) -> Result<R, PayPalError>
    where
        B: serde::Serialize + Sync,
        R: DeserializeOwned,
    {
        let token = self.tokens.token().await?;
        let mut request = self
            .client
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(token.expose_secret())
            .header("PayPal-Request-Id", uuid::Uuid::new_v4().to_string());
        request = match body {
            Some(body) => request.json(body),
            None => request.header(reqwest::header::CONTENT_TYPE, "application/json"),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PayPalError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PayPalError::Parse(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for PayPalClient {
    fn client_id(&self) -> Option<&str> {
        Some(&self.client_id)
    }

    #[instrument(skip(self), fields(package = %request.reference_id, amount = %request.amount))]
    async fn create_order(&self, request: &OrderRequest) -> Result<CreatedOrder, PayPalError> {
        let body = CreateOrderBody {
            intent: "CAPTURE",
            purchase_units: [PurchaseUnitRequest {
                reference_id: &request.reference_id,
                description: &request.description,
                amount: wire_amount(&request.amount),
            }],
        };

        let order: CreatedOrder = self.post("/v2/checkout/orders", Some(&body)).await?;
        info!(order_id = %order.id, status = %order.status, "PayPal order created");
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn capture_order(&self, order_id: &str) -> Result<CapturedPayment, PayPalError> {
        let path = format!(
            "/v2/checkout/orders/{}/capture",
            urlencoding::encode(order_id)
        );
        let response: CaptureResponse = self.post::<(), _>(&path, None).await?;
        let payment = response.into_payment()?;
        info!(capture_id = %payment.capture_id, amount = %payment.amount, "PayPal order captured");
        Ok(payment)
    }
}
