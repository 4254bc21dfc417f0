//! Direct payment record insertion.

use axum::{Json, extract::State};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::error::{ApiJson, AppError, Result};
use crate::hosted_store::PAYMENTS_TABLE;
use crate::models::NewPayment;
use crate::state::AppState;

/// Insert a payment record and return it as stored, flattened next to
/// `success`.
///
/// # Errors
///
/// 400 for an invalid body, the store's failure otherwise. Nothing is
/// queued.
#[instrument(skip_all)]
pub async fn create_payment(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewPayment>,
) -> Result<Json<Value>> {
    let record = body.validate()?;
    let row = serde_json::to_value(&record).map_err(|e| AppError::Internal(e.to_string()))?;
    let stored = state.store().insert(PAYMENTS_TABLE, row).await?;

    tracing::info!(
        payment_id = %record.payment_id,
        order_id = %record.order_id,
        "Payment recorded"
    );

    let mut response = Map::new();
    response.insert("success".to_string(), Value::Bool(true));
    if let Value::Object(fields) = stored {
        response.extend(fields);
    }
    Ok(Json(Value::Object(response)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::{json as request, router, send};
    use crate::hosted_store::{PAYMENTS_TABLE, StoreError};
    use crate::testing::TestApp;

    fn body() -> serde_json::Value {
        json!({
            "order_id": "5O190127TN364715T",
            "amount": "69.00",
            "currency": "USD",
            "package_id": "most-matches",
            "customer_email": "jane@example.com",
            "customer_name": "Jane Doe",
        })
    }

    #[tokio::test]
    async fn test_create_payment_returns_row() {
        let app = TestApp::new();
        let (status, _, json) =
            send(&router(&app), request("POST", "/api/create-payment", &body(), None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["order_id"], "5O190127TN364715T");
        assert_eq!(json["package_name"], "Most Matches");
        assert_eq!(json["status"], "completed");
        assert!(json["payment_id"].is_string());
        assert_eq!(app.store.rows(PAYMENTS_TABLE).len(), 1);
    }

    #[tokio::test]
    async fn test_missing_order_rejected() {
        let app = TestApp::new();
        let mut payload = body();
        payload["order_id"] = json!("");
        let (status, _, json) =
            send(&router(&app), request("POST", "/api/create-payment", &payload, None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Missing required field: order_id");
        assert_eq!(app.store.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_outage_is_not_queued() {
        let app = TestApp::new();
        app.store.fail_inserts_with(|| StoreError::Api {
            status: 503,
            message: "upstream unavailable".to_string(),
        });
        let (status, _, json) =
            send(&router(&app), request("POST", "/api/create-payment", &body(), None)).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Hosted store unavailable");
        assert_eq!(app.outbox.len(), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_uses_envelope() {
        let app = TestApp::new();
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/create-payment")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let (status, _, json) = send(&router(&app), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
    }
}
