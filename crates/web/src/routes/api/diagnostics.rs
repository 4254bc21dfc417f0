//! Hosted store connectivity check.
//!
//! Probes the `payments` table, writes a throwaway payment and deletes it
//! again. Failures report which step broke without exposing the store's
//! error text.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use tracing::instrument;

use crate::error::ErrorBody;
use crate::services::diagnostics::store_round_trip;
use crate::state::AppState;

/// Run the connectivity check.
#[instrument(skip_all)]
pub async fn test_supabase(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match store_round_trip(state.store().as_ref()).await {
        Ok(payment_id) => {
            tracing::info!(payment_id = %payment_id, "Hosted store diagnostic passed");
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "Hosted store connection and insert/delete round trip succeeded",
                    "testPaymentId": payment_id,
                })),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Hosted store diagnostic failed");
            let body = ErrorBody {
                success: false,
                error: e.step().to_string(),
            };
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::to_value(body).unwrap_or_default()),
            )
        }
    }
}
