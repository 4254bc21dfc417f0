//! Onboarding record insertion and photo re-upload.

use axum::{
    Json,
    extract::{DefaultBodyLimit, Multipart, Path, State},
};
use match_magnet_core::PaymentId;
use serde_json::{Value, json};
use tracing::instrument;

use crate::error::{ApiJson, AppError, Result};
use crate::hosted_store::ONBOARDING_TABLE;
use crate::models::OnboardingSubmission;
use crate::routes::onboarding::read_multipart;
use crate::services::staging::{MAX_FILE_BYTES, MAX_FILES_PER_KIND};
use crate::state::AppState;

/// Body limit for photo uploads: a full batch of both kinds plus form fields.
#[must_use]
pub fn upload_body_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(2 * MAX_FILES_PER_KIND * MAX_FILE_BYTES + 1024 * 1024)
}

/// Insert an onboarding record.
///
/// Every call creates a new row, duplicates included.
///
/// # Errors
///
/// 400 naming the first missing field, the store's failure otherwise.
#[instrument(skip_all)]
pub async fn store(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OnboardingSubmission>,
) -> Result<Json<Value>> {
    let record = body.validate()?;
    let row = serde_json::to_value(&record).map_err(|e| AppError::Internal(e.to_string()))?;
    let stored = state.store().insert(ONBOARDING_TABLE, row).await?;

    tracing::info!(payment_id = %record.payment_id, "Onboarding recorded");

    Ok(Json(json!({
        "success": true,
        "data": stored,
        "message": "Onboarding data stored successfully",
    })))
}

/// Upload photos for an existing payment, typically the ones that failed
/// during checkout.
///
/// # Errors
///
/// 400 for a malformed payment id, an empty batch or files breaking the
/// upload limits.
#[instrument(skip(state, multipart))]
pub async fn upload_images(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let payment_id: PaymentId = payment_id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid payment id".to_string()))?;
    let form = read_multipart(multipart).await?;
    if form.files.is_empty() {
        return Err(AppError::BadRequest("No files uploaded".to_string()));
    }

    let report = state.funnel().reupload_images(payment_id, form.files).await?;

    Ok(Json(json!({
        "success": report.failed.is_empty(),
        "uploaded": report.stored.len(),
        "failed": report.failed,
        "queued": report.queued,
    })))
}
