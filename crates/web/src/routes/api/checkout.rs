//! Checkout API used by the payment button.
//!
//! The browser SDK calls `create_order` when the button is clicked and
//! `capture_order` once the visitor approves in the popup. The checkout
//! state in the session decides which calls are allowed.

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use match_magnet_core::{FunnelEvent, PaymentId};
use serde_json::{Value, json};
use tower_sessions::Session;
use tracing::{error, instrument, warn};

use crate::analytics::conversions::purchase_data;
use crate::analytics::{ConversionEvent, PixelEvent, UserData, fire_and_forget};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::session::{flash_pixels, keys};
use crate::models::{CompletionSummary, OnboardingDraft};
use crate::paypal::CheckoutState;
use crate::routes::{checkout_state, client_ip, selected_package, user_agent};
use crate::state::AppState;

async fn require_draft(session: &Session) -> Result<OnboardingDraft> {
    session
        .get::<OnboardingDraft>(keys::ONBOARDING_DRAFT)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest("Complete the onboarding form before checkout".to_string())
        })
}

async fn save_state(session: &Session, state: &CheckoutState) -> Result<()> {
    session.insert(keys::CHECKOUT, state).await?;
    Ok(())
}

async fn mark_captured(
    session: &Session,
    approved: CheckoutState,
    payment_id: PaymentId,
) -> Result<()> {
    save_state(session, &approved.captured(payment_id)?).await
}

/// Clear the draft and leave the summary and purchase pixels for the
/// confirmation page.
async fn hand_off_to_confirmation(
    session: &Session,
    summary: &CompletionSummary,
    pixels: [PixelEvent; 2],
) -> Result<()> {
    session
        .remove::<OnboardingDraft>(keys::ONBOARDING_DRAFT)
        .await?;
    session.insert(keys::LAST_COMPLETION, summary).await?;
    flash_pixels(session, pixels).await?;
    Ok(())
}

/// Create a provider order for the selected package.
///
/// # Errors
///
/// 400 without an onboarding draft, 409 once the checkout is captured or
/// approved, 502 when the provider refuses.
#[instrument(skip(state, session))]
pub async fn create_order(State(state): State<AppState>, session: Session) -> Result<Json<Value>> {
    require_draft(&session).await?;
    let checkout = checkout_state(&session).await?;
    checkout.check_can_create_order()?;

    let package = selected_package(&session).await;
    let (order, amount) = state.funnel().create_order(&package).await?;
    save_state(&session, &checkout.order_created(order.id.clone())?).await?;

    add_breadcrumb("checkout", "Order created", Some(&[("order_id", &order.id)]));

    Ok(Json(json!({
        "success": true,
        "orderId": order.id,
        "amount": amount.value_string(),
        "currency": amount.currency.code(),
    })))
}

/// Capture an approved order and record the submission.
///
/// On success the draft is cleared, the `Purchase` pixels are flashed to the
/// confirmation page and a purchase conversion is sent.
///
/// # Errors
///
/// 400 without an onboarding draft, 409 when the order is not the one
/// awaiting approval, 502 when the capture fails. A failed capture writes
/// nothing and leaves the checkout `failed` so the visitor can retry.
///
/// Once the provider reports the capture the checkout is marked `captured`
/// before anything is written, and the response is a success even when the
/// records had to be parked in the outbox.
#[instrument(skip(state, session, headers))]
pub async fn capture_order(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Json<Value>> {
    let draft = require_draft(&session).await?;
    let approved = checkout_state(&session).await?.approve(&order_id)?;
    save_state(&session, &approved).await?;

    let package = selected_package(&session).await;
    let capture = match state.funnel().capture(&order_id).await {
        Ok(capture) => capture,
        Err(e) => {
            let err = AppError::from(e);
            save_state(&session, &approved.failed(err.public_message())?).await?;
            return Err(err);
        }
    };

    // Money has been taken: from here on nothing may fail the request.
    let payment_id = PaymentId::generate();
    let amount = capture.amount;
    if let Err(e) = mark_captured(&session, approved, payment_id).await {
        error!(
            order_id = %order_id,
            payment_id = %payment_id,
            error = %e,
            "Failed to save captured checkout"
        );
    }

    let completion = state
        .funnel()
        .record_capture(payment_id, capture, &package, &draft)
        .await;

    let summary = CompletionSummary {
        payment_id,
        package_name: package.name.to_string(),
        amount,
        queued: completion.queued,
        failed_uploads: completion.uploads.failed.clone(),
    };
    let pixels = [
        PixelEvent::purchase(&amount, package.name),
        PixelEvent::transaction_successful(&amount, package.name, &order_id),
    ];
    if let Err(e) = hand_off_to_confirmation(&session, &summary, pixels).await {
        warn!(payment_id = %payment_id, error = %e, "Failed to prepare confirmation page");
    }

    add_breadcrumb(
        "checkout",
        "Order captured",
        Some(&[("order_id", &order_id), ("payment_id", &payment_id.to_string())]),
    );

    let user_data = UserData::hashed(
        Some(draft.profile.email.as_str()),
        Some(draft.profile.phone.as_str()),
    )
    .with_client(client_ip(&headers), user_agent(&headers));
    let event = ConversionEvent::new(&FunnelEvent::Purchase, user_data.merged(None))
        .with_custom_data(purchase_data(
            Some(&amount),
            amount.currency.code(),
            Some(package.name),
            Some(&order_id),
        ));
    fire_and_forget(state.conversions().clone(), event);

    Ok(Json(json!({
        "success": true,
        "paymentId": payment_id,
        "queued": completion.queued,
        "failedUploads": completion.uploads.failed,
        "redirect": "/onboarding/success",
    })))
}

/// The visitor closed the payment popup.
///
/// # Errors
///
/// 409 unless `order_id` is the pending order.
#[instrument(skip(session))]
pub async fn cancel_order(session: Session, Path(order_id): Path<String>) -> Result<Json<Value>> {
    let cancelled = checkout_state(&session).await?.cancelled(&order_id)?;
    save_state(&session, &cancelled).await?;
    tracing::info!(order_id = %order_id, "Checkout cancelled");

    Ok(Json(json!({ "success": true })))
}
