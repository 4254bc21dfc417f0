//! Session-related types.
//!
//! The visitor's funnel progress lives in the session instead of browser
//! storage: the chosen package, the onboarding draft waiting for payment, the
//! checkout state and pixel events flashed to the next page.

use match_magnet_core::{DraftId, Money, PaymentId};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use super::onboarding::OnboardingProfile;
use crate::analytics::PixelEvent;
use crate::services::staging::StagedFile;

/// Onboarding answers held until the order is captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingDraft {
    pub draft_id: DraftId,
    pub profile: OnboardingProfile,
    #[serde(default)]
    pub files: Vec<StagedFile>,
}

/// What the success page shows after a completed checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub payment_id: PaymentId,
    pub package_name: String,
    pub amount: Money,
    /// Some records were deferred to the outbox.
    pub queued: bool,
    /// Files that could not be uploaded.
    #[serde(default)]
    pub failed_uploads: Vec<String>,
}

/// Session keys for funnel data.
pub mod keys {
    /// Id of the selected pricing package.
    pub const SELECTED_PACKAGE: &str = "selected_package";

    /// [`super::OnboardingDraft`] waiting for payment.
    pub const ONBOARDING_DRAFT: &str = "onboarding_draft";

    /// [`crate::paypal::CheckoutState`].
    pub const CHECKOUT: &str = "checkout";

    /// Pixel events to fire on the next rendered page.
    pub const PIXEL_EVENTS: &str = "pixel_events";

    /// [`super::CompletionSummary`] of the last completed checkout.
    pub const LAST_COMPLETION: &str = "last_completion";
}

/// Queue pixel events for the next page the visitor sees.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn flash_pixels(
    session: &Session,
    events: impl IntoIterator<Item = PixelEvent>,
) -> Result<(), tower_sessions::session::Error> {
    let mut pending: Vec<PixelEvent> = session
        .get(keys::PIXEL_EVENTS)
        .await?
        .unwrap_or_default();
    pending.extend(events);
    session.insert(keys::PIXEL_EVENTS, pending).await
}

/// Take the flashed pixel events. Store failures yield no events.
pub async fn take_pixels(session: &Session) -> Vec<PixelEvent> {
    match session.remove::<Vec<PixelEvent>>(keys::PIXEL_EVENTS).await {
        Ok(events) => events.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read flashed pixel events");
            Vec::new()
        }
    }
}
