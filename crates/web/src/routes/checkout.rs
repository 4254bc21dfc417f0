//! Payment page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::instrument;

use super::home::PackageView;
use super::{PageContext, checkout_state, selected_package};
use crate::error::Result;
use crate::filters;
use crate::middleware::CspNonce;
use crate::models::OnboardingDraft;
use crate::models::session::{keys, take_pixels};
use crate::paypal::CheckoutState;
use crate::state::AppState;

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout.html")]
pub struct CheckoutTemplate {
    pub page: PageContext,
    pub package: PackageView,
    pub amount: String,
    pub currency: &'static str,
    pub customer_name: String,
    /// Browser SDK client id; `None` renders the "payments unavailable" notice.
    pub client_id: Option<String>,
    /// Reason the previous attempt failed, if it did.
    pub last_error: Option<String>,
}

/// Display the payment page.
///
/// Visitors without an onboarding draft are sent back to the form; a
/// checkout that was already captured goes to the confirmation.
#[instrument(skip(state, session, nonce))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    nonce: CspNonce,
) -> Result<Response> {
    let checkout = checkout_state(&session).await?;
    if matches!(checkout, CheckoutState::Captured { .. }) {
        return Ok(Redirect::to("/onboarding/success").into_response());
    }

    let Some(draft) = session
        .get::<OnboardingDraft>(keys::ONBOARDING_DRAFT)
        .await?
    else {
        return Ok(Redirect::to("/onboarding").into_response());
    };

    let package = selected_package(&session).await;
    let amount = state.funnel().amounts().amount_for(&package);
    let events = take_pixels(&session).await;
    let last_error = match checkout {
        CheckoutState::Failed { reason, .. } => Some(reason),
        _ => None,
    };

    Ok(CheckoutTemplate {
        page: PageContext::new(&state, &nonce, &events),
        package: PackageView::new(&package, package.id),
        amount: amount.display(),
        currency: amount.currency.code(),
        customer_name: draft.profile.name,
        client_id: state.funnel().payment_client_id().map(str::to_string),
        last_error,
    }
    .into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;

    use super::super::test_support::{get, onboarded_session, post_empty, router};
    use crate::testing::TestApp;

    #[tokio::test]
    async fn test_shows_package_and_customer() {
        let app = TestApp::new();
        let router = router(&app);
        let cookie = onboarded_session(&router).await;

        let page = get(&router, "/checkout", Some(&cookie)).await;

        assert_eq!(page.status, StatusCode::OK);
        assert!(page.body.contains("Most Matches"));
        assert!(page.body.contains("$69"));
        assert!(page.body.contains("For Sam Lee."));
    }

    #[tokio::test]
    async fn test_failed_capture_reason_is_shown() {
        let app = TestApp::new();
        let router = router(&app);
        let cookie = onboarded_session(&router).await;
        app.gateway.fail_captures();

        post_empty(&router, "/api/checkout/orders", &cookie).await;
        let capture = post_empty(&router, "/api/checkout/orders/ORDER-1/capture", &cookie).await;
        assert_eq!(capture.status, StatusCode::BAD_GATEWAY);

        let page = get(&router, "/checkout", Some(&cookie)).await;
        assert_eq!(page.status, StatusCode::OK);
        assert!(page.body.contains("Payment provider error"));
    }
}
