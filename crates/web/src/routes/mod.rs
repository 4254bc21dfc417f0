//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Landing page with packages
//! POST /checkout/select        - Pick a package
//! GET  /auth                   - Hosted sign-in/up widget
//! GET  /onboarding             - Onboarding form
//! POST /onboarding             - Validate, stage photos, keep draft in session
//! GET  /checkout               - Payment page
//! GET  /onboarding/success     - Confirmation
//! GET  /terms, /privacy        - Markdown content pages
//! GET  /health, /health/ready  - Liveness / readiness
//!
//! # API (JSON envelope, rate limited)
//! POST /api/checkout/orders                 - Create provider order
//! POST /api/checkout/orders/{id}/capture    - Capture and complete the funnel
//! POST /api/checkout/orders/{id}/cancel     - Cancel
//! POST /api/create-payment                  - Insert a payment record
//! POST /api/onboarding/store                - Insert an onboarding record
//! POST /api/onboarding/{payment_id}/images  - Re-upload photos (multipart)
//! POST /api/reddit-conversion               - Conversion relay
//! POST /api/clerk-webhook                   - Identity webhook
//! GET  /api/test-supabase                   - Hosted store diagnostic
//! ```

pub mod api;
pub mod auth;
pub mod checkout;
pub mod health;
pub mod home;
pub mod onboarding;
pub mod pages;

use axum::{
    Router,
    http::HeaderMap,
    routing::{get, post},
};
use match_magnet_core::PricingPackage;
use tower_sessions::Session;

use crate::analytics::PixelEvent;
use crate::analytics::script_json;
use crate::error::AppError;
use crate::middleware::CspNonce;
use crate::models::session::keys;
use crate::paypal::CheckoutState;
use crate::state::AppState;

/// Page chrome shared by every template: CSP nonce, pixel ids and the
/// pixel events fired on load.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub nonce: String,
    pub meta_pixel_id: String,
    pub reddit_pixel_id: String,
    pub events_json: String,
    pub pixels_enabled: bool,
}

impl PageContext {
    #[must_use]
    pub fn new(state: &AppState, nonce: &CspNonce, events: &[PixelEvent]) -> Self {
        let pixels = state.pixels();
        Self {
            nonce: nonce.value().to_string(),
            meta_pixel_id: pixels.meta_pixel_id.clone().unwrap_or_default(),
            reddit_pixel_id: pixels.reddit_pixel_id.clone().unwrap_or_default(),
            events_json: script_json(events),
            pixels_enabled: pixels.is_enabled(),
        }
    }
}

/// Package chosen on the landing page, or the default one.
pub async fn selected_package(session: &Session) -> PricingPackage {
    session
        .get::<String>(keys::SELECTED_PACKAGE)
        .await
        .ok()
        .flatten()
        .and_then(|id| PricingPackage::find(&id))
        .unwrap_or_else(PricingPackage::default_package)
}

/// The visitor's checkout state.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn checkout_state(session: &Session) -> Result<CheckoutState, AppError> {
    Ok(session
        .get::<CheckoutState>(keys::CHECKOUT)
        .await?
        .unwrap_or_default())
}

/// Client IP as reported by the proxy: `x-forwarded-for`, then `x-real-ip`.
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| header("x-real-ip"))
        .unwrap_or("127.0.0.1")
        .to_string()
}

#[must_use]
pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Create the JSON API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout/orders", post(api::checkout::create_order))
        .route(
            "/checkout/orders/{order_id}/capture",
            post(api::checkout::capture_order),
        )
        .route(
            "/checkout/orders/{order_id}/cancel",
            post(api::checkout::cancel_order),
        )
        .route("/create-payment", post(api::payments::create_payment))
        .route("/onboarding/store", post(api::onboarding::store))
        .route(
            "/onboarding/{payment_id}/images",
            post(api::onboarding::upload_images).layer(api::onboarding::upload_body_limit()),
        )
        .route("/reddit-conversion", post(api::conversions::relay))
        .route("/clerk-webhook", post(api::webhook::clerk_webhook))
        .route("/test-supabase", get(api::diagnostics::test_supabase))
}

/// Create the page routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/checkout/select", post(home::select_package))
        .route("/auth", get(auth::show))
        .route(
            "/onboarding",
            get(onboarding::show)
                .post(onboarding::submit)
                .layer(api::onboarding::upload_body_limit()),
        )
        .route("/onboarding/success", get(onboarding::success))
        .route("/checkout", get(checkout::show))
        .merge(pages::router())
        .merge(health::router())
}

/// Page router over in-memory sessions for handler tests.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;

    use super::{api_routes, routes};
    use crate::middleware::funnel_session_layer;
    use crate::testing::TestApp;

    const BOUNDARY: &str = "mm-page-boundary";

    /// Pages and the JSON API sharing one session store.
    pub fn router(app: &TestApp) -> Router {
        Router::new()
            .merge(routes())
            .nest("/api", api_routes())
            .layer(funnel_session_layer(MemoryStore::default(), false))
            .with_state(app.state.clone())
    }

    /// A rendered response.
    pub struct Page {
        pub status: StatusCode,
        pub location: Option<String>,
        pub cookie: Option<String>,
        pub body: String,
    }

    pub async fn send(router: &Router, request: Request<Body>) -> Page {
        let response = router.clone().oneshot(request).await.unwrap();
        let header_value = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let location = header_value(header::LOCATION);
        let cookie = header_value(header::SET_COOKIE)
            .and_then(|v| v.split(';').next().map(str::to_string));
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        Page {
            status,
            location,
            cookie,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub async fn get(router: &Router, uri: &str, cookie: Option<&str>) -> Page {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        send(router, builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_empty(router: &Router, uri: &str, cookie: &str) -> Page {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, cookie)
            .body(Body::from("{}"))
            .unwrap();
        send(router, request).await
    }

    /// Post the onboarding form with text `fields` and
    /// `(field, file name, content type)` files.
    pub async fn submit_onboarding(
        router: &Router,
        fields: &[(&str, &str)],
        files: &[(&str, &str, &str)],
        cookie: Option<&str>,
    ) -> Page {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        for (field, name, content_type) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\nbytes\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        let mut builder = Request::builder()
            .method("POST")
            .uri("/onboarding")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        send(router, builder.body(Body::from(body)).unwrap()).await
    }

    /// Submit a valid form with one photo; returns the session cookie.
    pub async fn onboarded_session(router: &Router) -> String {
        let page = submit_onboarding(
            router,
            &[("name", "Sam Lee"), ("email", "sam@example.com")],
            &[("photos", "me.jpg", "image/jpeg")],
            None,
        )
        .await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
        page.cookie.unwrap()
    }
}
