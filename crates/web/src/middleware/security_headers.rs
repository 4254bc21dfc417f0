//! Security headers middleware for XSS, clickjacking, and isolation protection.
//!
//! Start locked down and open only the origins the funnel needs: the payment
//! SDK and its popup, the identity widget and the two advertising pixels.

use axum::{
    extract::{Request, State},
    http::{
        HeaderName, HeaderValue,
        header::{
            CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
        },
    },
    middleware::Next,
    response::Response,
};

use super::csp::CspNonce;
use crate::state::AppState;

const PAYPAL_ORIGINS: &str = "https://www.paypal.com https://www.sandbox.paypal.com";
const PIXEL_SCRIPT_ORIGINS: &str = "https://connect.facebook.net https://www.redditstatic.com";
const PIXEL_BEACON_ORIGINS: &str =
    "https://www.facebook.com https://alb.reddit.com https://pixel-config.reddit.com";

/// Build the Content-Security-Policy for one response.
///
/// `identity_host` is the identity widget's frontend API host, when the
/// widget is configured.
#[must_use]
pub fn content_security_policy(nonce: &str, identity_host: Option<&str>) -> String {
    let identity = identity_host
        .map(|host| format!(" https://{host}"))
        .unwrap_or_default();
    let nonce = if nonce.is_empty() {
        String::new()
    } else {
        format!(" 'nonce-{nonce}'")
    };

    format!(
        "default-src 'none'; \
         script-src 'self'{nonce} {PAYPAL_ORIGINS} {PIXEL_SCRIPT_ORIGINS}{identity}; \
         style-src 'self' 'unsafe-inline'; \
         font-src 'self'; \
         img-src 'self' data: https://www.paypalobjects.com https://img.clerk.com {PIXEL_BEACON_ORIGINS}; \
         connect-src 'self' {PAYPAL_ORIGINS} {PIXEL_BEACON_ORIGINS}{identity}; \
         frame-src {PAYPAL_ORIGINS} https://challenges.cloudflare.com{identity}; \
         worker-src 'self' blob:; \
         object-src 'none'; \
         base-uri 'self'; \
         form-action 'self'; \
         frame-ancestors 'none'; \
         upgrade-insecure-requests"
    )
}

/// Add security headers to all responses.
///
/// Headers applied:
/// - `X-Frame-Options: DENY` - Prevent clickjacking
/// - `X-Content-Type-Options: nosniff` - Prevent MIME sniffing
/// - `Referrer-Policy: strict-origin-when-cross-origin` - the payment SDK
///   needs the origin
/// - `Content-Security-Policy` - see [`content_security_policy`]
/// - `Permissions-Policy` - Deny sensitive features except payment
/// - `Cross-Origin-Opener-Policy: same-origin-allow-popups` - the payment
///   approval runs in a popup
/// - `X-DNS-Prefetch-Control: off` - Prevent DNS prefetch leakage
pub async fn security_headers_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let nonce = request
        .extensions()
        .get::<CspNonce>()
        .map(|n| n.value().to_string())
        .unwrap_or_default();
    let identity_host = state.widget().map(|w| w.frontend_api.clone());

    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    match HeaderValue::from_str(&content_security_policy(&nonce, identity_host.as_deref())) {
        Ok(value) => {
            headers.insert(CONTENT_SECURITY_POLICY, value);
        }
        Err(e) => tracing::error!(error = %e, "Invalid CSP header value"),
    }

    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static(
            "accelerometer=(), \
             camera=(), \
             display-capture=(), \
             geolocation=(), \
             gyroscope=(), \
             magnetometer=(), \
             microphone=(), \
             payment=(self \"https://www.paypal.com\"), \
             usb=(), \
             xr-spatial-tracking=()",
        ),
    );

    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin-allow-popups"),
    );

    headers.insert(
        HeaderName::from_static("x-dns-prefetch-control"),
        HeaderValue::from_static("off"),
    );

    response
}
