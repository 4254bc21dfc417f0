//! Match Magnet web library.
//!
//! Landing pages, the onboarding form, checkout and the JSON API, built as a
//! library so the router can be driven from tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod analytics;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod filters;
pub mod hosted_store;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod paypal;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod testing;

use axum::{Router, extract::Request};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::{SessionManagerLayer, SessionStore};

use state::AppState;

/// Static assets, relative to the workspace root.
pub const STATIC_DIR: &str = "crates/web/static";

/// Build the application router with its middleware stack.
///
/// Layers are listed innermost first; see [`middleware`] for the order as a
/// request sees it.
pub fn build_router<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    Router::new()
        .merge(routes::routes())
        .nest(
            "/api",
            routes::api_routes().layer(middleware::api_rate_limiter()),
        )
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(session_layer)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::security_headers_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::csp_nonce_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;

    use super::*;
    use crate::testing::TestApp;

    fn app() -> Router {
        build_router(
            TestApp::new().state,
            middleware::funnel_session_layer(MemoryStore::default(), false),
        )
    }

    async fn get(uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_health_carries_stack_headers() {
        let (status, headers, body) = get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
        assert!(headers.contains_key("x-request-id"));
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        let csp = headers[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
        assert!(csp.contains("'nonce-"));
    }

    #[tokio::test]
    async fn test_home_lists_packages_with_nonce() {
        let (status, headers, body) = get("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Most Matches"));
        assert!(body.contains("$69"));

        let csp = headers[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
        let nonce = csp
            .split("'nonce-")
            .nth(1)
            .and_then(|rest| rest.split('\'').next())
            .unwrap();
        assert!(body.contains(&format!("nonce=\"{nonce}\"")));
    }

    #[tokio::test]
    async fn test_content_pages_render() {
        let (status, _, body) = get("/terms").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Terms of Service"));

        let (status, _, _) = get("/privacy").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_checkout_without_draft_redirects() {
        let (status, headers, _) = get("/checkout").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers[header::LOCATION], "/onboarding");

        let (status, headers, _) = get("/onboarding/success").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn test_api_rejects_unkeyed_clients() {
        // Without a peer address or proxy header there is no rate-limit key.
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/test-supabase")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/test-supabase")
                    .header("x-forwarded-for", "203.0.113.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
