//! Session middleware configuration.
//!
//! The session carries the visitor's funnel progress between pages: the
//! chosen package, the onboarding draft, the checkout state and flashed
//! pixel events. Production sessions live in `PostgreSQL`.

use sqlx::PgPool;
use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::WebConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "mm_session";

/// Idle time after which a funnel session is dropped (7 days).
const SESSION_IDLE_SECONDS: i64 = 7 * 24 * 60 * 60;

/// [`SESSION_IDLE_SECONDS`] as a std duration. Staged photo drafts older
/// than this can no longer belong to a live session.
pub const SESSION_IDLE: std::time::Duration =
    std::time::Duration::from_secs(SESSION_IDLE_SECONDS.unsigned_abs());

/// Create the session layer over the `tower_sessions.session` table
/// (see `mm-cli migrate`).
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &WebConfig,
) -> SessionManagerLayer<PostgresStore> {
    funnel_session_layer(PostgresStore::new(pool.clone()), config.is_secure())
}

/// Funnel cookie settings over any session store.
///
/// `secure` should be true whenever the site is served over HTTPS.
#[must_use]
pub fn funnel_session_layer<S>(store: S, secure: bool) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(
            SESSION_IDLE_SECONDS,
        )))
        .with_secure(secure)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Router, body::Body, http::Request, http::header, routing::get};
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, Session};

    use super::*;

    async fn set_cookie(secure: bool) -> String {
        let app = Router::new()
            .route(
                "/",
                get(|session: Session| async move {
                    session.insert("selected_package", "vip").await.unwrap();
                    "ok"
                }),
            )
            .layer(funnel_session_layer(MemoryStore::default(), secure));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_cookie_attributes() {
        let cookie = set_cookie(false).await;
        assert!(cookie.starts_with("mm_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(!cookie.contains("Secure"));
    }

    #[tokio::test]
    async fn test_secure_cookie_over_https() {
        assert!(set_cookie(true).await.contains("Secure"));
    }
}
