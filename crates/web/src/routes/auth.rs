//! Sign-in/up page hosting the identity provider's widget.
//!
//! Credentials, verification and sessions belong to the widget; the only
//! thing decided here is where the visitor lands afterwards.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::PageContext;
use crate::filters;
use crate::identity::WidgetConfig;
use crate::middleware::CspNonce;
use crate::models::session::take_pixels;
use crate::state::AppState;

/// Which widget to mount.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    #[serde(default)]
    pub mode: Option<String>,
}

/// Auth page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth.html")]
pub struct AuthTemplate {
    pub page: PageContext,
    pub widget: Option<WidgetConfig>,
    pub sign_in: bool,
    pub redirect_path: String,
}

/// Display the sign-in/up page.
///
/// Without a configured widget the page explains that sign-in is
/// unavailable and links straight to the next step.
#[instrument(skip(state, session, nonce))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    nonce: CspNonce,
    Query(query): Query<AuthQuery>,
) -> impl IntoResponse {
    let events = take_pixels(&session).await;

    AuthTemplate {
        page: PageContext::new(&state, &nonce, &events),
        widget: state.widget().cloned(),
        sign_in: query.mode.as_deref() == Some("sign-in"),
        redirect_path: state.config().clerk.redirect_path.clone(),
    }
}
