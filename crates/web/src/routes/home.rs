//! Landing page and package selection.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect},
};
use match_magnet_core::{FunnelEvent, PricingPackage};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::{PageContext, client_ip, selected_package, user_agent};
use crate::analytics::conversions::content_data;
use crate::analytics::{ConversionEvent, PixelEvent, UserData, fire_and_forget};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::middleware::CspNonce;
use crate::models::session::{flash_pixels, keys, take_pixels};
use crate::state::AppState;

/// Pricing card display data.
#[derive(Debug, Clone)]
pub struct PackageView {
    pub id: &'static str,
    pub name: &'static str,
    pub price: String,
    pub original_price: String,
    pub savings_percent: u32,
    pub description: &'static str,
    pub features: &'static [&'static str],
    pub popular: bool,
    pub selected: bool,
}

impl PackageView {
    #[must_use]
    pub fn new(package: &PricingPackage, selected_id: &str) -> Self {
        Self {
            id: package.id,
            name: package.name,
            price: package.price.display_short(),
            original_price: package.original_price.display_short(),
            savings_percent: package.savings_percent(),
            description: package.description,
            features: package.features,
            popular: package.popular,
            selected: package.id == selected_id,
        }
    }
}

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub page: PageContext,
    pub packages: Vec<PackageView>,
}

/// Display the landing page.
#[instrument(skip(state, session, nonce))]
pub async fn home(
    State(state): State<AppState>,
    session: Session,
    nonce: CspNonce,
) -> impl IntoResponse {
    let selected = selected_package(&session).await;
    let events = take_pixels(&session).await;

    HomeTemplate {
        page: PageContext::new(&state, &nonce, &events),
        packages: PricingPackage::all()
            .iter()
            .map(|p| PackageView::new(p, selected.id))
            .collect(),
    }
}

/// Package selection form.
#[derive(Debug, Deserialize)]
pub struct SelectPackageForm {
    pub package_id: String,
}

/// Remember the chosen package and send the visitor to sign in.
///
/// Fires `AddToCart` and `Lead` on the next page, and a server-side lead
/// conversion.
///
/// # Errors
///
/// Returns 400 for an unknown package.
#[instrument(skip(state, session, headers))]
pub async fn select_package(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Form(form): Form<SelectPackageForm>,
) -> Result<Redirect> {
    let package = PricingPackage::find(form.package_id.trim())
        .ok_or_else(|| AppError::BadRequest("Unknown package".to_string()))?;

    add_breadcrumb("funnel", "Package selected", Some(&[("package", package.id)]));

    session.insert(keys::SELECTED_PACKAGE, package.id).await?;
    // A new selection starts a new purchase.
    session
        .remove::<serde_json::Value>(keys::CHECKOUT)
        .await?;
    flash_pixels(
        &session,
        [
            PixelEvent::add_to_cart(&package),
            PixelEvent::lead(Some("Pricing Card")),
        ],
    )
    .await?;

    let user_data = UserData::default().with_client(client_ip(&headers), user_agent(&headers));
    let mut event = ConversionEvent::new(&FunnelEvent::Lead, user_data.merged(None));
    if let Some(custom) = content_data(&FunnelEvent::Lead, Some(package.name)) {
        event = event.with_custom_data(custom);
    }
    fire_and_forget(state.conversions().clone(), event);

    Ok(Redirect::to("/auth"))
}
