//! Onboarding form and post-checkout confirmation.
//!
//! The form is posted before payment. Answers are kept in the session as an
//! [`OnboardingDraft`] and photos are staged on disk; nothing reaches the
//! hosted store until the order is captured.

use std::collections::HashMap;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use match_magnet_core::{DraftId, FunnelEvent, ImageKind};
use tower_sessions::Session;
use tracing::instrument;

use super::home::PackageView;
use super::{PageContext, client_ip, selected_package, user_agent};
use crate::analytics::conversions::content_data;
use crate::analytics::{ConversionEvent, PixelEvent, UserData, fire_and_forget};
use crate::error::{Result, add_breadcrumb};
use crate::filters;
use crate::middleware::CspNonce;
use crate::models::session::{flash_pixels, keys, take_pixels};
use crate::models::{
    CompletionSummary, OnboardingDraft, OnboardingProfile, OnboardingSubmission, UploadFile,
};
use crate::services::staging::MAX_FILES_PER_KIND;
use crate::state::AppState;

// =============================================================================
// Multipart
// =============================================================================

/// A decoded multipart form: text fields and image files.
#[derive(Debug, Default)]
pub struct SubmittedForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadFile>,
}

impl SubmittedForm {
    fn take(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    /// The text fields as an onboarding submission.
    #[must_use]
    pub fn submission(&mut self) -> OnboardingSubmission {
        OnboardingSubmission {
            payment_id: self.take("payment_id"),
            name: self.take("name"),
            email: self.take("email"),
            phone: self.take("phone"),
            age: self.take("age"),
            dating_goal: self.take("dating_goal"),
            current_matches: self.take("current_matches"),
            body_type: self.take("body_type"),
            style_preference: self.take("style_preference"),
            ethnicity: self.take("ethnicity"),
            interests: self.take("interests"),
            current_bio: self.take("current_bio"),
            vibe: self.take("vibe"),
            want_more: self.take("want_more"),
            one_liner: self.take("one_liner"),
            photo_count: None,
            screenshot_count: None,
        }
    }
}

/// Read a multipart body. Files come from the `photos` and `screenshots`
/// fields; empty file inputs are skipped.
///
/// # Errors
///
/// Returns 400 if the body is not valid multipart.
pub async fn read_multipart(mut multipart: Multipart) -> Result<SubmittedForm> {
    let mut form = SubmittedForm::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if let Some(kind) = ImageKind::from_form_field(&name) {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await?;
            if bytes.is_empty() {
                continue;
            }
            form.files.push(UploadFile {
                file_name,
                content_type,
                bytes,
                kind,
            });
        } else {
            form.fields.insert(name, field.text().await?);
        }
    }

    Ok(form)
}

// =============================================================================
// Form page
// =============================================================================

/// Values echoed back into the form.
#[derive(Debug, Clone, Default)]
pub struct FormValues {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub age: String,
    pub dating_goal: String,
    pub current_matches: String,
    pub body_type: String,
    pub style_preference: String,
    pub ethnicity: String,
    pub interests: String,
    pub current_bio: String,
    pub vibe: String,
    pub want_more: String,
    pub one_liner: String,
}

impl From<&OnboardingProfile> for FormValues {
    fn from(profile: &OnboardingProfile) -> Self {
        Self {
            name: profile.name.clone(),
            email: profile.email.as_str().to_string(),
            phone: profile.phone.clone(),
            age: profile.age.clone(),
            dating_goal: profile.dating_goal.clone(),
            current_matches: profile.current_matches.clone(),
            body_type: profile.body_type.clone(),
            style_preference: profile.style_preference.clone(),
            ethnicity: profile.ethnicity.clone(),
            interests: profile.interests.clone(),
            current_bio: profile.current_bio.clone(),
            vibe: profile.vibe.clone(),
            want_more: profile.want_more.clone(),
            one_liner: profile.one_liner.clone(),
        }
    }
}

impl From<&OnboardingSubmission> for FormValues {
    fn from(s: &OnboardingSubmission) -> Self {
        let v = |field: &Option<String>| field.clone().unwrap_or_default();
        Self {
            name: v(&s.name),
            email: v(&s.email),
            phone: v(&s.phone),
            age: v(&s.age),
            dating_goal: v(&s.dating_goal),
            current_matches: v(&s.current_matches),
            body_type: v(&s.body_type),
            style_preference: v(&s.style_preference),
            ethnicity: v(&s.ethnicity),
            interests: v(&s.interests),
            current_bio: v(&s.current_bio),
            vibe: v(&s.vibe),
            want_more: v(&s.want_more),
            one_liner: v(&s.one_liner),
        }
    }
}

/// Onboarding form template.
#[derive(Template, WebTemplate)]
#[template(path = "onboarding.html")]
pub struct OnboardingTemplate {
    pub page: PageContext,
    pub package: PackageView,
    pub form: FormValues,
    pub error: Option<String>,
    pub staged_photos: usize,
    pub staged_screenshots: usize,
    pub max_files: usize,
}

async fn render_form(
    state: &AppState,
    session: &Session,
    nonce: &CspNonce,
    events: &[PixelEvent],
    form: FormValues,
    draft: Option<&OnboardingDraft>,
    error: Option<String>,
) -> OnboardingTemplate {
    let package = selected_package(session).await;
    let staged = |kind: ImageKind| {
        draft.map_or(0, |d| d.files.iter().filter(|f| f.kind == kind).count())
    };

    OnboardingTemplate {
        page: PageContext::new(state, nonce, events),
        package: PackageView::new(&package, package.id),
        form,
        error,
        staged_photos: staged(ImageKind::ProfilePhoto),
        staged_screenshots: staged(ImageKind::Screenshot),
        max_files: MAX_FILES_PER_KIND,
    }
}

/// Display the onboarding form, prefilled from an earlier draft.
///
/// Fires `InitiateCheckout`.
#[instrument(skip(state, session, nonce))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    nonce: CspNonce,
) -> Result<impl IntoResponse> {
    let draft: Option<OnboardingDraft> = session.get(keys::ONBOARDING_DRAFT).await?;
    let mut events = take_pixels(&session).await;
    events.push(PixelEvent::initiate_checkout(Some("Onboarding Form")));

    let form = draft
        .as_ref()
        .map(|d| FormValues::from(&d.profile))
        .unwrap_or_default();
    Ok(render_form(&state, &session, &nonce, &events, form, draft.as_ref(), None).await)
}

/// Validate the form, stage the photos and send the visitor to checkout.
///
/// Invalid answers or files re-render the form with a 400. Submitting
/// without files keeps the photos staged by an earlier submission.
///
/// # Errors
///
/// Returns an error if the body is not multipart, or if the session store
/// or staging directory fails.
#[instrument(skip_all)]
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    nonce: CspNonce,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response> {
    let mut form = read_multipart(multipart).await?;
    let submission = form.submission();
    let existing: Option<OnboardingDraft> = session.get(keys::ONBOARDING_DRAFT).await?;

    let profile = match submission.clone().into_profile() {
        Ok(profile) => profile,
        Err(e) => {
            let values = FormValues::from(&submission);
            let error = Some(e.to_string());
            let page =
                render_form(&state, &session, &nonce, &[], values, existing.as_ref(), error).await;
            return Ok((StatusCode::BAD_REQUEST, page).into_response());
        }
    };

    let draft_id = existing.as_ref().map_or_else(DraftId::generate, |d| d.draft_id);
    let files = if form.files.is_empty() {
        existing.map(|d| d.files).unwrap_or_default()
    } else {
        match state.funnel().staging().stage(draft_id, &form.files).await {
            Ok(staged) => staged,
            Err(e) if e.is_client_error() => {
                let values = FormValues::from(&profile);
                let error = Some(e.to_string());
                let page =
                    render_form(&state, &session, &nonce, &[], values, existing.as_ref(), error)
                        .await;
                return Ok((StatusCode::BAD_REQUEST, page).into_response());
            }
            Err(e) => return Err(e.into()),
        }
    };

    add_breadcrumb(
        "funnel",
        "Onboarding submitted",
        Some(&[("files", &files.len().to_string())]),
    );

    let user_data = UserData::hashed(Some(profile.email.as_str()), Some(profile.phone.as_str()))
        .with_client(client_ip(&headers), user_agent(&headers));
    let draft = OnboardingDraft {
        draft_id,
        profile,
        files,
    };
    session.insert(keys::ONBOARDING_DRAFT, &draft).await?;
    flash_pixels(&session, [PixelEvent::complete_registration()]).await?;

    let mut event =
        ConversionEvent::new(&FunnelEvent::CompleteRegistration, user_data.merged(None));
    if let Some(custom) = content_data(&FunnelEvent::CompleteRegistration, None) {
        event = event.with_custom_data(custom);
    }
    fire_and_forget(state.conversions().clone(), event);

    Ok(Redirect::to("/checkout").into_response())
}

// =============================================================================
// Success page
// =============================================================================

/// Success page template.
#[derive(Template, WebTemplate)]
#[template(path = "success.html")]
pub struct SuccessTemplate {
    pub page: PageContext,
    pub summary: CompletionSummary,
    pub amount: String,
}

/// Display the confirmation for the last completed checkout.
///
/// Fires the `Purchase` events flashed by the capture.
#[instrument(skip(state, session, nonce))]
pub async fn success(
    State(state): State<AppState>,
    session: Session,
    nonce: CspNonce,
) -> Result<Response> {
    let Some(summary) = session
        .get::<CompletionSummary>(keys::LAST_COMPLETION)
        .await?
    else {
        return Ok(Redirect::to("/").into_response());
    };
    let events = take_pixels(&session).await;

    Ok(SuccessTemplate {
        page: PageContext::new(&state, &nonce, &events),
        amount: summary.amount.display(),
        summary,
    }
    .into_response())
}
