//! Onboarding submissions.

use chrono::{DateTime, Utc};
use match_magnet_core::{Email, OnboardingId, PaymentId};
use serde::{Deserialize, Serialize};

use super::ValidationError;
use super::payment::non_blank;

/// Onboarding form fields as posted, before cleaning.
///
/// Used for both the JSON API and the HTML form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OnboardingSubmission {
    pub payment_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub age: Option<String>,
    pub dating_goal: Option<String>,
    pub current_matches: Option<String>,
    pub body_type: Option<String>,
    pub style_preference: Option<String>,
    pub ethnicity: Option<String>,
    pub interests: Option<String>,
    pub current_bio: Option<String>,
    pub vibe: Option<String>,
    pub want_more: Option<String>,
    pub one_liner: Option<String>,
    pub photo_count: Option<u32>,
    pub screenshot_count: Option<u32>,
}

/// Cleaned profile: every text field trimmed, absent fields empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingProfile {
    pub name: String,
    pub email: Email,
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

fn cleaned(value: Option<String>) -> String {
    non_blank(value).unwrap_or_default()
}

impl OnboardingSubmission {
    /// Validate everything but the payment id.
    ///
    /// # Errors
    ///
    /// `MissingField` for a blank name or email, `InvalidEmail` when the
    /// email does not parse.
    pub fn into_profile(self) -> Result<OnboardingProfile, ValidationError> {
        let name = non_blank(self.name).ok_or(ValidationError::MissingField("name"))?;
        let email = non_blank(self.email).ok_or(ValidationError::MissingField("email"))?;
        let email = Email::parse(&email).map_err(ValidationError::InvalidEmail)?;

        Ok(OnboardingProfile {
            name,
            email,
            phone: cleaned(self.phone),
            age: cleaned(self.age),
            dating_goal: cleaned(self.dating_goal),
            current_matches: cleaned(self.current_matches),
            body_type: cleaned(self.body_type),
            style_preference: cleaned(self.style_preference),
            ethnicity: cleaned(self.ethnicity),
            interests: cleaned(self.interests),
            current_bio: cleaned(self.current_bio),
            vibe: cleaned(self.vibe),
            want_more: cleaned(self.want_more),
            one_liner: cleaned(self.one_liner),
        })
    }

    /// Validate a complete submission and build the row to insert.
    ///
    /// Required fields are checked in the order `payment_id`, `name`,
    /// `email`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(mut self) -> Result<OnboardingRecord, ValidationError> {
        let payment_id = non_blank(self.payment_id.take())
            .ok_or(ValidationError::MissingField("payment_id"))?;
        let payment_id: PaymentId = payment_id.parse().map_err(|_| ValidationError::Invalid {
            field: "payment_id",
            reason: "must be a UUID".to_string(),
        })?;
        let photo_count = self.photo_count.unwrap_or(0);
        let screenshot_count = self.screenshot_count.unwrap_or(0);
        let profile = self.into_profile()?;

        Ok(OnboardingRecord::new(
            payment_id,
            profile,
            photo_count,
            screenshot_count,
        ))
    }
}

/// A row of the `onboarding` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingRecord {
    pub id: OnboardingId,
    pub payment_id: PaymentId,
    #[serde(flatten)]
    pub profile: OnboardingProfile,
    pub photo_count: u32,
    pub screenshot_count: u32,
    pub created_at: DateTime<Utc>,
}

impl OnboardingRecord {
    /// New record with a freshly minted id.
    #[must_use]
    pub fn new(
        payment_id: PaymentId,
        profile: OnboardingProfile,
        photo_count: u32,
        screenshot_count: u32,
    ) -> Self {
        Self {
            id: OnboardingId::generate(),
            payment_id,
            profile,
            photo_count,
            screenshot_count,
            created_at: Utc::now(),
        }
    }
}
