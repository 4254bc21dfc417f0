//! Funnel records and session data.

pub mod image;
pub mod onboarding;
pub mod payment;
pub mod session;

use match_magnet_core::EmailError;
use thiserror::Error;

pub use image::{ImageRecord, UploadFile};
pub use onboarding::{OnboardingProfile, OnboardingRecord, OnboardingSubmission};
pub use payment::{NewPayment, PaymentRecord};
pub use session::{CompletionSummary, OnboardingDraft};

/// Input rejected before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
