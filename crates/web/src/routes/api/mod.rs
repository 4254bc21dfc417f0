//! JSON API handlers.
//!
//! Every response carries `success`. Failures use the envelope rendered by
//! [`crate::error::AppError`].

pub mod checkout;
pub mod conversions;
pub mod diagnostics;
pub mod onboarding;
pub mod payments;
pub mod webhook;
