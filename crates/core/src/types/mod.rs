//! Core types for Match Magnet.
//!
//! This module provides type-safe wrappers for the funnel's domain concepts.

pub mod email;
pub mod funnel;
pub mod id;
pub mod package;
pub mod price;
pub mod status;

pub use email::{Email, EmailError};
pub use funnel::FunnelEvent;
pub use id::*;
pub use package::PricingPackage;
pub use price::{CurrencyCode, Money, MoneyError};
pub use status::{ImageKind, PaymentStatus};
