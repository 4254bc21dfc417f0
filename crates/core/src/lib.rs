//! Match Magnet Core - Shared domain types.
//!
//! This crate provides the types shared by the Match Magnet components:
//! - `web` - Landing pages, onboarding, checkout and API routes
//! - `cli` - Migrations, outbox maintenance and diagnostics
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP
//! clients. Records persisted in the hosted store are built from these types
//! by the `web` crate.
//!
//! # Modules
//!
//! - [`types`] - Ids, email, money, pricing packages, statuses and funnel events

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
