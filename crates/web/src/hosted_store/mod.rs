//! Hosted store (Supabase) adapter.
//!
//! All persistence of funnel records goes through [`HostedStore`]: rows are
//! inserted into the `payments`, `onboarding` and `images` tables over the
//! PostgREST interface, and photos are uploaded to object storage buckets.
//!
//! # Tables
//!
//! - `payments` - one row per captured order
//! - `onboarding` - one row per onboarding submission, keyed by `payment_id`
//! - `images` - one row per uploaded file, keyed by `payment_id`
//!
//! When the store is not configured the service runs with
//! [`UnconfiguredStore`], which fails every call with
//! [`StoreError::NotConfigured`].

mod client;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use serde_json::Value;
use thiserror::Error;

pub use client::SupabaseStore;

use crate::config::SupabaseConfig;

/// Table holding payment records.
pub const PAYMENTS_TABLE: &str = "payments";
/// Table holding onboarding submissions.
pub const ONBOARDING_TABLE: &str = "onboarding";
/// Table holding image metadata.
pub const IMAGES_TABLE: &str = "images";

/// Errors returned by the hosted store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Credentials are missing.
    #[error("hosted store is not configured")]
    NotConfigured,

    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with an error status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The response body could not be understood.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl StoreError {
    /// Whether retrying the same request later could succeed.
    ///
    /// Transport failures, rate limiting and server errors are transient.
    /// Rejections (4xx) and missing configuration are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotConfigured | Self::Parse(_) => false,
        }
    }

    /// Whether the store refused the request because of its content.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Api { status, .. } if *status >= 400 && *status < 500 && *status != 429
        )
    }
}

/// Persistence operations used by the funnel.
#[async_trait]
pub trait HostedStore: Send + Sync {
    /// Insert one row and return it as stored.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError>;

    /// Delete the rows whose `column` equals `value`.
    async fn delete_where(&self, table: &str, column: &str, value: &str)
    -> Result<(), StoreError>;

    /// Cheap read used to check connectivity.
    async fn probe(&self, table: &str) -> Result<(), StoreError>;

    /// Upload a file and return its public URL.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<String, StoreError>;
}

/// Store used when no credentials are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredStore;

#[async_trait]
impl HostedStore for UnconfiguredStore {
    async fn insert(&self, _table: &str, _row: Value) -> Result<Value, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn delete_where(
        &self,
        _table: &str,
        _column: &str,
        _value: &str,
    ) -> Result<(), StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn probe(&self, _table: &str) -> Result<(), StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn upload(
        &self,
        _bucket: &str,
        _path: &str,
        _content_type: &str,
        _bytes: Bytes,
    ) -> Result<String, StoreError> {
        Err(StoreError::NotConfigured)
    }
}

/// Build the store for the given configuration.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn from_config(config: Option<&SupabaseConfig>) -> Result<Arc<dyn HostedStore>, StoreError> {
    match config {
        Some(config) => Ok(Arc::new(SupabaseStore::new(config)?)),
        None => {
            tracing::warn!("SUPABASE_URL not set, funnel records cannot be stored");
            Ok(Arc::new(UnconfiguredStore))
        }
    }
}
