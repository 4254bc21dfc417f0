//! Unified error handling with Sentry integration.
//!
//! Every API failure renders the envelope `{"success": false, "error": "..."}`.
//! Server-side failures are captured to Sentry before responding; their
//! details never reach the client.

use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::hosted_store::StoreError;
use crate::identity::WebhookError;
use crate::models::ValidationError;
use crate::paypal::{CheckoutError, PayPalError};
use crate::services::{FunnelError, OutboxError, StagingError};

/// Application-level error type for the web crate.
#[derive(Debug, Error)]
pub enum AppError {
    /// Input rejected before any remote call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Missing or invalid webhook signature.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Checkout action not allowed in the current state.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Hosted store failure.
    #[error("Hosted store error: {0}")]
    Store(#[from] StoreError),

    /// Payment provider failure.
    #[error("Payment error: {0}")]
    Payment(#[from] PayPalError),

    /// A required configuration group is missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] OutboxError),

    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FunnelError> for AppError {
    fn from(err: FunnelError) -> Self {
        match err {
            FunnelError::Validation(e) => Self::Validation(e),
            FunnelError::Payment(e) => Self::Payment(e),
            FunnelError::Checkout(e) => Self::Checkout(e),
            FunnelError::Staging(e) => e.into(),
        }
    }
}

impl From<StagingError> for AppError {
    fn from(err: StagingError) -> Self {
        if err.is_client_error() {
            Self::BadRequest(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        if err.is_authentication() {
            Self::Unauthorized(err.to_string())
        } else if matches!(err, WebhookError::InvalidSecret) {
            Self::Config(err.to_string())
        } else {
            Self::BadRequest(err.to_string())
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Internal(format!("session error: {err}"))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::BadRequest(err.body_text())
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Checkout(_) => StatusCode::CONFLICT,
            Self::Store(StoreError::NotConfigured)
            | Self::Payment(PayPalError::NotConfigured)
            | Self::Config(_)
            | Self::Database(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Store(e) if e.is_rejection() => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Payment(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Whether the failure is ours rather than the caller's.
    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Store(_)
                | Self::Payment(_)
                | Self::Config(_)
                | Self::Database(_)
                | Self::Internal(_)
        )
    }

    /// Message safe to show the caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(StoreError::NotConfigured) => "Hosted store is not configured".to_string(),
            Self::Payment(PayPalError::NotConfigured) => {
                "Payment provider is not configured".to_string()
            }
            Self::Store(e) if e.is_rejection() => "Record rejected by the hosted store".to_string(),
            Self::Store(_) => "Hosted store unavailable".to_string(),
            Self::Payment(PayPalError::CaptureIncomplete(_)) => {
                "Payment was not completed".to_string()
            }
            Self::Payment(_) => "Payment provider error".to_string(),
            Self::Config(msg) => msg.clone(),
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Unauthorized(_) => "Invalid webhook signature".to_string(),
            Self::Validation(_)
            | Self::NotFound(_)
            | Self::Checkout(_)
            | Self::BadRequest(_) => self.to_string(),
        }
    }
}

/// Failure envelope shared by every API route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = ErrorBody {
            success: false,
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// JSON body extractor whose rejections use the error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Add a breadcrumb for funnel steps.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of steps
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_envelope() {
        let (status, body) =
            body_json(AppError::Validation(ValidationError::MissingField("email"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Missing required field: email");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let (status, body) =
            body_json(AppError::Internal("connection refused at 10.0.0.3".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[test]
    fn test_status_mapping() {
        let api = |status| StoreError::Api {
            status,
            message: "secret detail".to_string(),
        };
        assert_eq!(
            AppError::Store(StoreError::NotConfigured).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::Store(api(400)).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Store(api(503)).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::Payment(PayPalError::NotConfigured).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Payment(PayPalError::AuthenticationFailed("x".to_string())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Checkout(CheckoutError::OrderMismatch("A".to_string())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Unauthorized("bad".to_string()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert!(
            !AppError::Store(api(400))
                .public_message()
                .contains("secret detail")
        );
    }

    #[test]
    fn test_staging_errors_split() {
        let client: AppError = StagingError::NotAnImage {
            file_name: "a.pdf".to_string(),
        }
        .into();
        assert_eq!(client.status(), StatusCode::BAD_REQUEST);

        let server: AppError = StagingError::Io(std::io::Error::other("disk full")).into();
        assert_eq!(server.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
