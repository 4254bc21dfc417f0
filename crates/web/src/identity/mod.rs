//! Identity provider (Clerk) adapter.
//!
//! Credential collection and sessions belong to the hosted widget. The
//! service only decides where the widget sends visitors afterwards and
//! ingests the provider's webhooks.

pub mod webhook;

use base64::{Engine, engine::general_purpose::STANDARD};

pub use webhook::{ClerkEvent, WebhookError, WebhookVerifier};

/// Settings the sign-in page needs to mount the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetConfig {
    pub publishable_key: String,
    /// Frontend API host encoded in the publishable key.
    pub frontend_api: String,
}

impl WidgetConfig {
    /// Build the widget settings from a publishable key.
    ///
    /// Returns `None` when the key is malformed.
    #[must_use]
    pub fn from_publishable_key(key: &str) -> Option<Self> {
        Some(Self {
            publishable_key: key.to_string(),
            frontend_api: frontend_api_host(key)?,
        })
    }

    /// URL of the browser bundle served by the frontend API.
    #[must_use]
    pub fn script_url(&self) -> String {
        format!(
            "https://{}/npm/@clerk/clerk-js@5/dist/clerk.browser.js",
            self.frontend_api
        )
    }
}

/// Decode the frontend API host from a publishable key.
///
/// Keys look like `pk_test_<base64("host$")>` or `pk_live_<...>`.
#[must_use]
pub fn frontend_api_host(publishable_key: &str) -> Option<String> {
    let encoded = publishable_key
        .strip_prefix("pk_test_")
        .or_else(|| publishable_key.strip_prefix("pk_live_"))?;
    let decoded = STANDARD
        .decode(encoded.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(encoded))
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(encoded))
        .ok()?;
    let host = String::from_utf8(decoded).ok()?;
    let host = host.strip_suffix('$')?;
    if host.is_empty() || host.contains(['/', ' ', '$']) {
        return None;
    }
    Some(host.to_string())
}

/// Whether `path` is a same-site absolute path (no scheme, no host).
#[must_use]
pub fn is_local_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.contains("://")
}
