//! Black-box tests for Match Magnet.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the server against a test database
//! cargo run -p match-magnet-web
//!
//! # Run the ignored tests against it
//! cargo test -p match-magnet-integration-tests -- --ignored
//! ```
//!
//! `WEB_BASE_URL` points the tests at another server.

use reqwest::Client;

/// Base URL of the server under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("WEB_BASE_URL")
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Client that keeps the session cookie between requests.
///
/// # Panics
///
/// Panics if the TLS backend cannot be initialized.
#[must_use]
pub fn session_client() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}
