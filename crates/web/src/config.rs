//! Web configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `WEB_DATABASE_URL` - `PostgreSQL` connection string for sessions and the outbox
//!   (falls back to `DATABASE_URL`)
//! - `WEB_BASE_URL` - Public URL of the site
//!
//! ## Optional
//! - `WEB_HOST` - Bind address (default: 127.0.0.1)
//! - `WEB_PORT` - Listen port (default: 3000)
//! - `WEB_STAGING_DIR` - Directory for photos awaiting checkout (default: `var/staging`)
//! - `CHECKOUT_FIXED_AMOUNT` - Charge this amount instead of the package price
//! - `AUTH_REDIRECT_PATH` - Where the sign-in widget sends visitors (default: `/onboarding`)
//! - `OUTBOX_DRAIN_INTERVAL_SECS` - Outbox replay interval (default: 30)
//! - `SUPABASE_URL` + `SUPABASE_ANON_KEY` - Hosted store (both or neither)
//! - `PAYPAL_CLIENT_ID` + `PAYPAL_SECRET_KEY` - Payment provider credentials
//! - `PAYPAL_API_BASE` - Payment provider API (default: sandbox)
//! - `CLERK_PUBLISHABLE_KEY` - Identity widget key
//! - `CLERK_WEBHOOK_SECRET` - Identity webhook signing secret (`whsec_...`)
//! - `META_PIXEL_ID` - Meta (Facebook) pixel ID
//! - `REDDIT_PIXEL_ID` - Reddit pixel ID
//! - `REDDIT_CONVERSION_TOKEN` - Reddit Conversions API access token
//! - `REDDIT_CONVERSION_API_URL` - Reddit Conversions API endpoint
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//!
//! Missing optional groups are not a startup error. Calls that need them fail
//! with a configuration error when they are made.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use match_magnet_core::{CurrencyCode, Money};
use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

pub const DEFAULT_PAYPAL_API_BASE: &str = "https://api-m.sandbox.paypal.com";
pub const DEFAULT_REDDIT_CONVERSION_API_URL: &str =
    "https://ads-api.reddit.com/api/v2.0/conversions";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "your_",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Web application configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the site
    pub base_url: String,
    /// Where photos posted with the onboarding form wait for capture
    pub staging_dir: PathBuf,
    /// Checkout amount policy
    pub checkout: CheckoutConfig,
    /// Hosted store credentials, if configured
    pub supabase: Option<SupabaseConfig>,
    /// Payment provider configuration
    pub paypal: PayPalConfig,
    /// Identity provider configuration
    pub clerk: ClerkConfig,
    /// Pixel and conversion API configuration
    pub analytics: AnalyticsConfig,
    /// How often the outbox drainer wakes up
    pub outbox_drain_interval: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Checkout settings.
#[derive(Debug, Clone, Default)]
pub struct CheckoutConfig {
    /// Overrides the package price when set (live testing).
    pub fixed_amount: Option<Money>,
}

/// Hosted store (Supabase) configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abc.supabase.co`
    pub url: String,
    /// Anonymous API key
    pub anon_key: SecretString,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .finish()
    }
}

/// Payment provider (`PayPal`) configuration.
#[derive(Debug, Clone)]
pub struct PayPalConfig {
    /// REST API base URL
    pub api_base: String,
    /// Client credentials, if configured
    pub credentials: Option<PayPalCredentials>,
}

/// `PayPal` REST client credentials.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct PayPalCredentials {
    /// OAuth client ID (also used by the browser SDK)
    pub client_id: String,
    /// OAuth client secret
    pub secret_key: SecretString,
}

impl std::fmt::Debug for PayPalCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayPalCredentials")
            .field("client_id", &self.client_id)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Identity provider (Clerk) configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct ClerkConfig {
    /// Publishable key for the sign-in widget
    pub publishable_key: Option<String>,
    /// Webhook signing secret
    pub webhook_secret: Option<SecretString>,
    /// Local path visitors land on after signing in
    pub redirect_path: String,
}

impl std::fmt::Debug for ClerkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClerkConfig")
            .field("publishable_key", &self.publishable_key)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_path", &self.redirect_path)
            .finish()
    }
}

/// Analytics tracking pixel and conversion API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct AnalyticsConfig {
    /// Meta (Facebook) pixel ID
    pub meta_pixel_id: Option<String>,
    /// Reddit pixel ID
    pub reddit_pixel_id: Option<String>,
    /// Reddit Conversions API access token
    pub reddit_conversion_token: Option<SecretString>,
    /// Reddit Conversions API endpoint
    pub reddit_conversion_api_url: String,
}

impl std::fmt::Debug for AnalyticsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsConfig")
            .field("meta_pixel_id", &self.meta_pixel_id)
            .field("reddit_pixel_id", &self.reddit_pixel_id)
            .field(
                "reddit_conversion_token",
                &self.reddit_conversion_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("reddit_conversion_api_url", &self.reddit_conversion_api_url)
            .finish()
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            meta_pixel_id: None,
            reddit_pixel_id: None,
            reddit_conversion_token: None,
            reddit_conversion_api_url: DEFAULT_REDDIT_CONVERSION_API_URL.to_string(),
        }
    }
}

/// Variable lookup used while loading; the process environment in production.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl WebConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(&|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`WebConfig::from_env`].
    pub fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let database_url = env("WEB_DATABASE_URL")
            .or_else(|| env("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("WEB_DATABASE_URL".to_string()))?;
        let host = parse_env(env, "WEB_HOST", "127.0.0.1")?;
        let port = parse_env(env, "WEB_PORT", "3000")?;
        let base_url = get_required_env(env, "WEB_BASE_URL")?;
        url::Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("WEB_BASE_URL".to_string(), e.to_string()))?;
        let staging_dir = PathBuf::from(get_env_or_default(env, "WEB_STAGING_DIR", "var/staging"));
        let drain_secs: u64 = parse_env(env, "OUTBOX_DRAIN_INTERVAL_SECS", "30")?;
        if drain_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "OUTBOX_DRAIN_INTERVAL_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            host,
            port,
            base_url: base_url.trim_end_matches('/').to_string(),
            staging_dir,
            checkout: CheckoutConfig::from_lookup(env)?,
            supabase: SupabaseConfig::from_lookup(env)?,
            paypal: PayPalConfig::from_lookup(env)?,
            clerk: ClerkConfig::from_lookup(env)?,
            analytics: AnalyticsConfig::from_lookup(env)?,
            outbox_drain_interval: Duration::from_secs(drain_secs),
            sentry_dsn: env("SENTRY_DSN"),
            sentry_environment: env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the site is served over HTTPS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl CheckoutConfig {
    fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let fixed_amount = env("CHECKOUT_FIXED_AMOUNT")
            .map(|raw| {
                Money::parse_value(&raw, CurrencyCode::USD).map_err(|e| {
                    ConfigError::InvalidEnvVar("CHECKOUT_FIXED_AMOUNT".to_string(), e.to_string())
                })
            })
            .transpose()?;
        Ok(Self { fixed_amount })
    }
}

impl SupabaseConfig {
    fn from_lookup(env: Lookup<'_>) -> Result<Option<Self>, ConfigError> {
        match (env("SUPABASE_URL"), env("SUPABASE_ANON_KEY")) {
            (None, None) => Ok(None),
            (Some(url), Some(key)) => {
                url::Url::parse(&url).map_err(|e| {
                    ConfigError::InvalidEnvVar("SUPABASE_URL".to_string(), e.to_string())
                })?;
                validate_secret_strength(&key, "SUPABASE_ANON_KEY")?;
                Ok(Some(Self {
                    url: url.trim_end_matches('/').to_string(),
                    anon_key: SecretString::from(key),
                }))
            }
            (Some(_), None) => Err(ConfigError::MissingEnvVar("SUPABASE_ANON_KEY".to_string())),
            (None, Some(_)) => Err(ConfigError::MissingEnvVar("SUPABASE_URL".to_string())),
        }
    }
}

impl PayPalConfig {
    fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let credentials = match (env("PAYPAL_CLIENT_ID"), env("PAYPAL_SECRET_KEY")) {
            (None, None) => None,
            (Some(client_id), Some(secret)) => {
                validate_secret_strength(&secret, "PAYPAL_SECRET_KEY")?;
                Some(PayPalCredentials {
                    client_id,
                    secret_key: SecretString::from(secret),
                })
            }
            (Some(_), None) => {
                return Err(ConfigError::MissingEnvVar("PAYPAL_SECRET_KEY".to_string()));
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingEnvVar("PAYPAL_CLIENT_ID".to_string()));
            }
        };

        Ok(Self {
            api_base: get_env_or_default(env, "PAYPAL_API_BASE", DEFAULT_PAYPAL_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            credentials,
        })
    }
}

impl ClerkConfig {
    fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let redirect_path = get_env_or_default(env, "AUTH_REDIRECT_PATH", "/onboarding");
        if !crate::identity::is_local_path(&redirect_path) {
            return Err(ConfigError::InvalidEnvVar(
                "AUTH_REDIRECT_PATH".to_string(),
                "must be a local absolute path such as /onboarding".to_string(),
            ));
        }

        Ok(Self {
            publishable_key: env("CLERK_PUBLISHABLE_KEY"),
            webhook_secret: get_optional_validated_secret(env, "CLERK_WEBHOOK_SECRET")?,
            redirect_path,
        })
    }
}

impl AnalyticsConfig {
    fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            meta_pixel_id: env("META_PIXEL_ID"),
            reddit_pixel_id: env("REDDIT_PIXEL_ID"),
            reddit_conversion_token: get_optional_validated_secret(env, "REDDIT_CONVERSION_TOKEN")?,
            reddit_conversion_api_url: get_env_or_default(
                env,
                "REDDIT_CONVERSION_API_URL",
                DEFAULT_REDDIT_CONVERSION_API_URL,
            ),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(env: Lookup<'_>, key: &str) -> Result<String, ConfigError> {
    env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(env: Lookup<'_>, key: &str, default: &str) -> String {
    env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to a default.
fn parse_env<T>(env: Lookup<'_>, key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(env, key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the value issued by the provider."
            ),
        ));
    }

    Ok(())
}

/// Load and validate an optional secret.
fn get_optional_validated_secret(
    env: Lookup<'_>,
    key: &str,
) -> Result<Option<SecretString>, ConfigError> {
    env(key)
        .map(|value| {
            validate_secret_strength(&value, key)?;
            Ok(SecretString::from(value))
        })
        .transpose()
}
