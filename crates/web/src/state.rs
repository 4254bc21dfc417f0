//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

use crate::analytics::{ConversionError, ConversionSink, PixelSettings, RedditConversions};
use crate::config::WebConfig;
use crate::content::ContentStore;
use crate::db::PgOutbox;
use crate::hosted_store::{self, HostedStore, StoreError};
use crate::identity::{WebhookError, WebhookVerifier, WidgetConfig};
use crate::paypal::{self, AmountPolicy, PayPalError, PaymentGateway};
use crate::services::{FunnelService, Outbox, PhotoStaging};

/// Error building the application state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("hosted store client: {0}")]
    Store(#[from] StoreError),
    #[error("payment client: {0}")]
    Payment(#[from] PayPalError),
    #[error("conversion client: {0}")]
    Conversions(#[from] ConversionError),
    #[error("webhook secret: {0}")]
    Webhook(#[from] WebhookError),
}

/// External adapters the handlers talk to.
///
/// Production wiring comes from [`AppState::new`]; tests pass fakes to
/// [`AppState::from_parts`].
pub struct Adapters {
    pub store: Arc<dyn HostedStore>,
    pub outbox: Arc<dyn Outbox>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub conversions: Arc<dyn ConversionSink>,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: WebConfig,
    pool: PgPool,
    store: Arc<dyn HostedStore>,
    outbox: Arc<dyn Outbox>,
    conversions: Arc<dyn ConversionSink>,
    funnel: FunnelService,
    pixels: PixelSettings,
    widget: Option<WidgetConfig>,
    webhook_verifier: Option<WebhookVerifier>,
    content: ContentStore,
}

impl AppState {
    /// Create the application state with the real adapters.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built or the webhook
    /// secret is malformed.
    pub fn new(config: WebConfig, pool: PgPool) -> Result<Self, StateError> {
        let adapters = Adapters {
            store: hosted_store::from_config(config.supabase.as_ref())?,
            outbox: Arc::new(PgOutbox::new(pool.clone())),
            gateway: paypal::from_config(&config.paypal)?,
            conversions: Arc::new(RedditConversions::new(&config.analytics)?),
        };
        Self::from_parts(config, pool, adapters)
    }

    /// Create the application state from explicit adapters.
    ///
    /// # Errors
    ///
    /// Returns an error if the webhook secret is malformed.
    pub fn from_parts(
        config: WebConfig,
        pool: PgPool,
        adapters: Adapters,
    ) -> Result<Self, StateError> {
        let funnel = FunnelService::new(
            adapters.store.clone(),
            adapters.outbox.clone(),
            adapters.gateway,
            PhotoStaging::new(config.staging_dir.clone()),
            AmountPolicy::new(config.checkout.fixed_amount),
        );
        let widget = config.clerk.publishable_key.as_deref().and_then(|key| {
            let widget = WidgetConfig::from_publishable_key(key);
            if widget.is_none() {
                tracing::warn!("CLERK_PUBLISHABLE_KEY is malformed, sign-in widget disabled");
            }
            widget
        });
        let webhook_verifier = config
            .clerk
            .webhook_secret
            .as_ref()
            .map(WebhookVerifier::new)
            .transpose()?;
        if webhook_verifier.is_none() {
            tracing::warn!(
                "CLERK_WEBHOOK_SECRET not set, identity webhooks are accepted unverified"
            );
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                pixels: PixelSettings::from_config(&config.analytics),
                content: ContentStore::new(),
                config,
                pool,
                store: adapters.store,
                outbox: adapters.outbox,
                conversions: adapters.conversions,
                funnel,
                widget,
                webhook_verifier,
            }),
        })
    }

    /// Get a reference to the web configuration.
    #[must_use]
    pub fn config(&self) -> &WebConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn HostedStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn outbox(&self) -> &Arc<dyn Outbox> {
        &self.inner.outbox
    }

    #[must_use]
    pub fn conversions(&self) -> &Arc<dyn ConversionSink> {
        &self.inner.conversions
    }

    #[must_use]
    pub fn funnel(&self) -> &FunnelService {
        &self.inner.funnel
    }

    #[must_use]
    pub fn pixels(&self) -> &PixelSettings {
        &self.inner.pixels
    }

    /// Sign-in widget settings, when the identity provider is configured.
    #[must_use]
    pub fn widget(&self) -> Option<&WidgetConfig> {
        self.inner.widget.as_ref()
    }

    #[must_use]
    pub fn webhook_verifier(&self) -> Option<&WebhookVerifier> {
        self.inner.webhook_verifier.as_ref()
    }

    /// Get a reference to the markdown content store.
    #[must_use]
    pub fn content(&self) -> &ContentStore {
        &self.inner.content
    }
}
