//! In-memory adapters and fixtures for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::Utc;
use match_magnet_core::PricingPackage;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;

use crate::analytics::{ConversionError, ConversionEvent, ConversionSink};
use crate::config::WebConfig;
use crate::hosted_store::{HostedStore, StoreError};
use crate::paypal::{CapturedPayment, CreatedOrder, OrderRequest, PayPalError, PaymentGateway};
use crate::services::outbox::{MAX_ATTEMPTS, OutboxEntry};
use crate::services::{Outbox, OutboxError, OutboxStats};
use crate::state::{Adapters, AppState};

// =============================================================================
// Hosted store
// =============================================================================

/// Hosted store keeping rows and uploads in memory.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, Vec<Value>>>,
    uploads: Mutex<Vec<String>>,
    insert_calls: AtomicUsize,
    insert_failure: Mutex<Option<fn() -> StoreError>>,
    failing_upload: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.rows
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every insert and probe fail with the given error.
    pub fn fail_inserts_with(&self, error: fn() -> StoreError) {
        *self.insert_failure.lock().unwrap() = Some(error);
    }

    pub fn recover(&self) {
        *self.insert_failure.lock().unwrap() = None;
    }

    /// Make uploads whose path ends with `suffix` fail.
    pub fn fail_uploads_named(&self, suffix: &str) {
        *self.failing_upload.lock().unwrap() = Some(suffix.to_string());
    }

    /// Insert attempts, failed ones included.
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Paths of successful uploads.
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    fn failure(&self) -> Option<StoreError> {
        self.insert_failure.lock().unwrap().map(|make| make())
    }
}

#[async_trait]
impl HostedStore for MemoryStore {
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure() {
            return Err(err);
        }
        self.rows
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn delete_where(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        if let Some(err) = self.failure() {
            return Err(err);
        }
        if let Some(rows) = self.rows.lock().unwrap().get_mut(table) {
            rows.retain(|row| row[column].as_str() != Some(value));
        }
        Ok(())
    }

    async fn probe(&self, _table: &str) -> Result<(), StoreError> {
        self.failure().map_or(Ok(()), Err)
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        _content_type: &str,
        _bytes: Bytes,
    ) -> Result<String, StoreError> {
        let failing = self.failing_upload.lock().unwrap().clone();
        if failing.is_some_and(|suffix| path.ends_with(&suffix)) {
            return Err(StoreError::Api {
                status: 500,
                message: "upload failed".to_string(),
            });
        }
        self.uploads.lock().unwrap().push(path.to_string());
        Ok(format!("https://store.test/storage/v1/object/public/{bucket}/{path}"))
    }
}

// =============================================================================
// Outbox
// =============================================================================

struct MemoryRow {
    entry: OutboxEntry,
    delivered: bool,
}

/// Outbox keeping rows in memory.
#[derive(Default)]
pub struct MemoryOutbox {
    rows: Mutex<Vec<MemoryRow>>,
    next_id: AtomicI64,
    refuse: AtomicBool,
}

impl MemoryOutbox {
    /// Rows ever enqueued.
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Payloads of every enqueued row for `table`.
    pub fn payloads(&self, table: &str) -> Vec<Value> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.entry.target_table == table)
            .map(|row| row.entry.payload.clone())
            .collect()
    }

    /// Refuse every enqueue from now on.
    pub fn refuse_enqueues(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

const fn is_pending(row: &MemoryRow) -> bool {
    !row.delivered && row.entry.attempts < MAX_ATTEMPTS
}

#[async_trait]
impl Outbox for MemoryOutbox {
    async fn enqueue(&self, target_table: &str, payload: &Value) -> Result<i64, OutboxError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(OutboxError::Database(sqlx::Error::PoolTimedOut));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.rows.lock().unwrap().push(MemoryRow {
            entry: OutboxEntry {
                id,
                target_table: target_table.to_string(),
                payload: payload.clone(),
                attempts: 0,
                last_error: None,
                created_at: Utc::now(),
            },
            delivered: false,
        });
        Ok(id)
    }

    async fn claim_pending(&self, limit: i64) -> Result<Vec<OutboxEntry>, OutboxError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| is_pending(row))
            .take(limit)
            .map(|row| row.entry.clone())
            .collect())
    }

    async fn mark_delivered(&self, id: i64) -> Result<(), OutboxError> {
        if let Some(row) = self.rows.lock().unwrap().iter_mut().find(|r| r.entry.id == id) {
            row.delivered = true;
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        permanent: bool,
    ) -> Result<(), OutboxError> {
        if let Some(row) = self.rows.lock().unwrap().iter_mut().find(|r| r.entry.id == id) {
            row.entry.attempts += 1;
            if permanent {
                row.entry.attempts = row.entry.attempts.max(MAX_ATTEMPTS);
            }
            row.entry.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn stats(&self) -> Result<OutboxStats, OutboxError> {
        let rows = self.rows.lock().unwrap();
        let count = |f: &dyn Fn(&MemoryRow) -> bool| {
            i64::try_from(rows.iter().filter(|r| f(r)).count()).unwrap()
        };
        Ok(OutboxStats {
            pending: count(&is_pending),
            stuck: count(&|r| !r.delivered && r.entry.attempts >= MAX_ATTEMPTS),
            delivered: count(&|r| r.delivered),
        })
    }

    async fn stuck(&self, limit: i64) -> Result<Vec<OutboxEntry>, OutboxError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| !r.delivered && r.entry.attempts >= MAX_ATTEMPTS)
            .take(limit)
            .map(|r| r.entry.clone())
            .collect())
    }
}

// =============================================================================
// Payment gateway
// =============================================================================

/// Gateway that approves every order unless told otherwise.
#[derive(Default)]
pub struct FakeGateway {
    orders: Mutex<Vec<OrderRequest>>,
    fail_captures: AtomicBool,
}

impl FakeGateway {
    pub fn fail_captures(&self) {
        self.fail_captures.store(true, Ordering::SeqCst);
    }

    pub fn last_order(&self) -> Option<OrderRequest> {
        self.orders.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn client_id(&self) -> Option<&str> {
        Some("test-client-id")
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<CreatedOrder, PayPalError> {
        let mut orders = self.orders.lock().unwrap();
        orders.push(request.clone());
        Ok(CreatedOrder {
            id: format!("ORDER-{}", orders.len()),
            status: "CREATED".to_string(),
        })
    }

    async fn capture_order(&self, order_id: &str) -> Result<CapturedPayment, PayPalError> {
        if self.fail_captures.load(Ordering::SeqCst) {
            return Err(PayPalError::Api {
                status: 422,
                message: "INSTRUMENT_DECLINED".to_string(),
            });
        }
        let last = self.last_order();
        Ok(CapturedPayment {
            order_id: order_id.to_string(),
            capture_id: format!("CAPTURE-{order_id}"),
            amount: last
                .as_ref()
                .map_or_else(|| PricingPackage::default_package().price, |o| o.amount),
            reference_id: last.map(|o| o.reference_id),
            payer_email: Some("payer@example.com".to_string()),
            payer_name: Some("Pat Payer".to_string()),
        })
    }
}

// =============================================================================
// Conversions
// =============================================================================

/// Conversion sink that records what it was sent.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ConversionEvent>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn events(&self) -> Vec<ConversionEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversionSink for RecordingSink {
    async fn send(&self, event: &ConversionEvent) -> Result<(), ConversionError> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ConversionError::Api {
                status: 401,
                message: "invalid token".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Application state
// =============================================================================

/// Configuration with only the required variables set.
pub fn test_config() -> WebConfig {
    test_config_with(&[])
}

/// Test configuration plus extra environment variables.
pub fn test_config_with(extra: &[(&str, &str)]) -> WebConfig {
    let staging = std::env::temp_dir().join(format!("mm-web-{}", uuid::Uuid::new_v4()));
    let staging = staging.to_string_lossy().into_owned();
    let mut vars: HashMap<&str, String> = [
        ("WEB_DATABASE_URL", "postgres://localhost/match_magnet_test".to_string()),
        ("WEB_BASE_URL", "http://localhost:3000".to_string()),
        ("WEB_STAGING_DIR", staging),
    ]
    .into_iter()
    .collect();
    vars.extend(extra.iter().map(|(key, value)| (*key, (*value).to_string())));
    WebConfig::from_lookup(&|key| vars.get(key).cloned()).unwrap()
}

/// Fakes wired into an [`AppState`], kept for assertions.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub outbox: Arc<MemoryOutbox>,
    pub gateway: Arc<FakeGateway>,
    pub sink: Arc<RecordingSink>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// State over a lazily connected pool; nothing touches the database
    /// unless a handler queries it.
    pub fn with_config(config: WebConfig) -> Self {
        Self::build(config, RecordingSink::default())
    }

    /// Conversions API that rejects every event.
    pub fn with_failing_conversions() -> Self {
        Self::build(test_config(), RecordingSink::failing())
    }

    fn build(config: WebConfig, sink: RecordingSink) -> Self {
        let store = Arc::new(MemoryStore::default());
        let outbox = Arc::new(MemoryOutbox::default());
        let gateway = Arc::new(FakeGateway::default());
        let sink = Arc::new(sink);
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/match_magnet_test")
            .unwrap();
        let state = AppState::from_parts(
            config,
            pool,
            Adapters {
                store: store.clone(),
                outbox: outbox.clone(),
                gateway: gateway.clone(),
                conversions: sink.clone(),
            },
        )
        .unwrap();
        Self {
            state,
            store,
            outbox,
            gateway,
            sink,
        }
    }
}
