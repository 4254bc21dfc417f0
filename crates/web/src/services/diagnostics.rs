//! Hosted store round trip shared by `/api/test-supabase` and `mm-cli diagnose`.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::hosted_store::{HostedStore, PAYMENTS_TABLE, StoreError};
use crate::models::NewPayment;

/// The step of the round trip that failed.
#[derive(Debug, Error)]
pub enum DiagnosticError {
    #[error("Database connection failed: {0}")]
    Connection(StoreError),

    #[error("Data insertion failed: {0}")]
    Insert(String),

    #[error("Test data cleanup failed: {0}")]
    Cleanup(StoreError),
}

impl DiagnosticError {
    /// Step name safe to show to clients.
    #[must_use]
    pub const fn step(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Database connection failed",
            Self::Insert(_) => "Data insertion failed",
            Self::Cleanup(_) => "Test data cleanup failed",
        }
    }
}

/// Probe `payments`, insert a throwaway payment and delete it again.
///
/// Returns the id of the deleted test payment.
///
/// # Errors
///
/// Returns the first step that failed.
pub async fn store_round_trip(store: &dyn HostedStore) -> Result<String, DiagnosticError> {
    store
        .probe(PAYMENTS_TABLE)
        .await
        .map_err(DiagnosticError::Connection)?;

    let payment = NewPayment {
        order_id: Some(format!(
            "test_deployed_{}",
            chrono::Utc::now().timestamp_millis()
        )),
        amount: Some(Decimal::new(100, 2)),
        currency: Some("USD".to_string()),
        package_id: Some("test_package".to_string()),
        package_name: Some("Deployed Test Package".to_string()),
        customer_email: Some("test@example.com".to_string()),
        customer_name: Some("Deployed Test User".to_string()),
        ..NewPayment::default()
    };
    let record = payment
        .validate()
        .map_err(|e| DiagnosticError::Insert(e.to_string()))?;
    let row = serde_json::to_value(&record).map_err(|e| DiagnosticError::Insert(e.to_string()))?;
    store
        .insert(PAYMENTS_TABLE, row)
        .await
        .map_err(|e| DiagnosticError::Insert(e.to_string()))?;

    let payment_id = record.payment_id.to_string();
    store
        .delete_where(PAYMENTS_TABLE, "payment_id", &payment_id)
        .await
        .map_err(DiagnosticError::Cleanup)?;

    Ok(payment_id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::hosted_store::UnconfiguredStore;

    #[tokio::test]
    async fn test_unconfigured_store_fails_first_step() {
        let err = store_round_trip(&UnconfiguredStore).await.unwrap_err();
        assert!(matches!(err, DiagnosticError::Connection(StoreError::NotConfigured)));
        assert_eq!(err.step(), "Database connection failed");
    }
}
