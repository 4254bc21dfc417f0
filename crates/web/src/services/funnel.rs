//! The payment -> onboarding -> photos sequence.
//!
//! Nothing is written before the order is captured. After capture the
//! payment row, the onboarding row and one metadata row per uploaded photo
//! are written in that order, all sharing the same `payment_id`.
//!
//! Once money has been taken the sequence only moves forward: a row the
//! hosted store does not take is parked in the outbox, whatever the reason,
//! and the visitor still sees success. Transient failures are replayed by
//! the drainer; rejected rows end up in `mm-cli outbox status` for review.
//!
//! Photo uploads are not rolled back: when some uploads fail the others
//! keep their metadata rows and the failed file names are reported so the
//! visitor can send them again.

use std::sync::Arc;

use futures::future::join_all;
use match_magnet_core::{ImageKind, Money, PaymentId, PricingPackage};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use super::outbox::Outbox;
use super::staging::{PhotoStaging, StagingError, check_files};
use crate::hosted_store::{HostedStore, IMAGES_TABLE, ONBOARDING_TABLE, PAYMENTS_TABLE};
use crate::models::{
    ImageRecord, OnboardingDraft, OnboardingRecord, PaymentRecord, UploadFile, ValidationError,
};
use crate::paypal::{
    AmountPolicy, CapturedPayment, CheckoutError, CreatedOrder, OrderRequest, PayPalError,
    PaymentGateway,
};

/// Errors from the funnel sequence.
#[derive(Debug, Error)]
pub enum FunnelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("payment error: {0}")]
    Payment(#[from] PayPalError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Staging(#[from] StagingError),
}

/// Where a record ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The hosted store returned the stored row.
    Stored(Value),
    /// Parked in the outbox under this id.
    Queued(i64),
    /// Neither the hosted store nor the outbox took the row. Logged as an
    /// error with its ids so it can be rebuilt from the provider's records.
    Unrecorded,
}

impl WriteOutcome {
    /// Whether the row is not in the hosted store yet.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        !matches!(self, Self::Stored(_))
    }
}

/// Result of uploading a batch of photos.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub stored: Vec<ImageRecord>,
    /// File names whose upload or metadata write failed.
    pub failed: Vec<String>,
    /// Metadata rows parked in the outbox.
    pub queued: usize,
}

/// Result of a completed checkout.
#[derive(Debug, Clone)]
pub struct Completion {
    pub payment_id: PaymentId,
    pub capture: CapturedPayment,
    pub queued: bool,
    pub uploads: UploadReport,
}

/// Runs the funnel against the hosted store, the outbox and the gateway.
#[derive(Clone)]
pub struct FunnelService {
    store: Arc<dyn HostedStore>,
    outbox: Arc<dyn Outbox>,
    gateway: Arc<dyn PaymentGateway>,
    staging: PhotoStaging,
    amounts: AmountPolicy,
}

impl FunnelService {
    #[must_use]
    pub fn new(
        store: Arc<dyn HostedStore>,
        outbox: Arc<dyn Outbox>,
        gateway: Arc<dyn PaymentGateway>,
        staging: PhotoStaging,
        amounts: AmountPolicy,
    ) -> Self {
        Self {
            store,
            outbox,
            gateway,
            staging,
            amounts,
        }
    }

    #[must_use]
    pub const fn amounts(&self) -> &AmountPolicy {
        &self.amounts
    }

    #[must_use]
    pub const fn staging(&self) -> &PhotoStaging {
        &self.staging
    }

    /// Client id for the browser payment SDK, when payments are live.
    #[must_use]
    pub fn payment_client_id(&self) -> Option<&str> {
        self.gateway.client_id()
    }

    /// Insert a record, parking it in the outbox when the store does not
    /// take it. Never fails: the record belongs to a payment that has
    /// already been captured.
    async fn write_or_park<T: Serialize>(&self, table: &str, record: &T) -> WriteOutcome {
        let row = match serde_json::to_value(record) {
            Ok(row) => row,
            Err(e) => {
                error!(table, error = %e, "Record could not be serialized");
                return WriteOutcome::Unrecorded;
            }
        };

        let store_error = match self.store.insert(table, row.clone()).await {
            Ok(stored) => return WriteOutcome::Stored(stored),
            Err(e) => e,
        };

        match self.outbox.enqueue(table, &row).await {
            Ok(id) if store_error.is_transient() => {
                warn!(table, outbox_id = id, error = %store_error, "Hosted store unavailable, row queued");
                WriteOutcome::Queued(id)
            }
            Ok(id) => {
                error!(table, outbox_id = id, error = %store_error, "Hosted store rejected row, parked for review");
                WriteOutcome::Queued(id)
            }
            Err(outbox_error) => {
                error!(
                    table,
                    payment_id = ?row.get("payment_id"),
                    order_id = ?row.get("order_id"),
                    store_error = %store_error,
                    outbox_error = %outbox_error,
                    "Record lost: neither the hosted store nor the outbox took it"
                );
                WriteOutcome::Unrecorded
            }
        }
    }

    /// Store a payment record.
    #[instrument(skip_all, fields(payment_id = %record.payment_id))]
    pub async fn record_payment(&self, record: &PaymentRecord) -> WriteOutcome {
        self.write_or_park(PAYMENTS_TABLE, record).await
    }

    /// Store an onboarding record.
    #[instrument(skip_all, fields(payment_id = %record.payment_id))]
    pub async fn store_onboarding(&self, record: &OnboardingRecord) -> WriteOutcome {
        self.write_or_park(ONBOARDING_TABLE, record).await
    }

    /// Upload photos in parallel, then write one metadata row per success.
    ///
    /// Individual failures are reported, not returned as errors.
    #[instrument(skip_all, fields(payment_id = %payment_id, count = files.len()))]
    pub async fn upload_images(
        &self,
        payment_id: PaymentId,
        files: Vec<UploadFile>,
    ) -> UploadReport {
        let millis = chrono::Utc::now().timestamp_millis();

        let uploads = files.into_iter().enumerate().map(|(index, file)| async move {
            let path = file.storage_path(payment_id, index, millis);
            let result = self
                .store
                .upload(file.kind.bucket(), &path, &file.content_type, file.bytes.clone())
                .await;
            (file, result)
        });

        let mut report = UploadReport::default();
        for (file, result) in join_all(uploads).await {
            let url = match result {
                Ok(url) => url,
                Err(e) => {
                    warn!(file_name = %file.file_name, error = %e, "Photo upload failed");
                    report.failed.push(file.file_name);
                    continue;
                }
            };

            let record = ImageRecord::for_upload(payment_id, &file, url);
            match self.write_or_park(IMAGES_TABLE, &record).await {
                WriteOutcome::Stored(_) => report.stored.push(record),
                WriteOutcome::Queued(_) => {
                    report.queued += 1;
                    report.stored.push(record);
                }
                WriteOutcome::Unrecorded => report.failed.push(file.file_name),
            }
        }

        info!(
            stored = report.stored.len(),
            failed = report.failed.len(),
            "Photo batch processed"
        );
        report
    }

    /// Check and upload photos sent after checkout.
    ///
    /// # Errors
    ///
    /// Fails when the batch breaks the upload limits.
    pub async fn reupload_images(
        &self,
        payment_id: PaymentId,
        files: Vec<UploadFile>,
    ) -> Result<UploadReport, FunnelError> {
        check_files(&files)?;
        Ok(self.upload_images(payment_id, files).await)
    }

    /// Write the payment and onboarding rows, then upload the photos.
    ///
    /// Returns whether any row was deferred, and the upload report.
    pub async fn complete(
        &self,
        payment: &PaymentRecord,
        onboarding: &OnboardingRecord,
        files: Vec<UploadFile>,
    ) -> (bool, UploadReport) {
        let payment_outcome = self.record_payment(payment).await;
        let onboarding_outcome = self.store_onboarding(onboarding).await;
        let uploads = self.upload_images(payment.payment_id, files).await;

        let queued = payment_outcome.is_deferred()
            || onboarding_outcome.is_deferred()
            || uploads.queued > 0;
        (queued, uploads)
    }

    /// Create a provider order for a package.
    ///
    /// # Errors
    ///
    /// Fails when the provider is unavailable or refuses the order.
    #[instrument(skip_all, fields(package = package.id))]
    pub async fn create_order(
        &self,
        package: &PricingPackage,
    ) -> Result<(CreatedOrder, Money), FunnelError> {
        let amount = self.amounts.amount_for(package);
        let request = OrderRequest {
            reference_id: package.id.to_string(),
            description: package.name.to_string(),
            amount,
        };
        let order = self.gateway.create_order(&request).await?;
        info!(order_id = %order.id, amount = %amount, "Order created");
        Ok((order, amount))
    }

    /// Capture an approved order. Nothing is written here, so a failed
    /// capture leaves no trace in the hosted store.
    ///
    /// # Errors
    ///
    /// Fails when the provider is unavailable or refuses the capture.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub async fn capture(&self, order_id: &str) -> Result<CapturedPayment, FunnelError> {
        let capture = self.gateway.capture_order(order_id).await?;
        info!(capture_id = %capture.capture_id, amount = %capture.amount, "Order captured");
        Ok(capture)
    }

    /// Record the submission behind a captured order.
    ///
    /// Staged photos are removed afterwards. Rows the store does not take
    /// are parked (see [`Completion::queued`]), so this cannot fail.
    #[instrument(skip_all, fields(payment_id = %payment_id, package = package.id))]
    pub async fn record_capture(
        &self,
        payment_id: PaymentId,
        capture: CapturedPayment,
        package: &PricingPackage,
        draft: &OnboardingDraft,
    ) -> Completion {
        let payment = PaymentRecord::from_capture(
            payment_id,
            &capture,
            package,
            Some(&draft.profile.email),
            Some(&draft.profile.name),
        );
        let counts = |kind: ImageKind| {
            u32::try_from(draft.files.iter().filter(|f| f.kind == kind).count()).unwrap_or(u32::MAX)
        };
        let onboarding = OnboardingRecord::new(
            payment_id,
            draft.profile.clone(),
            counts(ImageKind::ProfilePhoto),
            counts(ImageKind::Screenshot),
        );

        let files = match self.staging.load(draft.draft_id, &draft.files).await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Staged photos unavailable, completing without them");
                Vec::new()
            }
        };
        let missing: Vec<String> = if files.len() < draft.files.len() {
            draft.files.iter().map(|f| f.file_name.clone()).collect()
        } else {
            Vec::new()
        };

        let (queued, mut uploads) = self.complete(&payment, &onboarding, files).await;
        uploads.failed.extend(missing);

        if let Err(e) = self.staging.discard(draft.draft_id).await {
            warn!(error = %e, "Failed to remove staged photos");
        }

        info!(
            payment_id = %payment_id,
            queued,
            failed_uploads = uploads.failed.len(),
            "Checkout completed"
        );
        Completion {
            payment_id,
            capture,
            queued,
            uploads,
        }
    }
}
