//! Uploaded photos and their metadata rows.

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use match_magnet_core::{ImageId, ImageKind, PaymentId};
use serde::{Deserialize, Serialize};

/// Longest file name kept in a storage path.
const MAX_FILE_NAME_CHARS: usize = 100;

/// A file waiting to be uploaded.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
    pub kind: ImageKind,
}

impl UploadFile {
    /// Object path: `payment-{payment_id}/{millis}-{index}-{file_name}`.
    #[must_use]
    pub fn storage_path(&self, payment_id: PaymentId, index: usize, millis: i64) -> String {
        format!(
            "payment-{payment_id}/{millis}-{index}-{}",
            sanitize_file_name(&self.file_name)
        )
    }
}

/// A row of the `images` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub payment_id: PaymentId,
    pub file_name: String,
    /// Public URL of the stored object.
    pub file_path: String,
    pub file_size: u64,
    pub file_type: String,
    pub image_type: ImageKind,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    #[must_use]
    pub fn for_upload(payment_id: PaymentId, file: &UploadFile, public_url: String) -> Self {
        Self {
            id: ImageId::generate(),
            payment_id,
            file_name: file.file_name.clone(),
            file_path: public_url,
            file_size: file.bytes.len() as u64,
            file_type: file.content_type.clone(),
            image_type: file.kind,
            created_at: Utc::now(),
        }
    }
}

/// Reduce a client file name to a safe object-key segment.
///
/// Directory parts are dropped; anything but ASCII letters, digits, `.`,
/// `-` and `_` becomes `_`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
