//! Status enums for funnel records.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Payment record status.
///
/// A record written on capture is always [`PaymentStatus::Completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Completed,
    Pending,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two kinds of visitor uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    ProfilePhoto,
    Screenshot,
}

impl ImageKind {
    pub const ALL: [Self; 2] = [Self::ProfilePhoto, Self::Screenshot];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProfilePhoto => "profile_photo",
            Self::Screenshot => "screenshot",
        }
    }

    /// Object storage bucket holding files of this kind.
    #[must_use]
    pub const fn bucket(&self) -> &'static str {
        match self {
            Self::ProfilePhoto => "profile-photos",
            Self::Screenshot => "screenshots",
        }
    }

    /// Multipart field name used by the onboarding form.
    #[must_use]
    pub const fn form_field(&self) -> &'static str {
        match self {
            Self::ProfilePhoto => "photos",
            Self::Screenshot => "screenshots",
        }
    }

    /// Resolve a multipart field name back to a kind.
    #[must_use]
    pub fn from_form_field(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.form_field() == name)
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_wire_format() {
        let json = serde_json::to_string(&PaymentStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        assert_eq!(PaymentStatus::default(), PaymentStatus::Completed);
        assert_eq!(PaymentStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_image_kind_buckets() {
        assert_eq!(ImageKind::ProfilePhoto.bucket(), "profile-photos");
        assert_eq!(ImageKind::Screenshot.bucket(), "screenshots");
        assert_eq!(
            serde_json::to_string(&ImageKind::ProfilePhoto).unwrap(),
            "\"profile_photo\""
        );
    }

    #[test]
    fn test_image_kind_form_fields() {
        assert_eq!(
            ImageKind::from_form_field("photos"),
            Some(ImageKind::ProfilePhoto)
        );
        assert_eq!(
            ImageKind::from_form_field("screenshots"),
            Some(ImageKind::Screenshot)
        );
        assert_eq!(ImageKind::from_form_field("avatar"), None);
    }
}
