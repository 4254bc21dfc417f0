//! On-disk staging for photos posted with the onboarding form.
//!
//! Photos arrive before the visitor has paid, but may only be uploaded to
//! the hosted store once the order is captured. Until then they wait under
//! `{staging_dir}/{draft_id}/`.
//!
//! Drafts of visitors who never pay are removed by [`spawn_sweeper`] once
//! they are older than the session idle window.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use axum::body::Bytes;
use match_magnet_core::{DraftId, ImageKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::UploadFile;
use crate::models::image::sanitize_file_name;

/// Most files accepted per kind.
pub const MAX_FILES_PER_KIND: usize = 10;

/// Largest accepted file.
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// How often the sweeper looks for abandoned drafts.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Errors from checking or staging uploads.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("At most {max} {kind} files are allowed")]
    TooManyFiles { kind: ImageKind, max: usize },

    #[error("{file_name} is larger than 10 MB")]
    TooLarge { file_name: String },

    #[error("{file_name} is not an image")]
    NotAnImage { file_name: String },

    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StagingError {
    /// Whether the visitor's files, not the server, are at fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// A staged file, as remembered in the onboarding draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub kind: ImageKind,
    /// Name of the file inside the draft directory.
    pub stored_name: String,
}

/// Check kinds, sizes and counts of a batch of uploads.
///
/// # Errors
///
/// Returns the first rule the batch breaks.
pub fn check_files(files: &[UploadFile]) -> Result<(), StagingError> {
    for kind in ImageKind::ALL {
        if files.iter().filter(|f| f.kind == kind).count() > MAX_FILES_PER_KIND {
            return Err(StagingError::TooManyFiles {
                kind,
                max: MAX_FILES_PER_KIND,
            });
        }
    }

    for file in files {
        if !file.content_type.starts_with("image/") {
            return Err(StagingError::NotAnImage {
                file_name: file.file_name.clone(),
            });
        }
        if file.bytes.len() > MAX_FILE_BYTES {
            return Err(StagingError::TooLarge {
                file_name: file.file_name.clone(),
            });
        }
    }

    Ok(())
}

/// Photo staging area.
#[derive(Debug, Clone)]
pub struct PhotoStaging {
    root: PathBuf,
}

impl PhotoStaging {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn draft_dir(&self, draft_id: DraftId) -> PathBuf {
        self.root.join(draft_id.to_string())
    }

    /// Write a batch to the draft's directory, replacing earlier files.
    ///
    /// # Errors
    ///
    /// Fails if the batch breaks a rule of [`check_files`] or cannot be
    /// written.
    #[tracing::instrument(skip(self, files), fields(count = files.len()))]
    pub async fn stage(
        &self,
        draft_id: DraftId,
        files: &[UploadFile],
    ) -> Result<Vec<StagedFile>, StagingError> {
        check_files(files)?;
        self.discard(draft_id).await?;
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let dir = self.draft_dir(draft_id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut staged = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let stored_name = format!("{index}-{}", sanitize_file_name(&file.file_name));
            tokio::fs::write(dir.join(&stored_name), &file.bytes).await?;
            staged.push(StagedFile {
                file_name: file.file_name.clone(),
                content_type: file.content_type.clone(),
                size: file.bytes.len() as u64,
                kind: file.kind,
                stored_name,
            });
        }

        Ok(staged)
    }

    /// Read staged files back for upload.
    ///
    /// # Errors
    ///
    /// Fails if a staged file is missing or unreadable.
    pub async fn load(
        &self,
        draft_id: DraftId,
        staged: &[StagedFile],
    ) -> Result<Vec<UploadFile>, StagingError> {
        let dir = self.draft_dir(draft_id);
        let mut files = Vec::with_capacity(staged.len());
        for entry in staged {
            let bytes = tokio::fs::read(dir.join(Path::new(&entry.stored_name))).await?;
            files.push(UploadFile {
                file_name: entry.file_name.clone(),
                content_type: entry.content_type.clone(),
                bytes: Bytes::from(bytes),
                kind: entry.kind,
            });
        }
        Ok(files)
    }

    /// Remove a draft's files. Missing directories are fine.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors other than `NotFound`.
    pub async fn discard(&self, draft_id: DraftId) -> Result<(), StagingError> {
        match tokio::fs::remove_dir_all(self.draft_dir(draft_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove draft directories last written at least `max_age` ago.
    /// Entries that are not draft directories are left alone.
    ///
    /// Returns the number of drafts removed.
    ///
    /// # Errors
    ///
    /// Fails if the staging directory cannot be listed.
    #[tracing::instrument(skip(self))]
    pub async fn prune_older_than(&self, max_age: Duration) -> Result<usize, StagingError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let is_draft = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.parse::<DraftId>().is_ok());
            if !is_draft {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to prune draft");
                }
            }
        }
        Ok(removed)
    }
}

/// Prune abandoned drafts every `interval` until the process exits.
pub fn spawn_sweeper(
    staging: PhotoStaging,
    interval: Duration,
    max_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match staging.prune_older_than(max_age).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Pruned abandoned photo drafts"),
                Err(e) => tracing::error!(error = %e, "Staging sweep failed"),
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn image(name: &str, kind: ImageKind) -> UploadFile {
        UploadFile {
            file_name: name.to_string(),
            content_type: "image/png".to_string(),
            bytes: Bytes::from_static(b"\x89PNG"),
            kind,
        }
    }

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("mm-staging-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_check_limits() {
        let eleven: Vec<_> = (0..11)
            .map(|i| image(&format!("{i}.png"), ImageKind::ProfilePhoto))
            .collect();
        assert!(matches!(
            check_files(&eleven),
            Err(StagingError::TooManyFiles { .. })
        ));

        let mut pdf = image("resume.pdf", ImageKind::Screenshot);
        pdf.content_type = "application/pdf".to_string();
        assert!(matches!(
            check_files(&[pdf]),
            Err(StagingError::NotAnImage { .. })
        ));

        let mut huge = image("huge.png", ImageKind::Screenshot);
        huge.bytes = Bytes::from(vec![0_u8; MAX_FILE_BYTES + 1]);
        assert!(matches!(
            check_files(&[huge]),
            Err(StagingError::TooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_stage_load_discard() {
        let root = temp_root();
        let staging = PhotoStaging::new(&root);
        let draft_id = DraftId::generate();
        let files = vec![
            image("me.png", ImageKind::ProfilePhoto),
            image("chat.png", ImageKind::Screenshot),
        ];

        let staged = staging.stage(draft_id, &files).await.unwrap();
        assert_eq!(staged.len(), 2);
        assert_eq!(staged[1].stored_name, "1-chat.png");

        let loaded = staging.load(draft_id, &staged).await.unwrap();
        assert_eq!(loaded[0].bytes, files[0].bytes);
        assert_eq!(loaded[1].kind, ImageKind::Screenshot);

        staging.discard(draft_id).await.unwrap();
        assert!(staging.load(draft_id, &staged).await.is_err());
        staging.discard(draft_id).await.unwrap();

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn test_prune_removes_only_old_drafts() {
        let root = temp_root();
        let staging = PhotoStaging::new(&root);
        let draft_id = DraftId::generate();
        staging
            .stage(draft_id, &[image("me.png", ImageKind::ProfilePhoto)])
            .await
            .unwrap();
        tokio::fs::write(root.join("README"), b"keep").await.unwrap();
        tokio::fs::create_dir_all(root.join("not-a-draft")).await.unwrap();

        let week = Duration::from_secs(7 * 24 * 60 * 60);
        assert_eq!(staging.prune_older_than(week).await.unwrap(), 0);
        assert!(root.join(draft_id.to_string()).exists());

        assert_eq!(staging.prune_older_than(Duration::ZERO).await.unwrap(), 1);
        assert!(!root.join(draft_id.to_string()).exists());
        assert!(root.join("README").exists());
        assert!(root.join("not-a-draft").exists());

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn test_prune_without_staging_dir() {
        let staging = PhotoStaging::new(temp_root());
        assert_eq!(staging.prune_older_than(Duration::ZERO).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restage_replaces_files() {
        let root = temp_root();
        let staging = PhotoStaging::new(&root);
        let draft_id = DraftId::generate();

        staging
            .stage(draft_id, &[image("old.png", ImageKind::ProfilePhoto)])
            .await
            .unwrap();
        let staged = staging
            .stage(draft_id, &[image("new.png", ImageKind::ProfilePhoto)])
            .await
            .unwrap();

        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(root.join(draft_id.to_string())).await.unwrap();
        while let Some(entry) = dir.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec![staged[0].stored_name.clone()]);

        let _ = tokio::fs::remove_dir_all(root).await;
    }
}
