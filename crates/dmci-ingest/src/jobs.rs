//! Staged job files: stage, commit, reject
//!
//! Every incoming document is written to the cache directory as `{uuid}.Q`
//! before anything else happens. A successful job deletes it; a failed job
//! moves it to the rejected directory next to a `{uuid}.txt` reason file.

use crate::error::{IngestError, IngestResult};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Extension of staged job files
pub const STAGED_EXTENSION: &str = "Q";

/// Extension of rejection reason files
pub const REASON_EXTENSION: &str = "txt";

/// One failed step of a rejection; the job verdict stays as it was
#[derive(Error, Debug)]
pub enum RejectError {
    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to delete {path}: {source}")]
    RemoveOriginal {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write reason file {path}: {source}")]
    WriteReason {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Staged file has no file name: {0}")]
    NoFileName(PathBuf),
}

/// Owns the cache and rejected directories
#[derive(Debug, Clone)]
pub struct JobStager {
    cache_dir: PathBuf,
    rejected_dir: PathBuf,
}

impl JobStager {
    pub fn new(cache_dir: impl Into<PathBuf>, rejected_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            rejected_dir: rejected_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn rejected_dir(&self) -> &Path {
        &self.rejected_dir
    }

    /// Write the payload under a fresh name in the cache directory
    pub async fn stage(&self, data: &[u8]) -> IngestResult<PathBuf> {
        let path = self
            .cache_dir
            .join(format!("{}.{}", Uuid::new_v4(), STAGED_EXTENSION));
        tokio::fs::write(&path, data).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "Cannot write xml data to cache file");
            IngestError::Stage(e)
        })?;
        info!(path = %path.display(), "Staged job");
        Ok(path)
    }

    /// Replace the staged content with the transformed document
    pub async fn overwrite(&self, path: &Path, data: &[u8]) -> IngestResult<()> {
        tokio::fs::write(path, data).await.map_err(IngestError::Stage)
    }

    /// Remove the staged file of a successful job; failure is only logged
    pub async fn commit(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!(path = %path.display(), "Committed job"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete committed job file"),
        }
    }

    /// Move the staged file into the rejected directory and record why
    ///
    /// Each step is attempted even when an earlier one failed; the failed
    /// steps are logged and returned.
    pub async fn reject(&self, path: &Path, reason: &str) -> Vec<RejectError> {
        let Some(name) = path.file_name() else {
            let failure = RejectError::NoFileName(path.to_path_buf());
            error!(error = %failure, "Reject failed");
            return vec![failure];
        };

        let mut failures = Vec::new();
        let rejected = self.rejected_dir.join(name);

        let copied = match tokio::fs::copy(path, &rejected).await {
            Ok(_) => true,
            Err(source) => {
                failures.push(RejectError::Copy {
                    from: path.to_path_buf(),
                    to: rejected.clone(),
                    source,
                });
                false
            },
        };

        // keep the only copy when it could not be moved
        if copied {
            if let Err(source) = tokio::fs::remove_file(path).await {
                failures.push(RejectError::RemoveOriginal {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        let reason_path = rejected.with_extension(REASON_EXTENSION);
        if let Err(source) = tokio::fs::write(&reason_path, reason).await {
            failures.push(RejectError::WriteReason {
                path: reason_path,
                source,
            });
        }

        for failure in &failures {
            error!(error = %failure, "Reject step failed");
        }
        if failures.is_empty() {
            info!(path = %rejected.display(), "Rejected job");
        }
        failures
    }
}
