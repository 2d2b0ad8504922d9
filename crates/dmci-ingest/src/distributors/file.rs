//! File archive distributor
//!
//! Records are stored as `{root}/arch_{h7}/arch_{h6}/arch_{h5}/{uuid}.xml`,
//! where `h5..h7` are hex digits 5 to 7 of the UUID.

use super::{
    DistCommand, DistResult, DistStatus, Distributor, DistributorArgs, DistributorKind,
    ParentSearch,
};
use crate::config::Config;
use crate::error::{IngestError, IngestResult};
use crate::mmd::MetadataIdentifier;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FileOptions {
    pub archive_root: PathBuf,
}

impl FileOptions {
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .file
            .file_archive_path
            .clone()
            .map(|archive_root| Self { archive_root })
    }
}

/// Archive location of a record
pub fn archive_path(root: &Path, uuid: &Uuid) -> PathBuf {
    let hex = uuid.simple().to_string();
    let level = |i: usize| format!("arch_{}", &hex[i..=i]);
    root.join(level(7))
        .join(level(6))
        .join(level(5))
        .join(format!("{}.xml", uuid))
}

/// The on-disk archive
#[derive(Debug, Clone)]
pub struct FileArchive {
    root: PathBuf,
}

impl FileArchive {
    pub fn new(options: FileOptions) -> IngestResult<Self> {
        if !options.archive_root.is_dir() {
            return Err(IngestError::Config(format!(
                "Archive folder does not exist: {}",
                options.archive_root.display()
            )));
        }
        Ok(Self {
            root: options.archive_root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, uuid: &Uuid) -> PathBuf {
        archive_path(&self.root, uuid)
    }
}

#[async_trait]
impl ParentSearch for FileArchive {
    async fn has_record(&self, identifier: &MetadataIdentifier) -> Result<bool, String> {
        tokio::fs::try_exists(self.path_for(&identifier.uuid))
            .await
            .map_err(|e| e.to_string())
    }
}

/// Writes, replaces or removes archived records
pub struct FileDistributor {
    archive: FileArchive,
    args: DistributorArgs,
    valid: bool,
}

impl FileDistributor {
    pub fn new(archive: FileArchive, args: DistributorArgs) -> Self {
        let valid = args.validate_for(DistributorKind::File);
        Self {
            archive,
            args,
            valid,
        }
    }

    async fn insert(&self, source: &Path, target: &Path) -> DistResult {
        let data = match tokio::fs::read(source).await {
            Ok(data) => data,
            Err(e) => return io_failure("Could not read staged file", source, e),
        };
        if let Err(result) = self.ensure_parent_dir(target).await {
            return result;
        }

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target)
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                error!(path = %target.display(), "File already exists");
                return DistResult::failure(
                    DistStatus::Rejected,
                    format!("File already exists: {}", target.display()),
                );
            },
            Err(e) => return io_failure("Failed to archive file", target, e),
        };

        if let Err(e) = file.write_all(&data).await {
            return io_failure("Failed to archive file", target, e);
        }
        if let Err(e) = file.flush().await {
            return io_failure("Failed to archive file", target, e);
        }

        info!(path = %target.display(), "Added file");
        DistResult::ok(format!("Added file: {}", target.display()))
    }

    async fn update(&self, source: &Path, target: &Path) -> DistResult {
        if !exists(target).await {
            error!(path = %target.display(), "File to update does not exist");
            return DistResult::failure(
                DistStatus::Rejected,
                format!("File does not exist: {}", target.display()),
            );
        }

        match tokio::fs::copy(source, target).await {
            Ok(_) => {
                info!(path = %target.display(), "Replaced file");
                DistResult::ok(format!("Replaced file: {}", target.display()))
            },
            Err(e) => io_failure("Failed to archive file", target, e),
        }
    }

    async fn delete(&self, target: &Path) -> DistResult {
        match tokio::fs::remove_file(target).await {
            Ok(()) => {
                info!(path = %target.display(), "Deleted file");
                DistResult::ok(format!("Deleted file: {}", target.display()))
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!(path = %target.display(), "File to delete not found");
                DistResult::failure(
                    DistStatus::Rejected,
                    format!("File not found: {}", target.display()),
                )
            },
            Err(e) => io_failure("Failed to delete file", target, e),
        }
    }

    async fn ensure_parent_dir(&self, target: &Path) -> Result<(), DistResult> {
        let Some(dir) = target.parent() else {
            return Ok(());
        };
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| io_failure("Could not make folder(s)", dir, e))
    }
}

#[async_trait]
impl Distributor for FileDistributor {
    fn kind(&self) -> DistributorKind {
        DistributorKind::File
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    #[instrument(skip(self), fields(command = %self.args.command))]
    async fn run(&self) -> DistResult {
        if !self.valid {
            return DistResult::invalid();
        }
        let Some(identifier) = self.args.target() else {
            return DistResult::invalid();
        };
        let target = self.archive.path_for(&identifier.uuid);

        match (self.args.command, &self.args.document) {
            (DistCommand::Insert, Some(document)) => self.insert(&document.path, &target).await,
            (DistCommand::Update, Some(document)) => self.update(&document.path, &target).await,
            (DistCommand::Delete, _) => self.delete(&target).await,
            _ => DistResult::invalid(),
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn io_failure(what: &str, path: &Path, e: std::io::Error) -> DistResult {
    error!(path = %path.display(), error = %e, "{}", what);
    DistResult::failure(DistStatus::Io, format!("{}: {}: {}", what, path.display(), e))
}
