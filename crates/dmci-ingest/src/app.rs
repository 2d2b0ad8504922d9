//! Job entry points
//!
//! [`Ingest`] owns the shared services and the staging directories and runs
//! one job per call. Errors carry an HTTP-style status through
//! [`IngestError::status_code`]; success is always `200`.

use crate::config::Config;
use crate::distributors::{DistCommand, DistributorArgs, StagedDocument};
use crate::error::{IngestError, IngestResult};
use crate::jobs::JobStager;
use crate::mmd::MetadataIdentifier;
use crate::worker::{Services, Worker, VALID_MESSAGE};
use std::path::Path;
use tracing::{error, info, instrument};

/// Status of a successful job
pub const STATUS_OK: u16 = 200;

#[derive(Debug)]
pub struct Ingest {
    services: Services,
    jobs: JobStager,
    max_permitted_size: usize,
}

impl Ingest {
    pub fn new(services: Services, jobs: JobStager, max_permitted_size: usize) -> Self {
        Self {
            services,
            jobs,
            max_permitted_size,
        }
    }

    /// Build services and directories from a validated configuration
    pub fn from_config(config: &Config) -> IngestResult<Self> {
        let (Some(cache), Some(rejected)) = (
            config.dmci.distributor_cache.as_ref(),
            config.dmci.rejected_jobs_path.as_ref(),
        ) else {
            return Err(IngestError::Config(
                "dmci.distributor_cache and dmci.rejected_jobs_path must be set".into(),
            ));
        };

        Ok(Self::new(
            Services::from_config(config)?,
            JobStager::new(cache, rejected),
            config.dmci.max_permitted_size,
        ))
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn jobs(&self) -> &JobStager {
        &self.jobs
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn insert(&self, data: &[u8]) -> IngestResult<String> {
        self.run(Some(DistCommand::Insert), data).await
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn update(&self, data: &[u8]) -> IngestResult<String> {
        self.run(Some(DistCommand::Update), data).await
    }

    /// Stage, validate and transform without distributing
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn validate(&self, data: &[u8]) -> IngestResult<String> {
        self.run(None, data).await
    }

    /// Remove a record from every backend
    ///
    /// The identifier gets the same namespace qualification as documents.
    #[instrument(skip(self))]
    pub async fn delete(&self, identifier: &str) -> IngestResult<String> {
        let identifier = MetadataIdentifier::parse(identifier)
            .map_err(|e| IngestError::Validation(e.to_string()))?;
        let identifier = self
            .services
            .transformer
            .qualify_identifier(&identifier)
            .map_err(|e| IngestError::Validation(e.to_string()))?;

        let mut worker = Worker::new(&self.services);
        let report = worker
            .distribute(DistributorArgs::for_identifier(DistCommand::Delete, identifier))
            .await;

        if report.is_success() {
            Ok(report.message())
        } else {
            Err(IngestError::Distribution(report.message()))
        }
    }

    async fn run(&self, command: Option<DistCommand>, data: &[u8]) -> IngestResult<String> {
        if data.len() > self.max_permitted_size {
            return Err(IngestError::PayloadTooLarge {
                size: data.len(),
                limit: self.max_permitted_size,
            });
        }

        let path = self.jobs.stage(data).await?;
        let mut worker = Worker::new(&self.services);

        let record = match worker.validate(data).await {
            Ok(record) => record,
            Err(message) => {
                self.reject(&path, &message).await;
                return Err(IngestError::Validation(message));
            },
        };

        if let Err(e) = self.jobs.overwrite(&path, record.xml.as_bytes()).await {
            error!(path = %path.display(), error = %e, "Could not store transformed document");
            self.reject(&path, &e.to_string()).await;
            return Err(e);
        }

        let Some(command) = command else {
            worker.finish(true);
            self.jobs.commit(&path).await;
            return Ok(VALID_MESSAGE.to_string());
        };

        let args = DistributorArgs::for_document(
            command,
            StagedDocument {
                path: path.clone(),
                identifier: record.identifier.clone(),
            },
        );
        let report = worker.distribute(args).await;
        let message = report.message();

        if report.is_success() {
            info!(identifier = %record.identifier, "Job committed");
            self.jobs.commit(&path).await;
            Ok(message)
        } else {
            self.reject(&path, &message).await;
            Err(IngestError::Distribution(message))
        }
    }

    async fn reject(&self, path: &Path, message: &str) {
        let failures = self.jobs.reject(path, message).await;
        if !failures.is_empty() {
            error!(failures = failures.len(), "Rejected job could not be fully archived");
        }
    }
}
