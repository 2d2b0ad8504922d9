//! Per-job orchestration: validate, transform, then fan out to distributors
//!
//! A [`Worker`] is created for every job and walks it through
//! `Staged -> SchemaValidating -> ContentValidating -> Transforming ->
//! Distributing -> Committed | Rejected`. The compiled validators and backend
//! clients live in [`Services`], built once and shared by all workers.

pub mod report;

use crate::config::Config;
use crate::distributors::{Backends, DistributorArgs, DistributorKind, INVALID_RUN_MESSAGE};
use crate::error::{IngestError, IngestResult};
use crate::mmd::{title_of, MetadataIdentifier, Record};
use crate::transform::RecordTransformer;
use crate::validation::{ContentValidator, MmdStructureValidator, SchemaValidator, Vocabularies};
use crate::xml::Element;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub use report::{DistributionOutcome, DistributionReport, SUCCESS_MESSAGE};

/// Message for a document that passed every check
pub const VALID_MESSAGE: &str = "Input MMD XML file is ok";

/// Message when the referenced parent record cannot be found
pub const PARENT_NOT_FOUND: &str = "Parent uuid not found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Staged,
    SchemaValidating,
    ContentValidating,
    Transforming,
    Distributing,
    Committed,
    Rejected,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobState::Staged => "staged",
            JobState::SchemaValidating => "schema-validating",
            JobState::ContentValidating => "content-validating",
            JobState::Transforming => "transforming",
            JobState::Distributing => "distributing",
            JobState::Committed => "committed",
            JobState::Rejected => "rejected",
        })
    }
}

// ============================================================================
// Shared services
// ============================================================================

/// Everything a worker needs that is expensive to build
pub struct Services {
    pub schema: Box<dyn SchemaValidator>,
    pub content: ContentValidator,
    pub transformer: RecordTransformer,
    pub backends: Backends,
    /// Distributor names in call order
    pub distributors: Vec<String>,
    pub parent_list: Option<PathBuf>,
}

impl Services {
    pub fn from_config(config: &Config) -> IngestResult<Self> {
        let schema = MmdStructureValidator::from_schema_path(config.dmci.mmd_xsd_path.as_deref())?;
        let vocabularies = Vocabularies::load(config.dmci.cf_standard_names_path.as_deref())?;
        let catalog_url = config
            .catalog_url()
            .ok_or_else(|| IngestError::Config("customization.catalog_url must be set".into()))?;
        let transformer = RecordTransformer::new(config.env_suffix(), catalog_url)
            .map_err(|e| IngestError::Config(format!("Landing page patterns: {}", e)))?;

        Ok(Self {
            schema: Box::new(schema),
            content: ContentValidator::new(vocabularies),
            transformer,
            backends: Backends::from_config(config)?,
            distributors: config.dmci.distributors.clone(),
            parent_list: config.dmci.path_to_parent_list.clone(),
        })
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("transformer", &self.transformer)
            .field("backends", &self.backends)
            .field("distributors", &self.distributors)
            .field("parent_list", &self.parent_list)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Worker
// ============================================================================

pub struct Worker<'a> {
    services: &'a Services,
    state: JobState,
}

impl<'a> Worker<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self {
            services,
            state: JobState::Staged,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn advance(&mut self, next: JobState) {
        debug!(from = %self.state, to = %next, "Job state");
        self.state = next;
    }

    fn reject(&mut self, message: String) -> Result<Record, String> {
        self.advance(JobState::Rejected);
        Err(message)
    }

    /// Record the final verdict of a job that ends without distribution
    pub fn finish(&mut self, committed: bool) {
        self.advance(if committed {
            JobState::Committed
        } else {
            JobState::Rejected
        });
    }

    /// Validate and transform a document
    ///
    /// On failure the error is the rejection message for the caller.
    pub async fn validate(&mut self, data: &[u8]) -> Result<Record, String> {
        self.advance(JobState::SchemaValidating);
        if let Err(errors) = self.services.schema.validate(data) {
            info!(%errors, "Schema validation failed");
            return self.reject(errors.to_string());
        }

        self.advance(JobState::ContentValidating);
        let root = match Element::parse(data) {
            Ok(root) => root,
            Err(e) => return self.reject(e.to_string()),
        };
        let title = title_of(&root);

        let identifier = match MetadataIdentifier::from_document(&root) {
            Ok(identifier) => identifier,
            Err(e) => {
                warn!(error = %e, "Invalid metadata_identifier");
                return self.reject(format!(
                    "Input MMD XML file has no valid uri:UUID metadata_identifier: {}\n Title: {}",
                    e, title
                ));
            },
        };
        info!(identifier = %identifier, "Performing in depth checking");

        let report = self.services.content.check(&root);
        if !report.passed() {
            let mut message = format!(
                "Input MMD XML file contains errors, please check your file.\n Title: {}",
                title
            );
            for line in report.failure_lines() {
                message.push('\n');
                message.push_str(&line);
            }
            return self.reject(message);
        }

        let parent = match MetadataIdentifier::parent_of(&root) {
            Ok(parent) => parent,
            Err(e) => return self.reject(format!("Invalid parent reference: {}", e)),
        };

        self.advance(JobState::Transforming);
        let xml = match String::from_utf8(data.to_vec()) {
            Ok(xml) => xml,
            Err(e) => return self.reject(format!("Input is not valid UTF-8: {}", e)),
        };
        let mut record = Record::new(xml, identifier, title).with_parent(parent);
        if let Err(e) = self.services.transformer.apply(&mut record) {
            warn!(error = %e, "Namespace rejected");
            return self.reject(e.to_string());
        }

        if let Some(parent) = &record.parent {
            if let Err(message) = self.check_parent(parent).await {
                return self.reject(message);
            }
        }

        Ok(record)
    }

    /// Confirm the parent record exists in the file archive or catalog
    async fn check_parent(&self, parent: &MetadataIdentifier) -> Result<(), String> {
        let Some(search) = self.services.backends.parent_search(&self.services.distributors) else {
            warn!(%parent, "No file or catalog backend configured; parent not checked");
            return Ok(());
        };

        match search.has_record(parent).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(%parent, "Parent not found");
                Err(PARENT_NOT_FOUND.to_string())
            },
            Err(e) => Err(format!("Could not look up parent {}: {}", parent, e)),
        }
    }

    /// Run every configured distributor in order; none is skipped because another failed
    pub async fn distribute(&mut self, args: DistributorArgs) -> DistributionReport {
        self.advance(JobState::Distributing);
        let args = args.with_parent_list(self.services.parent_list.clone());

        let mut report = DistributionReport::new();
        for name in &self.services.distributors {
            let kind = match name.parse::<DistributorKind>() {
                Ok(kind) => kind,
                Err(reason) => {
                    warn!(distributor = %name, "Skipping unknown distributor");
                    report.push(DistributionOutcome::skipped(name, reason));
                    continue;
                },
            };

            let distributor = self.services.backends.distributor(kind, args.clone());
            if !distributor.is_valid() {
                warn!(distributor = %name, "Skipping invalid distributor");
                report.push(DistributionOutcome::skipped(name, INVALID_RUN_MESSAGE));
                continue;
            }

            let result = distributor.run().await;
            debug!(distributor = %name, kind = ?result.kind, "Distributor finished");
            report.push(DistributionOutcome::ran(name, result.is_ok(), result.message));
        }

        self.finish(report.is_success());
        report
    }
}
