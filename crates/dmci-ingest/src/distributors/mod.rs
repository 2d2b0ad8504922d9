//! Distributors: one side effect against one backend per job
//!
//! A distributor is built per job from a [`DistributorKind`] and
//! [`DistributorArgs`]. Construction checks the arguments; an invalid
//! distributor is skipped by the worker instead of being run. Backend errors
//! never escape [`Distributor::run`]; they come back as a [`DistResult`].

pub mod file;
pub mod pycsw;
pub mod solr;
pub mod translate;

use crate::config::Config;
use crate::error::{IngestError, IngestResult};
use crate::mmd::MetadataIdentifier;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub use file::{archive_path, FileArchive, FileDistributor, FileOptions};
pub use pycsw::{CatalogOptions, CswClient, PyCswDistributor};
pub use solr::{SearchOptions, SolrClient, SolrDistributor};
pub use translate::{IsoTranslator, RecordTranslator};

/// Message returned by a distributor that failed construction
pub const INVALID_RUN_MESSAGE: &str = "The run job is invalid";

// ============================================================================
// Commands and kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistCommand {
    Insert,
    Update,
    Delete,
}

impl FromStr for DistCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(DistCommand::Insert),
            "update" => Ok(DistCommand::Update),
            "delete" => Ok(DistCommand::Delete),
            other => Err(format!("Unsupported command '{}'", other)),
        }
    }
}

impl fmt::Display for DistCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DistCommand::Insert => "insert",
            DistCommand::Update => "update",
            DistCommand::Delete => "delete",
        })
    }
}

/// The closed set of distributor implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistributorKind {
    File,
    PyCsw,
    Solr,
}

impl DistributorKind {
    pub const ALL: [DistributorKind; 3] =
        [DistributorKind::File, DistributorKind::PyCsw, DistributorKind::Solr];

    /// Name used in the configuration's distributor list
    pub fn name(self) -> &'static str {
        match self {
            DistributorKind::File => "file",
            DistributorKind::PyCsw => "pycsw",
            DistributorKind::Solr => "solr",
        }
    }
}

impl FromStr for DistributorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DistributorKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("Unknown distributor '{}'", s))
    }
}

impl fmt::Display for DistributorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Results
// ============================================================================

/// How a distributor run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistStatus {
    Ok,
    /// The distributor was constructed with unusable arguments
    Invalid,
    /// The backend refused the operation
    Rejected,
    /// The backend could not be reached
    Unavailable,
    /// The backend answered with something that could not be understood
    Malformed,
    /// A multi-step operation stopped after changing the backend
    PartiallyApplied,
    /// Local filesystem failure
    Io,
}

/// Tagged outcome of one distributor run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistResult {
    pub kind: DistStatus,
    pub message: String,
}

impl DistResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            kind: DistStatus::Ok,
            message: message.into(),
        }
    }

    pub fn failure(kind: DistStatus, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid() -> Self {
        Self::failure(DistStatus::Invalid, INVALID_RUN_MESSAGE)
    }

    pub fn is_ok(&self) -> bool {
        self.kind == DistStatus::Ok
    }
}

// ============================================================================
// Arguments
// ============================================================================

/// A transformed record waiting in the cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDocument {
    pub path: PathBuf,
    pub identifier: MetadataIdentifier,
}

/// Per-job distributor input
///
/// Insert and update need a document, delete needs a bare identifier; never both.
#[derive(Debug, Clone)]
pub struct DistributorArgs {
    pub command: DistCommand,
    pub document: Option<StagedDocument>,
    pub identifier: Option<MetadataIdentifier>,
    pub parent_list: Option<PathBuf>,
}

impl DistributorArgs {
    pub fn for_document(command: DistCommand, document: StagedDocument) -> Self {
        Self {
            command,
            document: Some(document),
            identifier: None,
            parent_list: None,
        }
    }

    pub fn for_identifier(command: DistCommand, identifier: MetadataIdentifier) -> Self {
        Self {
            command,
            document: None,
            identifier: Some(identifier),
            parent_list: None,
        }
    }

    pub fn with_parent_list(mut self, parent_list: Option<PathBuf>) -> Self {
        self.parent_list = parent_list;
        self
    }

    /// Check the argument combination; the error explains why the job is invalid
    pub fn check(&self) -> Result<(), String> {
        match (&self.document, &self.identifier) {
            (Some(_), Some(_)) | (None, None) => {
                return Err("Either a document or a metadata identifier must be specified, but not both".into())
            },
            (Some(document), None) if !document.path.is_file() => {
                return Err(format!("File does not exist: {}", document.path.display()))
            },
            _ => {},
        }

        if let Some(parent_list) = &self.parent_list {
            if !parent_list.is_file() {
                return Err(format!("File does not exist: {}", parent_list.display()));
            }
        }

        match self.command {
            DistCommand::Insert | DistCommand::Update if self.document.is_none() => {
                Err(format!("Command '{}' requires a document", self.command))
            },
            DistCommand::Delete if self.identifier.is_none() => {
                Err(format!("Command '{}' requires a metadata identifier", self.command))
            },
            _ => Ok(()),
        }
    }

    /// Identifier of the record the job acts on
    pub fn target(&self) -> Option<&MetadataIdentifier> {
        self.document
            .as_ref()
            .map(|d| &d.identifier)
            .or(self.identifier.as_ref())
    }

    /// Run the argument check for a distributor and log the reason on failure
    pub(crate) fn validate_for(&self, kind: DistributorKind) -> bool {
        match self.check() {
            Ok(()) => true,
            Err(reason) => {
                tracing::error!(distributor = %kind, %reason, "Invalid distributor arguments");
                false
            },
        }
    }
}

// ============================================================================
// Capabilities
// ============================================================================

#[async_trait]
pub trait Distributor: Send + Sync {
    fn kind(&self) -> DistributorKind;

    fn is_valid(&self) -> bool;

    /// Perform the side effect; never called by the worker when invalid
    async fn run(&self) -> DistResult;
}

/// Backends that can tell whether a parent record exists
#[async_trait]
pub trait ParentSearch: Send + Sync {
    async fn has_record(&self, identifier: &MetadataIdentifier) -> Result<bool, String>;
}

/// Stand-in for a distributor whose backend is not configured
struct Unconfigured(DistributorKind);

#[async_trait]
impl Distributor for Unconfigured {
    fn kind(&self) -> DistributorKind {
        self.0
    }

    fn is_valid(&self) -> bool {
        false
    }

    async fn run(&self) -> DistResult {
        DistResult::invalid()
    }
}

// ============================================================================
// Backend registry
// ============================================================================

/// Backend clients shared by every job
#[derive(Clone)]
pub struct Backends {
    file: Option<FileArchive>,
    catalog: Option<CswClient>,
    search: Option<SolrClient>,
    translator: Arc<dyn RecordTranslator>,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            file: None,
            catalog: None,
            search: None,
            translator: Arc::new(IsoTranslator),
        }
    }
}

impl Backends {
    /// Build the clients for every distributor named in the configuration
    pub fn from_config(config: &Config) -> IngestResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.request_timeout_secs))
            .build()
            .map_err(|e| IngestError::Config(format!("HTTP client: {}", e)))?;

        let mut backends = Backends::default();
        for name in &config.dmci.distributors {
            match name.parse::<DistributorKind>() {
                Ok(DistributorKind::File) => {
                    let options = FileOptions::from_config(config)
                        .ok_or_else(|| IngestError::Config("file.file_archive_path must be set".into()))?;
                    backends.file = Some(FileArchive::new(options)?);
                },
                Ok(DistributorKind::PyCsw) => {
                    let options = CatalogOptions::from_config(config).ok_or_else(|| {
                        IngestError::Config("pycsw.csw_service_url must be set".into())
                    })?;
                    backends.catalog = Some(CswClient::new(options, http.clone())?);
                },
                Ok(DistributorKind::Solr) => {
                    let options = SearchOptions::from_config(config).ok_or_else(|| {
                        IngestError::Config("solr.solr_service_url must be set".into())
                    })?;
                    backends.search = Some(SolrClient::new(options, http.clone())?);
                },
                Err(reason) => tracing::warn!(%reason, "Distributor will be skipped"),
            }
        }
        Ok(backends)
    }

    pub fn with_file(mut self, archive: FileArchive) -> Self {
        self.file = Some(archive);
        self
    }

    pub fn with_catalog(mut self, client: CswClient) -> Self {
        self.catalog = Some(client);
        self
    }

    pub fn with_search(mut self, client: SolrClient) -> Self {
        self.search = Some(client);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn RecordTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// Construct the distributor for one job
    pub fn distributor(&self, kind: DistributorKind, args: DistributorArgs) -> Box<dyn Distributor> {
        match kind {
            DistributorKind::File => match &self.file {
                Some(archive) => Box::new(FileDistributor::new(archive.clone(), args)),
                None => Box::new(Unconfigured(kind)),
            },
            DistributorKind::PyCsw => match &self.catalog {
                Some(client) => Box::new(PyCswDistributor::new(
                    client.clone(),
                    Arc::clone(&self.translator),
                    args,
                )),
                None => Box::new(Unconfigured(kind)),
            },
            DistributorKind::Solr => match &self.search {
                Some(client) => Box::new(SolrDistributor::new(client.clone(), args)),
                None => Box::new(Unconfigured(kind)),
            },
        }
    }

    /// Backend used to confirm parent records: the first configured of file and pycsw
    pub fn parent_search(&self, order: &[String]) -> Option<&dyn ParentSearch> {
        order.iter().find_map(|name| match name.parse::<DistributorKind>() {
            Ok(DistributorKind::File) => self.file.as_ref().map(|f| f as &dyn ParentSearch),
            Ok(DistributorKind::PyCsw) => self.catalog.as_ref().map(|c| c as &dyn ParentSearch),
            _ => None,
        })
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("file", &self.file)
            .field("catalog", &self.catalog)
            .field("search", &self.search)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identifier() -> MetadataIdentifier {
        MetadataIdentifier::parse("no.met:64db6102-14ce-41e9-b93b-61dbb2cb8b4e").unwrap()
    }

    #[test]
    fn test_registry_names() {
        assert_eq!("file".parse::<DistributorKind>().unwrap(), DistributorKind::File);
        assert_eq!("pycsw".parse::<DistributorKind>().unwrap(), DistributorKind::PyCsw);
        assert_eq!("solr".parse::<DistributorKind>().unwrap(), DistributorKind::Solr);
        assert!("git".parse::<DistributorKind>().is_err());
        assert!("File".parse::<DistributorKind>().is_err());
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!("INSERT".parse::<DistCommand>().unwrap(), DistCommand::Insert);
        assert_eq!("delete".parse::<DistCommand>().unwrap(), DistCommand::Delete);
        assert!("blabla".parse::<DistCommand>().is_err());
    }

    #[test]
    fn test_args_check() {
        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("job.Q");
        std::fs::write(&staged, "<mmd/>").unwrap();
        let document = StagedDocument {
            path: staged.clone(),
            identifier: identifier(),
        };

        assert!(DistributorArgs::for_document(DistCommand::Insert, document.clone())
            .check()
            .is_ok());
        assert!(DistributorArgs::for_identifier(DistCommand::Delete, identifier())
            .check()
            .is_ok());

        // command and payload disagree
        assert!(DistributorArgs::for_document(DistCommand::Delete, document.clone())
            .check()
            .is_err());
        assert!(DistributorArgs::for_identifier(DistCommand::Update, identifier())
            .check()
            .is_err());

        // both payloads
        let mut both = DistributorArgs::for_document(DistCommand::Insert, document.clone());
        both.identifier = Some(identifier());
        assert!(both.check().is_err());

        // missing files
        let missing = StagedDocument {
            path: dir.path().join("gone.Q"),
            identifier: identifier(),
        };
        assert!(DistributorArgs::for_document(DistCommand::Insert, missing)
            .check()
            .is_err());
        let err = DistributorArgs::for_document(DistCommand::Insert, document)
            .with_parent_list(Some(dir.path().join("parents.txt")))
            .check()
            .unwrap_err();
        assert!(err.starts_with("File does not exist"));
    }

    #[tokio::test]
    async fn test_unconfigured_backend_is_invalid() {
        let backends = Backends::default();
        let dist = backends.distributor(
            DistributorKind::Solr,
            DistributorArgs::for_identifier(DistCommand::Delete, identifier()),
        );
        assert!(!dist.is_valid());
        assert_eq!(dist.run().await, DistResult::invalid());
        assert!(backends.parent_search(&["file".into(), "pycsw".into()]).is_none());
    }

    #[test]
    fn test_parent_search_prefers_configured_order() {
        let dir = TempDir::new().unwrap();
        let archive = FileArchive::new(FileOptions {
            archive_root: dir.path().to_path_buf(),
        })
        .unwrap();
        let backends = Backends::default().with_file(archive);

        assert!(backends
            .parent_search(&["solr".into(), "file".into()])
            .is_some());
        assert!(backends.parent_search(&["solr".into()]).is_none());
    }
}
