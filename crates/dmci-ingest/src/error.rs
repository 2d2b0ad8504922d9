//! Error types for the ingest pipeline
//!
//! Domain failures (a bad document, an unreachable backend) are values the
//! pipeline reports; only configuration problems abort the process.

use dmci_common::DmciError;
use thiserror::Error;

/// Result alias for ingest operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Errors surfaced by a job
#[derive(Error, Debug)]
pub enum IngestError {
    /// The job payload could not be written to the cache directory
    #[error("Cannot write xml data to cache file")]
    Stage(#[source] std::io::Error),

    /// The document failed schema or content validation
    #[error("{0}")]
    Validation(String),

    /// One or more distributors failed or were skipped
    #[error("{0}")]
    Distribution(String),

    #[error("File bigger than permitted size: {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Common(#[from] DmciError),
}

impl IngestError {
    /// HTTP-style status class for an outer front end
    pub fn status_code(&self) -> u16 {
        match self {
            IngestError::Validation(_) | IngestError::Document(_) => 400,
            IngestError::PayloadTooLarge { .. } => 413,
            IngestError::Stage(_) => 507,
            IngestError::Distribution(_)
            | IngestError::Config(_)
            | IngestError::Io(_)
            | IngestError::Common(_) => 500,
        }
    }
}

/// The XML payload could not be read as a document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Document is empty")]
    Empty,

    #[error("Document is not well-formed XML: {0}")]
    Malformed(String),
}

/// Failures extracting the `namespace:UUID` metadata identifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("No metadata_identifier element found")]
    Missing,

    #[error("metadata_identifier '{0}' is not formed as namespace:UUID")]
    Malformed(String),

    #[error("Could not parse UUID: '{0}'")]
    InvalidUuid(String),
}

/// Namespace and deployment environment disagree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("Namespace '{namespace}' belongs to the '{found}' environment, not production")]
    ProductionEnvironment { namespace: String, found: String },

    #[error("Namespace '{namespace}' belongs to the '{found}' environment, expected '{expected}'")]
    EnvironmentMismatch {
        namespace: String,
        found: String,
        expected: String,
    },

    #[error("Identifier '{0}' could not be rewritten in the document")]
    NotRewritten(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(IngestError::Validation("bad".into()).status_code(), 400);
        assert_eq!(
            IngestError::Stage(std::io::Error::other("disk full")).status_code(),
            507
        );
        assert_eq!(IngestError::Distribution("x".into()).status_code(), 500);
        assert_eq!(
            IngestError::PayloadTooLarge { size: 10, limit: 5 }.status_code(),
            413
        );
    }

    #[test]
    fn test_messages() {
        let err = IngestError::PayloadTooLarge {
            size: 200_000,
            limit: 100_000,
        };
        assert_eq!(err.to_string(), "File bigger than permitted size: 100000");

        let err = IngestError::Stage(std::io::Error::other("disk full"));
        assert_eq!(err.to_string(), "Cannot write xml data to cache file");
    }
}
