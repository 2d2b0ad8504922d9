//! DMCI Ingest Library
//!
//! Validates MMD metadata documents, rewrites them for the current
//! deployment and distributes them to the configured backends.
//!
//! # Backends
//!
//! - **file**: an on-disk archive keyed by record UUID
//! - **pycsw**: an OGC CSW 2.0.2 catalog service
//! - **solr**: a Solr search index
//!
//! # Example
//!
//! ```no_run
//! use dmci_ingest::{Config, Ingest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let ingest = Ingest::from_config(&config)?;
//!     let data = std::fs::read("record.xml")?;
//!     println!("{}", ingest.insert(&data).await?);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod app;
pub mod config;
pub mod distributors;
pub mod error;
pub mod jobs;
pub mod mmd;
pub mod transform;
pub mod validation;
pub mod worker;
pub mod xml;

pub use app::Ingest;
pub use config::Config;
pub use error::{IngestError, IngestResult};
pub use worker::{DistributionReport, Services, Worker};
