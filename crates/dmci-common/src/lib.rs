//! DMCI Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Error handling and logging setup shared by the DMCI workspace members.
//!
//! - **Error Handling**: [`DmciError`] and the [`Result`] alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]
//!
//! # Example
//!
//! ```no_run
//! use dmci_common::{DmciError, Result};
//!
//! fn read_table(path: &str) -> Result<String> {
//!     let text = std::fs::read_to_string(path)?;
//!     if text.is_empty() {
//!         return Err(DmciError::parse("empty table"));
//!     }
//!     Ok(text)
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{DmciError, Result};
