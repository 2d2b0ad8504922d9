//! MMD (METNO Metadata Discovery) records

pub mod identifier;
pub mod record;

pub use identifier::MetadataIdentifier;
pub use record::{english_text, title_of, Record};

/// `related_information/type` value of the landing page link
pub const LANDING_PAGE_TYPE: &str = "Dataset landing page";
