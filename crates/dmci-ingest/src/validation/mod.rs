//! Document validation: schema structure and information content

pub mod content;
pub mod report;
pub mod schema;
pub mod vocabulary;

pub use content::{check_rectangle, check_url, ContentValidator};
pub use report::{CheckResult, ValidationReport};
pub use schema::{MmdStructureValidator, SchemaErrors, SchemaValidator};
pub use vocabulary::{CfStandardNames, ControlledVocabulary, Vocabularies, VocabularyLookup};
