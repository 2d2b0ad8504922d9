//! Structural validation of MMD documents

use crate::error::{IngestError, IngestResult};
use crate::xml::Element;
use std::fmt;
use std::path::Path;

/// Elements an MMD record must carry when no schema file is configured
pub const DEFAULT_REQUIRED_ELEMENTS: [&str; 9] = [
    "metadata_identifier",
    "title",
    "abstract",
    "metadata_status",
    "dataset_production_status",
    "last_metadata_update",
    "temporal_extent",
    "iso_topic_category",
    "keywords",
];

/// Error log of a failed schema validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaErrors(pub Vec<String>);

impl fmt::Display for SchemaErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("\n"))
    }
}

/// Validates raw document bytes against a compiled schema
///
/// Built once at startup and shared by every job.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, document: &[u8]) -> Result<(), SchemaErrors>;
}

/// Checks well-formedness, the `mmd` root and the required top-level elements
#[derive(Debug, Clone)]
pub struct MmdStructureValidator {
    required: Vec<String>,
}

impl Default for MmdStructureValidator {
    fn default() -> Self {
        Self::new(DEFAULT_REQUIRED_ELEMENTS)
    }
}

impl MmdStructureValidator {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    /// Compile the required element list from an MMD XSD
    ///
    /// Reads the declaration of the `mmd` element and keeps every child
    /// declared with `minOccurs` other than `0`. Without a path the built-in
    /// list is used.
    pub fn from_schema_path(path: Option<&Path>) -> IngestResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read(path)?;
        let schema = Element::parse(&text).map_err(|e| {
            IngestError::Config(format!("XML Schema could not be parsed: {}: {}", path.display(), e))
        })?;

        let root_decl = schema
            .children_named("element")
            .find(|e| e.attr("name") == Some("mmd"))
            .ok_or_else(|| {
                IngestError::Config(format!("No 'mmd' element declared in {}", path.display()))
            })?;

        let required: Vec<String> = root_decl
            .descendants_named("element")
            .into_iter()
            .filter(|e| e.attr("minOccurs") != Some("0"))
            .filter_map(|e| e.attr("name").or_else(|| e.attr("ref")))
            .map(|name| name.rsplit(':').next().unwrap_or(name).to_string())
            .collect();

        tracing::info!(path = %path.display(), required = required.len(), "Compiled MMD schema");
        Ok(Self { required })
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }
}

impl SchemaValidator for MmdStructureValidator {
    fn validate(&self, document: &[u8]) -> Result<(), SchemaErrors> {
        let root = Element::parse(document).map_err(|e| SchemaErrors(vec![e.to_string()]))?;

        let mut errors = Vec::new();
        if root.name != "mmd" {
            errors.push(format!("Root element is '{}', expected 'mmd'", root.name));
        }
        for name in &self.required {
            if root.child(name).is_none() {
                errors.push(format!("Missing required element '{}'", name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaErrors(errors))
        }
    }
}
