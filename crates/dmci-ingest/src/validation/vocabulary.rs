//! Controlled vocabularies and the CF standard name table

use dmci_common::{DmciError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Membership test against a vocabulary
///
/// An `Err` means the vocabulary itself could not be consulted, which is
/// reported differently from a value that is simply not in it.
pub trait VocabularyLookup: Send + Sync {
    fn contains(&self, value: &str) -> Result<bool>;
}

/// A fixed set of concept labels
#[derive(Debug, Clone)]
pub struct ControlledVocabulary {
    name: &'static str,
    concepts: HashSet<String>,
}

impl ControlledVocabulary {
    pub fn new<I, S>(name: &'static str, concepts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name,
            concepts: concepts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn access_constraint() -> Self {
        Self::new(
            "Access_Constraint",
            [
                "Open",
                "Registered users only (automated approval)",
                "Restricted to a community",
            ],
        )
    }

    pub fn activity_type() -> Self {
        Self::new(
            "Activity_Type",
            [
                "Aircraft",
                "Space Borne Instrument",
                "Numerical Simulation",
                "Climate Indicator",
                "In Situ Land-based station",
                "In Situ Ship-based station",
                "In Situ Ocean fixed station",
                "In Situ Ocean moving station",
                "In Situ Ice-based station",
                "Interview/Questionnaire",
                "Maps/Charts/Photographs",
                "Not available",
            ],
        )
    }

    pub fn operational_status() -> Self {
        Self::new(
            "Operational_Status",
            [
                "Operational",
                "Pre-Operational",
                "Experimental",
                "Scientific",
                "Not available",
            ],
        )
    }

    pub fn use_constraint() -> Self {
        Self::new(
            "Use_Constraint",
            [
                "CC0-1.0",
                "CC-BY-4.0",
                "CC-BY-SA-4.0",
                "CC-BY-NC-4.0",
                "CC-BY-NC-SA-4.0",
                "CC-BY-ND-4.0",
                "CC-BY-NC-ND-4.0",
            ],
        )
    }
}

impl VocabularyLookup for ControlledVocabulary {
    fn contains(&self, value: &str) -> Result<bool> {
        Ok(self.concepts.contains(value.trim()))
    }
}

// ============================================================================
// CF standard names
// ============================================================================

#[derive(Debug, Deserialize)]
struct StandardNameTable {
    #[serde(rename = "entry", default)]
    entries: Vec<TableId>,
    #[serde(rename = "alias", default)]
    aliases: Vec<TableId>,
}

#[derive(Debug, Deserialize)]
struct TableId {
    #[serde(rename = "@id")]
    id: String,
}

/// Standard names and aliases from `cf-standard-name-table.xml`
#[derive(Debug, Clone, Default)]
pub struct CfStandardNames {
    names: HashSet<String>,
}

impl CfStandardNames {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let table = Self::from_xml(&text)?;
        tracing::info!(path = %path.display(), names = table.len(), "Loaded CF standard name table");
        Ok(table)
    }

    pub fn from_xml(text: &str) -> Result<Self> {
        let table: StandardNameTable = quick_xml::de::from_str(text)
            .map_err(|e| DmciError::parse(format!("CF standard name table: {}", e)))?;

        let names: HashSet<String> = table
            .entries
            .into_iter()
            .chain(table.aliases)
            .map(|e| e.id)
            .collect();

        if names.is_empty() {
            return Err(DmciError::parse("CF standard name table has no entries"));
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl VocabularyLookup for CfStandardNames {
    fn contains(&self, value: &str) -> Result<bool> {
        Ok(self.names.contains(value.trim()))
    }
}

/// Stand-in for a vocabulary that was not configured; every lookup errors
#[derive(Debug, Clone)]
pub struct UnavailableVocabulary(pub &'static str);

impl VocabularyLookup for UnavailableVocabulary {
    fn contains(&self, _value: &str) -> Result<bool> {
        Err(DmciError::config(format!("{} vocabulary is not available", self.0)))
    }
}

/// The vocabularies used by the content checks
pub struct Vocabularies {
    pub access_constraint: Box<dyn VocabularyLookup>,
    pub activity_type: Box<dyn VocabularyLookup>,
    pub operational_status: Box<dyn VocabularyLookup>,
    pub use_constraint: Box<dyn VocabularyLookup>,
    pub cf_standard_names: Box<dyn VocabularyLookup>,
}

impl Vocabularies {
    /// Built-in MMD vocabularies with the given CF table
    pub fn builtin(cf_standard_names: Box<dyn VocabularyLookup>) -> Self {
        Self {
            access_constraint: Box::new(ControlledVocabulary::access_constraint()),
            activity_type: Box::new(ControlledVocabulary::activity_type()),
            operational_status: Box::new(ControlledVocabulary::operational_status()),
            use_constraint: Box::new(ControlledVocabulary::use_constraint()),
            cf_standard_names,
        }
    }

    /// Built-in vocabularies plus the CF table at `cf_path`, if any
    pub fn load(cf_path: Option<&Path>) -> Result<Self> {
        let cf: Box<dyn VocabularyLookup> = match cf_path {
            Some(path) => Box::new(CfStandardNames::from_file(path)?),
            None => {
                tracing::warn!("No CF standard name table configured; CF keyword checks will fail");
                Box::new(UnavailableVocabulary("CF standard name"))
            },
        };
        Ok(Self::builtin(cf))
    }
}

impl std::fmt::Debug for Vocabularies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vocabularies").finish_non_exhaustive()
    }
}
