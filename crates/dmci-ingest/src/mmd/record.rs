//! A metadata record owned by one job

use super::MetadataIdentifier;
use crate::xml::Element;

/// Document text plus the identifiers the pipeline acts on
///
/// `xml` and the identifier fields are kept in step by the transformer.
#[derive(Debug, Clone)]
pub struct Record {
    pub xml: String,
    pub identifier: MetadataIdentifier,
    pub parent: Option<MetadataIdentifier>,
    pub title: String,
}

impl Record {
    pub fn new(xml: String, identifier: MetadataIdentifier, title: String) -> Self {
        Self {
            xml,
            identifier,
            parent: None,
            title,
        }
    }

    pub fn with_parent(mut self, parent: Option<MetadataIdentifier>) -> Self {
        self.parent = parent;
        self
    }
}

/// Text of the first `title` element, empty when there is none
pub fn title_of(root: &Element) -> String {
    match root.child("title") {
        Some(title) => title.text().to_string(),
        None => {
            tracing::warn!("No title found in XML file");
            String::new()
        },
    }
}

/// Preferred language variant of a repeated element such as `title` or `abstract`
pub fn english_text<'a>(root: &'a Element, name: &str) -> Option<&'a str> {
    root.children_named(name)
        .find(|e| e.attr("lang") == Some("en"))
        .or_else(|| root.child(name))
        .map(Element::text)
}
