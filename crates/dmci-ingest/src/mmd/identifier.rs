//! `namespace:UUID` metadata identifiers

use crate::error::IdentifierError;
use crate::xml::Element;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A metadata identifier such as `no.met:250ba38f-1a2b-4c3d-8e4f-5a6b7c8d9e0f`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataIdentifier {
    pub namespace: String,
    pub uuid: Uuid,
}

impl MetadataIdentifier {
    pub fn new(namespace: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            namespace: namespace.into(),
            uuid,
        }
    }

    /// Parse `namespace:UUID`; both parts are required and exactly one `:` is allowed
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        let value = value.trim();
        let mut parts = value.split(':');
        let (namespace, uuid) = match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(uuid), None) if !namespace.is_empty() && !uuid.is_empty() => {
                (namespace, uuid)
            },
            _ => return Err(IdentifierError::Malformed(value.to_string())),
        };

        let uuid =
            Uuid::parse_str(uuid).map_err(|_| IdentifierError::InvalidUuid(uuid.to_string()))?;

        Ok(Self::new(namespace, uuid))
    }

    /// Read the `metadata_identifier` child of an MMD root element
    pub fn from_document(root: &Element) -> Result<Self, IdentifierError> {
        let element = root
            .child("metadata_identifier")
            .ok_or(IdentifierError::Missing)?;

        let identifier = Self::parse(element.text())?;
        tracing::debug!(namespace = %identifier.namespace, uuid = %identifier.uuid, "Found metadata_identifier");
        Ok(identifier)
    }

    /// Read the parent reference, `related_dataset` with `relation_type="parent"`
    pub fn parent_of(root: &Element) -> Result<Option<Self>, IdentifierError> {
        root.children_named("related_dataset")
            .find(|e| e.attr("relation_type") == Some("parent"))
            .map(|e| Self::parse(e.text()))
            .transpose()
    }

    /// Identifier form used as the search index document id: `:` and `.` become `-`
    pub fn to_index_id(&self) -> String {
        self.to_string().replace([':', '.'], "-")
    }
}

impl fmt::Display for MetadataIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.uuid)
    }
}

impl FromStr for MetadataIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const ID: &str = "no.met:64db6102-14ce-41e9-b93b-61dbb2cb8b4e";

    #[test]
    fn test_parse_identifier() {
        let id = MetadataIdentifier::parse(ID).unwrap();
        assert_eq!(id.namespace, "no.met");
        assert_eq!(id.uuid.to_string(), "64db6102-14ce-41e9-b93b-61dbb2cb8b4e");
        assert_eq!(id.to_string(), ID);
    }

    #[test]
    fn test_parse_failures_are_distinct() {
        assert_eq!(
            MetadataIdentifier::parse("64db6102-14ce-41e9-b93b-61dbb2cb8b4e"),
            Err(IdentifierError::Malformed(
                "64db6102-14ce-41e9-b93b-61dbb2cb8b4e".to_string()
            ))
        );
        assert!(matches!(
            MetadataIdentifier::parse("a:b:c"),
            Err(IdentifierError::Malformed(_))
        ));
        assert!(matches!(
            MetadataIdentifier::parse(":64db6102-14ce-41e9-b93b-61dbb2cb8b4e"),
            Err(IdentifierError::Malformed(_))
        ));
        assert_eq!(
            MetadataIdentifier::parse("no.met:not-a-uuid"),
            Err(IdentifierError::InvalidUuid("not-a-uuid".to_string()))
        );
    }

    #[test]
    fn test_from_document() {
        let xml = format!(
            r#"<mmd:mmd xmlns:mmd="http://www.met.no/schema/mmd">
  <mmd:metadata_identifier>{ID}</mmd:metadata_identifier>
  <mmd:related_dataset relation_type="other">no.met:8c6d5b0a-3a43-4c38-9d0b-9c1f7a9e2f11</mmd:related_dataset>
  <mmd:related_dataset relation_type="parent">no.met:a1ddaf0f-cae0-4a15-9b37-3468e9cb1a2b</mmd:related_dataset>
</mmd:mmd>"#
        );
        let root = Element::parse(xml.as_bytes()).unwrap();

        let id = MetadataIdentifier::from_document(&root).unwrap();
        assert_eq!(id.to_string(), ID);

        let parent = MetadataIdentifier::parent_of(&root).unwrap().unwrap();
        assert_eq!(parent.uuid.to_string(), "a1ddaf0f-cae0-4a15-9b37-3468e9cb1a2b");
    }

    #[test]
    fn test_missing_identifier() {
        let root = Element::parse(b"<mmd><title>x</title></mmd>").unwrap();
        assert_eq!(
            MetadataIdentifier::from_document(&root),
            Err(IdentifierError::Missing)
        );
        assert_eq!(MetadataIdentifier::parent_of(&root), Ok(None));
    }

    #[test]
    fn test_index_id() {
        let id = MetadataIdentifier::parse("no.met.dev:250ba38f-1a2b-4c3d-8e4f-5a6b7c8d9e0f").unwrap();
        assert_eq!(id.to_index_id(), "no-met-dev-250ba38f-1a2b-4c3d-8e4f-5a6b7c8d9e0f");
    }
}
