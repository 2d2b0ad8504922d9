//! Record rewriting before distribution
//!
//! Two rewrites, both idempotent:
//!
//! - namespace qualification: `no.met` becomes `no.met.dev` when the
//!   deployment runs with environment suffix `dev`
//! - landing page: exactly one `related_information` block of type
//!   `Dataset landing page` pointing at `{catalog_url}/{uuid}`

use crate::error::NamespaceError;
use crate::mmd::{MetadataIdentifier, Record, LANDING_PAGE_TYPE};
use regex::{Captures, Regex};
use uuid::Uuid;

/// Namespace components that mark a non-production deployment
pub const KNOWN_ENVIRONMENTS: [&str; 2] = ["dev", "staging"];

/// Rewrites records for the current deployment
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    env_suffix: Option<String>,
    catalog_url: String,
    landing_block: Regex,
    root_close: Regex,
    identifier_element: Regex,
    parent_element: Regex,
}

impl RecordTransformer {
    pub fn new(env_suffix: Option<&str>, catalog_url: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            env_suffix: env_suffix.map(str::to_string),
            catalog_url: catalog_url.trim_end_matches('/').to_string(),
            landing_block: Regex::new(
                r"(?s)(?P<lead>\n?[ \t]*)<(?P<p>\w+:)?related_information>\s*<(?:\w+:)?type>\s*Dataset landing page\s*</(?:\w+:)?type>.*?</(?:\w+:)?related_information>",
            )?,
            root_close: Regex::new(r"</(?P<p>\w+:)?mmd\s*>")?,
            identifier_element: Regex::new(
                r"(?P<open><(?:\w+:)?metadata_identifier\b[^>]*>\s*)(?P<id>[^<\s]*)",
            )?,
            parent_element: Regex::new(
                r#"(?P<open><(?:\w+:)?related_dataset\b[^>]*relation_type\s*=\s*["']parent["'][^>]*>\s*)(?P<id>[^<\s]*)"#,
            )?,
        })
    }

    pub fn env_suffix(&self) -> Option<&str> {
        self.env_suffix.as_deref()
    }

    /// Landing page URL of a record
    pub fn landing_page_url(&self, uuid: &Uuid) -> String {
        format!("{}/{}", self.catalog_url, uuid)
    }

    /// Reject namespaces that belong to another deployment environment
    ///
    /// Production (no suffix) refuses any namespace with a `dev` or `staging`
    /// component. Elsewhere a namespace carrying an environment component
    /// must end with the configured suffix.
    pub fn check_environment(&self, namespace: &str) -> Result<(), NamespaceError> {
        let components: Vec<&str> = namespace.split('.').collect();

        match self.env_suffix.as_deref() {
            None => {
                if let Some(found) = components.iter().find(|c| KNOWN_ENVIRONMENTS.contains(c)) {
                    return Err(NamespaceError::ProductionEnvironment {
                        namespace: namespace.to_string(),
                        found: found.to_string(),
                    });
                }
            },
            Some(suffix) => {
                if components.last() == Some(&suffix) {
                    return Ok(());
                }
                if let Some(found) = components
                    .iter()
                    .find(|c| KNOWN_ENVIRONMENTS.contains(c) || **c == suffix)
                {
                    return Err(NamespaceError::EnvironmentMismatch {
                        namespace: namespace.to_string(),
                        found: found.to_string(),
                        expected: suffix.to_string(),
                    });
                }
            },
        }
        Ok(())
    }

    /// Append the environment suffix unless the namespace already ends with it
    pub fn qualify_namespace(&self, namespace: &str) -> Result<String, NamespaceError> {
        self.check_environment(namespace)?;
        Ok(match self.env_suffix.as_deref() {
            Some(suffix) if namespace.rsplit('.').next() != Some(suffix) => {
                format!("{}.{}", namespace, suffix)
            },
            _ => namespace.to_string(),
        })
    }

    pub fn qualify_identifier(
        &self,
        identifier: &MetadataIdentifier,
    ) -> Result<MetadataIdentifier, NamespaceError> {
        Ok(MetadataIdentifier::new(
            self.qualify_namespace(&identifier.namespace)?,
            identifier.uuid,
        ))
    }

    /// Qualify the record and parent namespaces, then set the landing page
    pub fn apply(&self, record: &mut Record) -> Result<(), NamespaceError> {
        let qualified = self.qualify_identifier(&record.identifier)?;
        let parent = record
            .parent
            .as_ref()
            .map(|p| self.qualify_identifier(p).map(|q| (p.clone(), q)))
            .transpose()?;

        if qualified != record.identifier {
            record.xml =
                replace_identifier(&self.identifier_element, &record.xml, &record.identifier, &qualified)
                    .ok_or_else(|| NamespaceError::NotRewritten(record.identifier.to_string()))?;
            tracing::debug!(from = %record.identifier, to = %qualified, "Qualified namespace");
            record.identifier = qualified;
        }

        if let Some((original, qualified)) = parent {
            if qualified != original {
                record.xml = replace_identifier(&self.parent_element, &record.xml, &original, &qualified)
                    .ok_or_else(|| NamespaceError::NotRewritten(original.to_string()))?;
                tracing::debug!(from = %original, to = %qualified, "Qualified parent namespace");
                record.parent = Some(qualified);
            }
        }

        record.xml = self.inject_landing_page(&record.xml, &record.identifier.uuid);
        Ok(())
    }

    /// Replace the landing page block, or insert one before the closing root tag
    ///
    /// Repeated landing page blocks are collapsed into the first one.
    pub fn inject_landing_page(&self, xml: &str, uuid: &Uuid) -> String {
        let url = self.landing_page_url(uuid);

        if self.landing_block.is_match(xml) {
            let mut first = true;
            return self
                .landing_block
                .replace_all(xml, |caps: &Captures<'_>| {
                    if !first {
                        return String::new();
                    }
                    first = false;
                    let lead = caps.name("lead").map_or("", |m| m.as_str());
                    let prefix = caps.name("p").map_or("", |m| m.as_str());
                    format!("{}{}", lead, landing_page_block(prefix, &url))
                })
                .into_owned();
        }

        let Some(close) = self.root_close.captures_iter(xml).last() else {
            tracing::warn!("No closing mmd tag found, landing page not added");
            return xml.to_string();
        };
        let Some(tag) = close.get(0) else {
            return xml.to_string();
        };
        let prefix = close.name("p").map_or("", |m| m.as_str());

        format!(
            "{}\n  {}\n{}",
            xml[..tag.start()].trim_end(),
            landing_page_block(prefix, &url),
            &xml[tag.start()..]
        )
    }
}

fn landing_page_block(prefix: &str, url: &str) -> String {
    format!(
        "<{p}related_information>\n    <{p}type>{kind}</{p}type>\n    <{p}description/>\n    <{p}resource>{url}</{p}resource>\n  </{p}related_information>",
        p = prefix,
        kind = LANDING_PAGE_TYPE,
        url = url
    )
}

/// Rewrite the identifier text of the first element `pattern` finds holding `from`
///
/// Identifiers are compared parsed, so any UUID spelling matches. Returns
/// `None` when no element was rewritten.
fn replace_identifier(
    pattern: &Regex,
    xml: &str,
    from: &MetadataIdentifier,
    to: &MetadataIdentifier,
) -> Option<String> {
    let mut done = false;
    let rewritten = pattern
        .replace_all(xml, |caps: &Captures<'_>| {
            if !done && MetadataIdentifier::parse(&caps["id"]).is_ok_and(|id| id == *from) {
                done = true;
                format!("{}{}", &caps["open"], to)
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();
    done.then_some(rewritten)
}
