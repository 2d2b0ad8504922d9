//! Search index distributor
//!
//! Documents go to a Solr core through its JSON update handler. Records with a
//! parent mark the parent document `isParent` before they are indexed.

use super::{
    DistCommand, DistResult, DistStatus, Distributor, DistributorArgs, DistributorKind,
};
use crate::config::Config;
use crate::error::{IngestError, IngestResult};
use crate::mmd::{english_text, MetadataIdentifier, LANDING_PAGE_TYPE};
use crate::xml::Element;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::Path;
use tracing::{error, info, instrument, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub service_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub fail_on_missing_parent: bool,
    pub commit_on_delete: bool,
}

impl SearchOptions {
    pub fn from_config(config: &Config) -> Option<Self> {
        let solr = &config.solr;
        solr.solr_service_url.clone().map(|service_url| Self {
            service_url,
            username: solr.solr_username.clone(),
            password: solr.solr_password.clone(),
            fail_on_missing_parent: solr.missing_parent_fail,
            commit_on_delete: solr.commit_on_delete,
        })
    }
}

// ============================================================================
// Index document model
// ============================================================================

/// Build the index document for an MMD record
pub fn to_solr_document(
    mmd: &Element,
    identifier: &MetadataIdentifier,
    parent: Option<&MetadataIdentifier>,
) -> Value {
    let mut doc = Map::new();
    doc.insert("id".into(), json!(identifier.to_index_id()));
    doc.insert("metadata_identifier".into(), json!(identifier.to_string()));

    if let Some(title) = english_text(mmd, "title") {
        doc.insert("title".into(), json!(title));
    }
    if let Some(abstract_text) = english_text(mmd, "abstract") {
        doc.insert("abstract".into(), json!(abstract_text));
    }
    if let Some(status) = mmd.find_text("metadata_status") {
        doc.insert("metadata_status".into(), json!(status));
    }

    let collections: Vec<&str> = mmd.children_named("collection").map(Element::text).collect();
    if !collections.is_empty() {
        doc.insert("collection".into(), json!(collections));
    }

    let keywords: Vec<&str> = mmd
        .find_all("keywords/keyword")
        .into_iter()
        .map(Element::text)
        .filter(|k| !k.is_empty())
        .collect();
    if !keywords.is_empty() {
        doc.insert("keywords_keyword".into(), json!(keywords));
    }

    let updates: Vec<&str> = mmd
        .find_all("last_metadata_update/update/datetime")
        .into_iter()
        .map(Element::text)
        .collect();
    if let Some(latest) = updates.iter().max() {
        doc.insert("last_metadata_update_datetime".into(), json!(latest));
    }

    if let Some(start) = mmd.find_text("temporal_extent/start_date") {
        doc.insert("temporal_extent_start_date".into(), json!(start));
    }
    if let Some(end) = mmd.find_text("temporal_extent/end_date").filter(|s| !s.is_empty()) {
        doc.insert("temporal_extent_end_date".into(), json!(end));
    }

    if let Some(rectangle) = mmd.find("geographic_extent/rectangle") {
        let bound = |name: &str| rectangle.find_text(name).and_then(|v| v.parse::<f64>().ok());
        if let (Some(north), Some(south), Some(east), Some(west)) =
            (bound("north"), bound("south"), bound("east"), bound("west"))
        {
            doc.insert("geographic_extent_rectangle_north".into(), json!(north));
            doc.insert("geographic_extent_rectangle_south".into(), json!(south));
            doc.insert("geographic_extent_rectangle_east".into(), json!(east));
            doc.insert("geographic_extent_rectangle_west".into(), json!(west));
            doc.insert(
                "bbox".into(),
                json!(format!("ENVELOPE({}, {}, {}, {})", west, east, north, south)),
            );
        }
    }

    if let Some(url) = mmd
        .children_named("related_information")
        .find(|e| e.find_text("type") == Some(LANDING_PAGE_TYPE))
        .and_then(|e| e.find_text("resource"))
    {
        doc.insert("related_url_landing_page".into(), json!(url));
    }

    match parent {
        Some(parent) => {
            doc.insert("related_dataset".into(), json!(parent.to_string()));
            doc.insert("related_dataset_id".into(), json!(parent.to_index_id()));
            doc.insert("isChild".into(), json!(true));
            doc.insert("dataset_type".into(), json!("Level-2"));
        },
        None => {
            doc.insert("isChild".into(), json!(false));
            doc.insert("dataset_type".into(), json!("Level-1"));
        },
    }
    doc.insert("isParent".into(), json!(false));

    Value::Object(doc)
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for one Solr core
#[derive(Clone)]
pub struct SolrClient {
    base: Url,
    http: reqwest::Client,
    credentials: Option<(String, String)>,
    fail_on_missing_parent: bool,
    commit_on_delete: bool,
}

impl SolrClient {
    pub fn new(options: SearchOptions, http: reqwest::Client) -> IngestResult<Self> {
        let base = format!("{}/", options.service_url.trim_end_matches('/'));
        let base = Url::parse(&base).map_err(|e| {
            IngestError::Config(format!("Invalid solr_service_url '{}': {}", options.service_url, e))
        })?;

        let credentials = match (options.username, options.password) {
            (Some(username), Some(password)) => Some((username, password)),
            (None, None) => None,
            _ => {
                warn!("Only one of the Solr username and password is set; not authenticating");
                None
            },
        };

        Ok(Self {
            base,
            http,
            credentials,
            fail_on_missing_parent: options.fail_on_missing_parent,
            commit_on_delete: options.commit_on_delete,
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, DistResult> {
        let url = self
            .base
            .join(path)
            .map_err(|e| DistResult::failure(DistStatus::Invalid, e.to_string()))?;
        let builder = self.http.request(method, url);
        Ok(match &self.credentials {
            Some((username, password)) => builder.basic_auth(username, Some(password)),
            None => builder,
        })
    }

    async fn send(builder: RequestBuilder) -> Result<Response, DistResult> {
        let response = builder.send().await.map_err(|e| {
            error!(error = %e, "Search index unavailable");
            DistResult::failure(DistStatus::Unavailable, format!("Search index unavailable: {}", e))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.pointer("/error/msg").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        error!(%status, %message, "Search index request failed");
        Err(DistResult::failure(
            DistStatus::Rejected,
            format!("Search index returned HTTP {}: {}", status.as_u16(), message.trim()),
        ))
    }

    /// Real-time get of a document by index id
    pub async fn get(&self, index_id: &str) -> Result<Option<Value>, DistResult> {
        let builder = self.request(Method::GET, "get")?.query(&[("id", index_id)]);
        let response = Self::send(builder).await?;
        let body: Value = response.json().await.map_err(|e| {
            DistResult::failure(
                DistStatus::Malformed,
                format!("Could not parse response from the search index: {}", e),
            )
        })?;
        Ok(body.get("doc").filter(|doc| !doc.is_null()).cloned())
    }

    /// Add or replace one document and commit
    pub async fn index(&self, document: &Value) -> Result<(), DistResult> {
        let builder = self
            .request(Method::POST, "update")?
            .query(&[("commit", "true")])
            .json(&json!([document]));
        Self::send(builder).await.map(|_| ())
    }

    /// Atomic update setting `isParent` on an indexed document
    pub async fn mark_parent(&self, index_id: &str) -> Result<(), DistResult> {
        let builder = self
            .request(Method::POST, "update")?
            .query(&[("commit", "true")])
            .json(&json!([{ "id": index_id, "isParent": { "set": true } }]));
        Self::send(builder).await.map(|_| ())
    }

    pub async fn delete(&self, index_id: &str) -> Result<(), DistResult> {
        let commit = if self.commit_on_delete { "true" } else { "false" };
        let builder = self
            .request(Method::POST, "update")?
            .query(&[("commit", commit)])
            .json(&json!({ "delete": { "id": index_id } }));
        Self::send(builder).await.map(|_| ())
    }
}

impl fmt::Debug for SolrClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolrClient")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Distributor
// ============================================================================

pub struct SolrDistributor {
    client: SolrClient,
    args: DistributorArgs,
    valid: bool,
}

impl SolrDistributor {
    pub fn new(client: SolrClient, args: DistributorArgs) -> Self {
        let valid = args.validate_for(DistributorKind::Solr);
        Self { client, args, valid }
    }

    async fn load(&self, path: &Path) -> Result<Element, DistResult> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "Could not read staged file");
            DistResult::failure(DistStatus::Io, format!("Could not read {}: {}", path.display(), e))
        })?;
        Element::parse(&data).map_err(|e| DistResult::failure(DistStatus::Malformed, e.to_string()))
    }

    /// Flag the parent document; a missing parent is fatal only when configured so
    async fn update_parent(&self, parent: &MetadataIdentifier) -> Result<(), DistResult> {
        let parent_id = parent.to_index_id();
        match self.client.get(&parent_id).await? {
            Some(_) => self.client.mark_parent(&parent_id).await,
            None if self.client.fail_on_missing_parent => Err(DistResult::failure(
                DistStatus::Rejected,
                format!("Parent {} is not in the index. Make sure to index parent first.", parent),
            )),
            None => {
                warn!(%parent, "Parent is not in the index; indexing child anyway");
                Ok(())
            },
        }
    }

    async fn index_document(&self, path: &Path, identifier: &MetadataIdentifier, replace: bool) -> Result<String, DistResult> {
        let mmd = self.load(path).await?;
        let index_id = identifier.to_index_id();

        let existing = self.client.get(&index_id).await?;
        if existing.is_some() && !replace {
            return Err(DistResult::failure(
                DistStatus::Rejected,
                format!("Document already exists in index, {}", identifier),
            ));
        }

        let parent = MetadataIdentifier::parent_of(&mmd)
            .map_err(|e| DistResult::failure(DistStatus::Malformed, e.to_string()))?;
        if let Some(parent) = &parent {
            self.update_parent(parent).await?;
        }

        let mut document = to_solr_document(&mmd, identifier, parent.as_ref());
        let was_parent = existing
            .as_ref()
            .and_then(|doc| doc.get("isParent"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if was_parent {
            document["isParent"] = json!(true);
        }

        self.client.index(&document).await.map_err(|failure| {
            DistResult::failure(
                failure.kind,
                format!("Could not index file {}: {}", path.display(), failure.message),
            )
        })?;

        Ok(if replace {
            format!("Updated {} in index", identifier)
        } else {
            format!("Indexed {}", identifier)
        })
    }

    async fn delete(&self, identifier: &MetadataIdentifier) -> Result<String, DistResult> {
        // Documents are keyed by the dashed index id, not `namespace:uuid`.
        self.client.delete(&identifier.to_index_id()).await?;
        Ok(format!("Deleted {} from index", identifier))
    }
}

#[async_trait]
impl Distributor for SolrDistributor {
    fn kind(&self) -> DistributorKind {
        DistributorKind::Solr
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    #[instrument(skip(self), fields(command = %self.args.command))]
    async fn run(&self) -> DistResult {
        if !self.valid {
            return DistResult::invalid();
        }
        let Some(identifier) = self.args.target() else {
            return DistResult::invalid();
        };

        let outcome = match (self.args.command, &self.args.document) {
            (DistCommand::Insert, Some(document)) => {
                self.index_document(&document.path, identifier, false).await
            },
            (DistCommand::Update, Some(document)) => {
                self.index_document(&document.path, identifier, true).await
            },
            (DistCommand::Delete, _) => self.delete(identifier).await,
            _ => return DistResult::invalid(),
        };

        match outcome {
            Ok(message) => {
                info!(%identifier, "{}", message);
                DistResult::ok(message)
            },
            Err(failure) => failure,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const CHILD: &str = r#"<mmd:mmd xmlns:mmd="http://www.met.no/schema/mmd">
  <mmd:metadata_identifier>no.met:64db6102-14ce-41e9-b93b-61dbb2cb8b4e</mmd:metadata_identifier>
  <mmd:title xml:lang="en">Sea temperature</mmd:title>
  <mmd:abstract xml:lang="en">Gridded fields.</mmd:abstract>
  <mmd:metadata_status>Active</mmd:metadata_status>
  <mmd:collection>ADC</mmd:collection>
  <mmd:collection>NBS</mmd:collection>
  <mmd:keywords vocabulary="GCMDSK"><mmd:keyword>Earth Science &gt; Oceans</mmd:keyword></mmd:keywords>
  <mmd:temporal_extent><mmd:start_date>2020-01-01T00:00:00Z</mmd:start_date></mmd:temporal_extent>
  <mmd:geographic_extent>
    <mmd:rectangle><mmd:north>76.2</mmd:north><mmd:south>71.6</mmd:south><mmd:west>-28.1</mmd:west><mmd:east>-11.2</mmd:east></mmd:rectangle>
  </mmd:geographic_extent>
  <mmd:related_dataset relation_type="parent">no.met:a1ddaf0f-cae0-4a15-9b37-3468e9cb1a2b</mmd:related_dataset>
</mmd:mmd>"#;

    #[test]
    fn test_solr_document_fields() {
        let mmd = Element::parse(CHILD.as_bytes()).unwrap();
        let identifier = MetadataIdentifier::from_document(&mmd).unwrap();
        let parent = MetadataIdentifier::parent_of(&mmd).unwrap();
        let doc = to_solr_document(&mmd, &identifier, parent.as_ref());

        assert_eq!(doc["id"], "no-met-64db6102-14ce-41e9-b93b-61dbb2cb8b4e");
        assert_eq!(doc["metadata_identifier"], "no.met:64db6102-14ce-41e9-b93b-61dbb2cb8b4e");
        assert_eq!(doc["title"], "Sea temperature");
        assert_eq!(doc["collection"], json!(["ADC", "NBS"]));
        assert_eq!(doc["keywords_keyword"], json!(["Earth Science > Oceans"]));
        assert_eq!(doc["bbox"], "ENVELOPE(-28.1, -11.2, 76.2, 71.6)");
        assert_eq!(doc["related_dataset_id"], "no-met-a1ddaf0f-cae0-4a15-9b37-3468e9cb1a2b");
        assert_eq!(doc["isChild"], true);
        assert_eq!(doc["isParent"], false);
        assert_eq!(doc["dataset_type"], "Level-2");
        assert!(doc.get("temporal_extent_end_date").is_none());
    }

    #[test]
    fn test_solr_document_without_parent() {
        let mmd = Element::parse(CHILD.as_bytes()).unwrap();
        let identifier = MetadataIdentifier::from_document(&mmd).unwrap();
        let doc = to_solr_document(&mmd, &identifier, None);
        assert_eq!(doc["isChild"], false);
        assert_eq!(doc["dataset_type"], "Level-1");
        assert!(doc.get("related_dataset").is_none());
    }

    #[test]
    fn test_service_url_gets_trailing_slash() {
        let client = SolrClient::new(
            SearchOptions {
                service_url: "http://localhost:8983/solr/mmd".into(),
                username: Some("user".into()),
                password: None,
                fail_on_missing_parent: true,
                commit_on_delete: false,
            },
            reqwest::Client::new(),
        )
        .unwrap();
        assert_eq!(client.base.as_str(), "http://localhost:8983/solr/mmd/");
        assert_eq!(client.base.join("update").unwrap().path(), "/solr/mmd/update");
        assert!(client.credentials.is_none());
    }
}
