//! Catalog service distributor (OGC CSW 2.0.2 transactions)

use super::translate::{RecordTranslator, TranslationContext};
use super::{
    DistCommand, DistResult, DistStatus, Distributor, DistributorArgs, DistributorKind,
    ParentSearch,
};
use crate::config::Config;
use crate::error::{IngestError, IngestResult};
use crate::mmd::MetadataIdentifier;
use crate::xml::Element;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

const TRANSACTION_OPEN: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    r#"<csw:Transaction xmlns:csw="http://www.opengis.net/cat/csw/2.0.2" "#,
    r#"xmlns:ows="http://www.opengis.net/ows" "#,
    r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
    r#"xsi:schemaLocation="http://www.opengis.net/cat/csw/2.0.2 "#,
    r#"http://schemas.opengis.net/csw/2.0.2/CSW-publication.xsd" "#,
    r#"service="CSW" version="2.0.2">"#,
);

const DELETE_TRANSACTION_OPEN: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    r#"<csw:Transaction xmlns:ogc="http://www.opengis.net/ogc" "#,
    r#"xmlns:csw="http://www.opengis.net/cat/csw/2.0.2" "#,
    r#"xmlns:ows="http://www.opengis.net/ows" "#,
    r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
    r#"xsi:schemaLocation="http://www.opengis.net/cat/csw/2.0.2 "#,
    r#"http://schemas.opengis.net/csw/2.0.2/CSW-publication.xsd" "#,
    r#"service="CSW" version="2.0.2">"#,
);

/// Wrap a translated record in a CSW `Insert` transaction
pub fn insert_envelope(record: &str) -> String {
    format!(
        "{}<csw:Insert>{}</csw:Insert></csw:Transaction>",
        TRANSACTION_OPEN, record
    )
}

/// CSW `Delete` transaction matching `apiso:Identifier`
pub fn delete_envelope(identifier: &str) -> String {
    format!(
        "{}<csw:Delete><csw:Constraint version=\"1.1.0\"><ogc:Filter><ogc:PropertyIsEqualTo>\
         <ogc:PropertyName>apiso:Identifier</ogc:PropertyName><ogc:Literal>{}</ogc:Literal>\
         </ogc:PropertyIsEqualTo></ogc:Filter></csw:Constraint></csw:Delete></csw:Transaction>",
        DELETE_TRANSACTION_OPEN,
        quick_xml::escape::escape(identifier)
    )
}

/// Transaction summary counter a command is judged by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionCounter {
    Inserted,
    Updated,
    Deleted,
}

impl TransactionCounter {
    pub fn element(self) -> &'static str {
        match self {
            TransactionCounter::Inserted => "totalInserted",
            TransactionCounter::Updated => "totalUpdated",
            TransactionCounter::Deleted => "totalDeleted",
        }
    }
}

/// Interpret a CSW transaction response body
///
/// `ExceptionReport` yields its `ExceptionText`; `TransactionResponse`
/// succeeds when the relevant counter is at least one.
pub fn parse_transaction_response(counter: TransactionCounter, body: &str) -> DistResult {
    let root = match Element::parse(body.trim().as_bytes()) {
        Ok(root) => root,
        Err(e) => {
            error!(error = %e, "Could not parse response XML from the catalog service");
            return DistResult::failure(
                DistStatus::Malformed,
                "Could not parse response XML from the catalog service",
            );
        },
    };

    match root.name.as_str() {
        "ExceptionReport" => {
            let message = root
                .find_text("Exception/ExceptionText")
                .filter(|t| !t.is_empty())
                .unwrap_or("Unknown Error");
            error!(%message, "Catalog service returned an exception");
            DistResult::failure(DistStatus::Rejected, message)
        },
        "TransactionResponse" => {
            let count = root
                .find_text(&format!("TransactionSummary/{}", counter.element()))
                .map(|t| {
                    t.parse::<u64>().unwrap_or_else(|_| {
                        warn!(value = %t, "Unreadable transaction counter");
                        0
                    })
                })
                .unwrap_or(0);

            if count >= 1 {
                DistResult::ok(format!("{}: {}", counter.element(), count))
            } else {
                DistResult::failure(
                    DistStatus::Rejected,
                    format!("Catalog transaction reported {}: 0", counter.element()),
                )
            }
        },
        other => {
            error!(root = %other, "Unexpected response from the catalog service");
            DistResult::failure(
                DistStatus::Malformed,
                format!("Unexpected response from the catalog service: <{}>", other),
            )
        },
    }
}

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub service_url: String,
}

impl CatalogOptions {
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .pycsw
            .csw_service_url
            .clone()
            .map(|service_url| Self { service_url })
    }
}

/// HTTP client for the CSW endpoint
#[derive(Debug, Clone)]
pub struct CswClient {
    service_url: Url,
    http: reqwest::Client,
}

impl CswClient {
    pub fn new(options: CatalogOptions, http: reqwest::Client) -> IngestResult<Self> {
        let service_url = Url::parse(&options.service_url).map_err(|e| {
            IngestError::Config(format!("Invalid csw_service_url '{}': {}", options.service_url, e))
        })?;
        Ok(Self { service_url, http })
    }

    /// POST a transaction and judge it by `counter`
    pub async fn transaction(&self, body: String, counter: TransactionCounter) -> DistResult {
        let response = self
            .http
            .post(self.service_url.clone())
            .header(CONTENT_TYPE, "application/xml")
            .header(ACCEPT, "application/xml")
            .body(body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Catalog service unavailable");
                return DistResult::failure(
                    DistStatus::Unavailable,
                    format!("Catalog service unavailable: {}", e),
                );
            },
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return DistResult::failure(
                    DistStatus::Unavailable,
                    format!("Catalog service unavailable: {}", e),
                )
            },
        };

        if !status.is_success() {
            error!(%status, body = %text, "Catalog transaction failed");
            return DistResult::failure(
                DistStatus::Rejected,
                format!("Catalog service returned HTTP {}: {}", status.as_u16(), text.trim()),
            );
        }

        parse_transaction_response(counter, &text)
    }

    /// Whether a record with this identifier is in the catalog
    pub async fn get_record_by_id(&self, id: &str) -> Result<bool, String> {
        let response = self
            .http
            .get(self.service_url.clone())
            .query(&[
                ("service", "CSW"),
                ("version", "2.0.2"),
                ("request", "GetRecordById"),
                ("elementsetname", "brief"),
                ("id", id),
            ])
            .header(ACCEPT, "application/xml")
            .send()
            .await
            .map_err(|e| format!("Catalog service unavailable: {}", e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("Catalog service returned HTTP {}", status.as_u16()));
        }

        let root = Element::parse(text.trim().as_bytes()).map_err(|e| e.to_string())?;
        match root.name.as_str() {
            "GetRecordByIdResponse" => Ok(!root.children.is_empty()),
            "ExceptionReport" => Err(root
                .find_text("Exception/ExceptionText")
                .unwrap_or("Unknown Error")
                .to_string()),
            other => Err(format!("Unexpected response from the catalog service: <{}>", other)),
        }
    }
}

#[async_trait]
impl ParentSearch for CswClient {
    async fn has_record(&self, identifier: &MetadataIdentifier) -> Result<bool, String> {
        self.get_record_by_id(&identifier.to_string()).await
    }
}

/// Whether the parent list names this record, by UUID or full identifier
pub fn is_listed_parent(parent_list: &str, identifier: &MetadataIdentifier) -> bool {
    let uuid = identifier.uuid.to_string();
    parent_list
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .any(|line| line == uuid || line.rsplit(':').next() == Some(uuid.as_str()))
}

/// Inserts, updates and deletes catalog records
pub struct PyCswDistributor {
    client: CswClient,
    translator: Arc<dyn RecordTranslator>,
    args: DistributorArgs,
    valid: bool,
}

impl PyCswDistributor {
    pub fn new(client: CswClient, translator: Arc<dyn RecordTranslator>, args: DistributorArgs) -> Self {
        let valid = args.validate_for(DistributorKind::PyCsw);
        Self {
            client,
            translator,
            args,
            valid,
        }
    }

    async fn translate(&self, path: &Path, identifier: &MetadataIdentifier) -> Result<String, DistResult> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "Could not read staged file");
            DistResult::failure(DistStatus::Io, format!("Could not read {}: {}", path.display(), e))
        })?;
        let mmd = Element::parse(&data)
            .map_err(|e| DistResult::failure(DistStatus::Malformed, e.to_string()))?;

        let is_parent = match &self.args.parent_list {
            Some(list) => match tokio::fs::read_to_string(list).await {
                Ok(text) => is_listed_parent(&text, identifier),
                Err(e) => {
                    warn!(path = %list.display(), error = %e, "Could not read parent list");
                    false
                },
            },
            None => false,
        };

        self.translator
            .translate(&mmd, &TranslationContext { is_parent })
            .map_err(|e| {
                error!(error = %e, "Translation failed");
                DistResult::failure(DistStatus::Malformed, e.to_string())
            })
    }

    async fn insert(&self, path: &Path, identifier: &MetadataIdentifier) -> DistResult {
        match self.translate(path, identifier).await {
            Ok(record) => {
                self.client
                    .transaction(insert_envelope(&record), TransactionCounter::Inserted)
                    .await
            },
            Err(result) => result,
        }
    }

    async fn delete(&self, identifier: &MetadataIdentifier) -> DistResult {
        self.client
            .transaction(delete_envelope(&identifier.to_string()), TransactionCounter::Deleted)
            .await
    }

    /// Delete followed by insert; a failed insert leaves the record removed
    async fn update(&self, path: &Path, identifier: &MetadataIdentifier) -> DistResult {
        let record = match self.translate(path, identifier).await {
            Ok(record) => record,
            Err(result) => return result,
        };

        let deleted = self.delete(identifier).await;
        if !deleted.is_ok() {
            return deleted;
        }

        let inserted = self
            .client
            .transaction(insert_envelope(&record), TransactionCounter::Inserted)
            .await;
        if inserted.is_ok() {
            return DistResult::ok(format!("Replaced {}", identifier));
        }

        error!(%identifier, message = %inserted.message, "Record deleted but re-insert failed");
        DistResult::failure(
            DistStatus::PartiallyApplied,
            format!(
                "Record {} was deleted but could not be inserted again: {}",
                identifier, inserted.message
            ),
        )
    }
}

#[async_trait]
impl Distributor for PyCswDistributor {
    fn kind(&self) -> DistributorKind {
        DistributorKind::PyCsw
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

        let result = match (self.args.command, &self.args.document) {
            (DistCommand::Insert, Some(document)) => self.insert(&document.path, identifier).await,
            (DistCommand::Update, Some(document)) => self.update(&document.path, identifier).await,
            (DistCommand::Delete, _) => self.delete(identifier).await,
            _ => DistResult::invalid(),
        };

        if result.is_ok() {
            info!(%identifier, message = %result.message, "Catalog updated");
        } else {
            debug!(%identifier, kind = ?result.kind, "Catalog distribution failed");
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn summary(inserted: u32, updated: u32, deleted: u32) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<csw:TransactionResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2" version="2.0.2">
  <csw:TransactionSummary>
    <csw:totalInserted>{inserted}</csw:totalInserted>
    <csw:totalUpdated>{updated}</csw:totalUpdated>
    <csw:totalDeleted>{deleted}</csw:totalDeleted>
  </csw:TransactionSummary>
</csw:TransactionResponse>"#
        )
    }

    #[test]
    fn test_insert_envelope() {
        let xml = insert_envelope("<gmd:MD_Metadata/>");
        assert!(xml.starts_with(
            r#"<?xml version="1.0" encoding="UTF-8"?><csw:Transaction xmlns:csw="http://www.opengis.net/cat/csw/2.0.2" xmlns:ows="http://www.opengis.net/ows" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://www.opengis.net/cat/csw/2.0.2 http://schemas.opengis.net/csw/2.0.2/CSW-publication.xsd" service="CSW" version="2.0.2"><csw:Insert>"#
        ));
        assert!(xml.ends_with("<gmd:MD_Metadata/></csw:Insert></csw:Transaction>"));
    }

    #[test]
    fn test_delete_envelope() {
        let xml = delete_envelope("no.met:64db6102-14ce-41e9-b93b-61dbb2cb8b4e");
        assert!(xml.contains(r#"xmlns:ogc="http://www.opengis.net/ogc""#));
        assert!(xml.contains(
            "<ogc:PropertyName>apiso:Identifier</ogc:PropertyName><ogc:Literal>no.met:64db6102-14ce-41e9-b93b-61dbb2cb8b4e</ogc:Literal>"
        ));

        let root = Element::parse(xml.as_bytes()).unwrap();
        assert_eq!(root.name, "Transaction");
        assert_eq!(
            root.find_text("Delete/Constraint/Filter/PropertyIsEqualTo/Literal"),
            Some("no.met:64db6102-14ce-41e9-b93b-61dbb2cb8b4e")
        );
    }

    #[test]
    fn test_counter_decides_success() {
        assert!(parse_transaction_response(TransactionCounter::Inserted, &summary(1, 0, 0)).is_ok());
        assert!(parse_transaction_response(TransactionCounter::Deleted, &summary(0, 0, 2)).is_ok());

        let result = parse_transaction_response(TransactionCounter::Inserted, &summary(0, 0, 0));
        assert_eq!(result.kind, DistStatus::Rejected);
        let result = parse_transaction_response(TransactionCounter::Updated, &summary(1, 0, 1));
        assert!(!result.is_ok());
    }

    #[test]
    fn test_missing_summary_counts_as_zero() {
        let body = r#"<csw:TransactionResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"/>"#;
        let result = parse_transaction_response(TransactionCounter::Inserted, body);
        assert_eq!(result.kind, DistStatus::Rejected);
    }

    #[test]
    fn test_exception_report() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows" version="1.2.0">
  <ows:Exception exceptionCode="NoApplicableCode" locator="insert">
    <ows:ExceptionText>Transaction failed: duplicate identifier</ows:ExceptionText>
  </ows:Exception>
</ows:ExceptionReport>"#;
        let result = parse_transaction_response(TransactionCounter::Inserted, body);
        assert_eq!(
            result,
            DistResult::failure(DistStatus::Rejected, "Transaction failed: duplicate identifier")
        );

        let bare = r#"<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows"/>"#;
        assert_eq!(
            parse_transaction_response(TransactionCounter::Inserted, bare).message,
            "Unknown Error"
        );
    }

    #[test]
    fn test_unexpected_and_truncated_responses() {
        let result = parse_transaction_response(
            TransactionCounter::Inserted,
            r#"<csw:GetRecordsResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"/>"#,
        );
        assert_eq!(result.kind, DistStatus::Malformed);

        let truncated = &summary(1, 0, 0)[..120];
        let result = parse_transaction_response(TransactionCounter::Inserted, truncated);
        assert_eq!(result.kind, DistStatus::Malformed);
        assert!(result.message.to_lowercase().contains("could not parse"));
    }

    #[test]
    fn test_parent_list_membership() {
        let id = MetadataIdentifier::parse("no.met:64db6102-14ce-41e9-b93b-61dbb2cb8b4e").unwrap();
        assert!(is_listed_parent("64db6102-14ce-41e9-b93b-61dbb2cb8b4e\n", &id));
        assert!(is_listed_parent(
            "# parents\nno.met.dev:64db6102-14ce-41e9-b93b-61dbb2cb8b4e",
            &id
        ));
        assert!(!is_listed_parent("a1ddaf0f-cae0-4a15-9b37-3468e9cb1a2b", &id));
    }

    #[test]
    fn test_invalid_service_url() {
        let result = CswClient::new(
            CatalogOptions {
                service_url: "not a url".into(),
            },
            reqwest::Client::new(),
        );
        assert!(matches!(result, Err(IngestError::Config(_))));
    }
}
