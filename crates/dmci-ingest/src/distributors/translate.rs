//! MMD to ISO 19139 translation for the catalog service

use crate::mmd::{english_text, LANDING_PAGE_TYPE};
use crate::xml::Element;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;

const GMD: &str = "http://www.isotc211.org/2005/gmd";
const GCO: &str = "http://www.isotc211.org/2005/gco";
const SCOPE_CODE_LIST: &str =
    "http://standards.iso.org/iso/19139/resources/gmxCodelists.xml#MD_ScopeCode";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to translate MMD to ISO19139: {0}")]
pub struct TranslateError(pub String);

/// Per-record translation input beyond the document itself
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslationContext {
    /// The record is listed as a parent dataset
    pub is_parent: bool,
}

/// Converts an MMD document into the catalog's record schema
pub trait RecordTranslator: Send + Sync {
    fn translate(&self, mmd: &Element, context: &TranslationContext) -> Result<String, TranslateError>;
}

/// Produces a `gmd:MD_Metadata` record
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoTranslator;

impl RecordTranslator for IsoTranslator {
    fn translate(&self, mmd: &Element, context: &TranslationContext) -> Result<String, TranslateError> {
        let identifier = mmd
            .find_text("metadata_identifier")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TranslateError("missing metadata_identifier".into()))?;

        let mut w = IsoWriter::new();
        w.start("gmd:MD_Metadata", &[("xmlns:gmd", GMD), ("xmlns:gco", GCO)])?;

        w.string("gmd:fileIdentifier", identifier)?;
        w.string("gmd:language", "eng")?;

        if let Some(parent) = mmd
            .children_named("related_dataset")
            .find(|e| e.attr("relation_type") == Some("parent"))
        {
            w.string("gmd:parentIdentifier", parent.text())?;
        }

        let scope = if context.is_parent { "series" } else { "dataset" };
        w.start("gmd:hierarchyLevel", &[])?;
        w.leaf(
            "gmd:MD_ScopeCode",
            &[("codeList", SCOPE_CODE_LIST), ("codeListValue", scope)],
            scope,
        )?;
        w.end("gmd:hierarchyLevel")?;

        w.start("gmd:dateStamp", &[])?;
        w.leaf("gco:DateTime", &[], &date_stamp(mmd))?;
        w.end("gmd:dateStamp")?;

        w.start("gmd:identificationInfo", &[])?;
        w.start("gmd:MD_DataIdentification", &[])?;

        w.start("gmd:citation", &[])?;
        w.start("gmd:CI_Citation", &[])?;
        w.string("gmd:title", english_text(mmd, "title").unwrap_or_default())?;
        w.end("gmd:CI_Citation")?;
        w.end("gmd:citation")?;

        w.string("gmd:abstract", english_text(mmd, "abstract").unwrap_or_default())?;

        for block in mmd.children_named("keywords") {
            let keywords: Vec<&str> = block
                .children_named("keyword")
                .map(Element::text)
                .filter(|k| !k.is_empty())
                .collect();
            if keywords.is_empty() {
                continue;
            }
            w.start("gmd:descriptiveKeywords", &[])?;
            w.start("gmd:MD_Keywords", &[])?;
            for keyword in keywords {
                w.string("gmd:keyword", keyword)?;
            }
            w.end("gmd:MD_Keywords")?;
            w.end("gmd:descriptiveKeywords")?;
        }

        if let Some(rectangle) = mmd.find("geographic_extent/rectangle") {
            w.start("gmd:extent", &[])?;
            w.start("gmd:EX_Extent", &[])?;
            w.start("gmd:geographicElement", &[])?;
            w.start("gmd:EX_GeographicBoundingBox", &[])?;
            for (direction, element) in [
                ("west", "gmd:westBoundLongitude"),
                ("east", "gmd:eastBoundLongitude"),
                ("south", "gmd:southBoundLatitude"),
                ("north", "gmd:northBoundLatitude"),
            ] {
                if let Some(value) = rectangle.find_text(direction) {
                    w.start(element, &[])?;
                    w.leaf("gco:Decimal", &[], value)?;
                    w.end(element)?;
                }
            }
            w.end("gmd:EX_GeographicBoundingBox")?;
            w.end("gmd:geographicElement")?;
            w.end("gmd:EX_Extent")?;
            w.end("gmd:extent")?;
        }

        w.end("gmd:MD_DataIdentification")?;
        w.end("gmd:identificationInfo")?;

        if let Some(landing_page) = mmd
            .children_named("related_information")
            .find(|e| e.find_text("type") == Some(LANDING_PAGE_TYPE))
            .and_then(|e| e.find_text("resource"))
        {
            w.start("gmd:distributionInfo", &[])?;
            w.start("gmd:MD_Distribution", &[])?;
            w.start("gmd:transferOptions", &[])?;
            w.start("gmd:MD_DigitalTransferOptions", &[])?;
            w.start("gmd:onLine", &[])?;
            w.start("gmd:CI_OnlineResource", &[])?;
            w.start("gmd:linkage", &[])?;
            w.leaf("gmd:URL", &[], landing_page)?;
            w.end("gmd:linkage")?;
            w.string("gmd:name", LANDING_PAGE_TYPE)?;
            w.end("gmd:CI_OnlineResource")?;
            w.end("gmd:onLine")?;
            w.end("gmd:MD_DigitalTransferOptions")?;
            w.end("gmd:transferOptions")?;
            w.end("gmd:MD_Distribution")?;
            w.end("gmd:distributionInfo")?;
        }

        w.end("gmd:MD_Metadata")?;
        w.finish()
    }
}

/// Latest `last_metadata_update/update/datetime`, or the current time
fn date_stamp(mmd: &Element) -> String {
    mmd.find_all("last_metadata_update/update/datetime")
        .into_iter()
        .map(Element::text)
        .filter(|s| !s.is_empty())
        .max()
        .map(str::to_string)
        .unwrap_or_else(|| {
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        })
}

struct IsoWriter {
    inner: Writer<Vec<u8>>,
}

impl IsoWriter {
    fn new() -> Self {
        Self {
            inner: Writer::new(Vec::new()),
        }
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), TranslateError> {
        self.inner
            .write_event(event)
            .map_err(|e| TranslateError(e.to_string()))
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), TranslateError> {
        let mut element = BytesStart::new(name);
        for attribute in attributes {
            element.push_attribute(*attribute);
        }
        self.emit(Event::Start(element))
    }

    fn end(&mut self, name: &str) -> Result<(), TranslateError> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    fn leaf(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<(), TranslateError> {
        self.start(name, attributes)?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// `<name><gco:CharacterString>text</gco:CharacterString></name>`
    fn string(&mut self, name: &str, text: &str) -> Result<(), TranslateError> {
        self.start(name, &[])?;
        self.leaf("gco:CharacterString", &[], text)?;
        self.end(name)
    }

    fn finish(self) -> Result<String, TranslateError> {
        String::from_utf8(self.inner.into_inner()).map_err(|e| TranslateError(e.to_string()))
    }
}
