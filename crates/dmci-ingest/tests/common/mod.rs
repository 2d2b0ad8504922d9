//! Shared fixtures for the dmci-ingest integration tests
//!
//! - MMD documents that pass structure and content checks
//! - A temporary directory tree with cache, rejected and archive folders
//! - Helpers to build services and staged distributor arguments

#![allow(dead_code)]

use dmci_ingest::distributors::{
    Backends, DistCommand, DistributorArgs, FileArchive, FileOptions, StagedDocument,
};
use dmci_ingest::jobs::JobStager;
use dmci_ingest::mmd::MetadataIdentifier;
use dmci_ingest::transform::RecordTransformer;
use dmci_ingest::validation::vocabulary::UnavailableVocabulary;
use dmci_ingest::validation::{ContentValidator, MmdStructureValidator, Vocabularies};
use dmci_ingest::{Ingest, Services};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const RECORD_UUID: &str = "64db6102-14ce-41e9-b93b-61dbb2cb8b4e";
pub const PARENT_UUID: &str = "a1ddaf0f-cae0-4a15-9b37-3468e9cb1a2b";
pub const CATALOG_URL: &str = "https://data.met.no/dataset";

/// A complete MMD record in namespace `namespace`
pub fn mmd(namespace: &str, uuid: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<mmd:mmd xmlns:mmd="http://www.met.no/schema/mmd">
  <mmd:metadata_identifier>{namespace}:{uuid}</mmd:metadata_identifier>
  <mmd:title xml:lang="en">Sea surface temperature</mmd:title>
  <mmd:abstract xml:lang="en">Daily gridded sea surface temperature.</mmd:abstract>
  <mmd:metadata_status>Active</mmd:metadata_status>
  <mmd:dataset_production_status>Complete</mmd:dataset_production_status>
  <mmd:collection>NBS</mmd:collection>
  <mmd:last_metadata_update>
    <mmd:update>
      <mmd:datetime>2022-02-01T00:00:00Z</mmd:datetime>
      <mmd:type>Created</mmd:type>
    </mmd:update>
  </mmd:last_metadata_update>
  <mmd:temporal_extent>
    <mmd:start_date>2020-01-01T00:00:00Z</mmd:start_date>
  </mmd:temporal_extent>
  <mmd:iso_topic_category>oceans</mmd:iso_topic_category>
  <mmd:keywords vocabulary="GCMDSK">
    <mmd:keyword>Earth Science &gt; Oceans &gt; Ocean Temperature</mmd:keyword>
  </mmd:keywords>
  <mmd:operational_status>Operational</mmd:operational_status>
  <mmd:geographic_extent>
    <mmd:rectangle srsName="EPSG:4326">
      <mmd:north>76.2</mmd:north>
      <mmd:south>71.6</mmd:south>
      <mmd:west>-28.1</mmd:west>
      <mmd:east>-11.2</mmd:east>
    </mmd:rectangle>
  </mmd:geographic_extent>
  <mmd:related_information>
    <mmd:type>Project home page</mmd:type>
    <mmd:resource>https://www.met.no/projects/sst</mmd:resource>
  </mmd:related_information>
</mmd:mmd>
"#
    )
}

pub fn valid_mmd() -> String {
    mmd("no.met", RECORD_UUID)
}

/// A record pointing at `parent` with `relation_type="parent"`
pub fn child_mmd(namespace: &str, uuid: &str, parent: &str) -> String {
    mmd(namespace, uuid).replace(
        "</mmd:mmd>",
        &format!(
            "  <mmd:related_dataset relation_type=\"parent\">{}</mmd:related_dataset>\n</mmd:mmd>",
            parent
        ),
    )
}

pub fn identifier(value: &str) -> MetadataIdentifier {
    MetadataIdentifier::parse(value).expect("valid identifier")
}

/// Temporary cache, rejected and archive directories
pub struct TestDirs {
    pub root: TempDir,
    pub cache: PathBuf,
    pub rejected: PathBuf,
    pub archive: PathBuf,
}

impl TestDirs {
    pub fn new() -> Self {
        let root = TempDir::new().expect("tempdir");
        let cache = root.path().join("cache");
        let rejected = root.path().join("rejected");
        let archive = root.path().join("archive");
        for dir in [&cache, &rejected, &archive] {
            std::fs::create_dir_all(dir).expect("create dir");
        }
        Self {
            root,
            cache,
            rejected,
            archive,
        }
    }

    pub fn archive(&self) -> FileArchive {
        FileArchive::new(FileOptions {
            archive_root: self.archive.clone(),
        })
        .expect("archive root")
    }

    pub fn jobs(&self) -> JobStager {
        JobStager::new(&self.cache, &self.rejected)
    }

    /// Write a document into the cache directory as a staged job
    pub fn stage(&self, name: &str, content: &str) -> PathBuf {
        let path = self.cache.join(name);
        std::fs::write(&path, content).expect("write staged file");
        path
    }
}

pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn services(backends: Backends, distributors: &[&str], env: Option<&str>) -> Services {
    Services {
        schema: Box::new(MmdStructureValidator::default()),
        content: ContentValidator::new(Vocabularies::builtin(Box::new(UnavailableVocabulary(
            "CF standard name",
        )))),
        transformer: RecordTransformer::new(env, CATALOG_URL).expect("transformer"),
        backends,
        distributors: distributors.iter().map(|s| s.to_string()).collect(),
        parent_list: None,
    }
}

pub fn ingest(dirs: &TestDirs, backends: Backends, distributors: &[&str]) -> Ingest {
    Ingest::new(services(backends, distributors, None), dirs.jobs(), 100_000)
}

pub fn document_args(command: DistCommand, path: &Path, id: &str) -> DistributorArgs {
    DistributorArgs::for_document(
        command,
        StagedDocument {
            path: path.to_path_buf(),
            identifier: identifier(id),
        },
    )
}
