//! End-to-end job tests: staging, validation, distribution, commit and reject

mod common;

use common::*;
use dmci_ingest::distributors::{archive_path, Backends, CatalogOptions, CswClient, DistCommand};
use dmci_ingest::{Ingest, IngestError, Worker};
use wiremock::{
    matchers::{body_string_contains, method},
    Mock, MockServer, ResponseTemplate,
};

fn file_ingest(dirs: &TestDirs, distributors: &[&str]) -> Ingest {
    ingest(dirs, Backends::default().with_file(dirs.archive()), distributors)
}

fn archived(dirs: &TestDirs) -> std::path::PathBuf {
    archive_path(&dirs.archive, &RECORD_UUID.parse().unwrap())
}

#[tokio::test]
async fn test_valid_document_leaves_no_trace() {
    let dirs = TestDirs::new();
    let ingest = file_ingest(&dirs, &["file"]);

    let message = ingest.insert(valid_mmd().as_bytes()).await.unwrap();
    assert_eq!(message, "Everything is OK");
    assert!(list_dir(&dirs.cache).is_empty());
    assert!(list_dir(&dirs.rejected).is_empty());

    let stored = std::fs::read_to_string(archived(&dirs)).unwrap();
    assert!(stored.contains(&format!("{}/{}", CATALOG_URL, RECORD_UUID)));
    assert!(stored.contains("Project home page"));
}

#[tokio::test]
async fn test_invalid_document_is_rejected_with_reason() {
    let dirs = TestDirs::new();
    let ingest = file_ingest(&dirs, &["file"]);
    let broken = valid_mmd().replace("<mmd:north>76.2</mmd:north>", "");

    let err = ingest.insert(broken.as_bytes()).await.unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
    assert_eq!(err.status_code(), 400);
    assert!(err
        .to_string()
        .starts_with("Input MMD XML file contains errors, please check your file."));

    assert!(list_dir(&dirs.cache).is_empty());
    let rejected = list_dir(&dirs.rejected);
    assert_eq!(rejected.len(), 2);
    let reason = rejected.iter().find(|n| n.ends_with(".txt")).unwrap();
    let staged = rejected.iter().find(|n| n.ends_with(".Q")).unwrap();
    assert_eq!(reason.trim_end_matches(".txt"), staged.trim_end_matches(".Q"));
    assert!(!std::fs::read_to_string(dirs.rejected.join(reason))
        .unwrap()
        .is_empty());
    assert!(!archived(&dirs).exists());
}

#[tokio::test]
async fn test_schema_failure_is_rejected() {
    let dirs = TestDirs::new();
    let ingest = file_ingest(&dirs, &["file"]);

    let err = ingest.insert(b"<mmd:mmd xmlns:mmd=\"x\"><mmd:title>").await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(list_dir(&dirs.rejected).len(), 2);
    assert!(list_dir(&dirs.cache).is_empty());
}

#[tokio::test]
async fn test_validate_only_commits_without_distribution() {
    let dirs = TestDirs::new();
    let ingest = file_ingest(&dirs, &["file"]);

    let message = ingest.validate(valid_mmd().as_bytes()).await.unwrap();
    assert_eq!(message, "Input MMD XML file is ok");
    assert!(list_dir(&dirs.cache).is_empty());
    assert!(list_dir(&dirs.rejected).is_empty());
    assert!(!archived(&dirs).exists());
}

#[tokio::test]
async fn test_oversized_payload_is_refused_before_staging() {
    let dirs = TestDirs::new();
    let ingest = Ingest::new(
        services(Backends::default(), &[], None),
        dirs.jobs(),
        16,
    );

    let err = ingest.insert(valid_mmd().as_bytes()).await.unwrap_err();
    assert_eq!(err.status_code(), 413);
    assert_eq!(err.to_string(), "File bigger than permitted size: 16");
    assert!(list_dir(&dirs.cache).is_empty());
}

#[tokio::test]
async fn test_distribution_failure_rejects_job() {
    let dirs = TestDirs::new();
    let ingest = file_ingest(&dirs, &["file"]);

    ingest.insert(valid_mmd().as_bytes()).await.unwrap();
    let err = ingest.insert(valid_mmd().as_bytes()).await.unwrap_err();

    assert!(matches!(err, IngestError::Distribution(_)));
    assert_eq!(err.status_code(), 500);
    assert!(err
        .to_string()
        .starts_with("The following distributors failed: file"));

    assert!(list_dir(&dirs.cache).is_empty());
    let reason = list_dir(&dirs.rejected)
        .into_iter()
        .find(|n| n.ends_with(".txt"))
        .unwrap();
    let text = std::fs::read_to_string(dirs.rejected.join(reason)).unwrap();
    assert!(text.contains("File already exists"));
}

const INSERTED: &str = r#"<csw:TransactionResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2" version="2.0.2">
  <csw:TransactionSummary>
    <csw:totalInserted>1</csw:totalInserted>
    <csw:totalUpdated>0</csw:totalUpdated>
    <csw:totalDeleted>0</csw:totalDeleted>
  </csw:TransactionSummary>
</csw:TransactionResponse>"#;

async fn catalog_expecting_one_insert() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("csw:Insert"))
        .respond_with(ResponseTemplate::new(200).set_body_string(INSERTED))
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn file_and_catalog(dirs: &TestDirs, server: &MockServer) -> Backends {
    let client = CswClient::new(
        CatalogOptions {
            service_url: server.uri(),
        },
        reqwest::Client::new(),
    )
    .unwrap();
    Backends::default().with_file(dirs.archive()).with_catalog(client)
}

fn archive_record(dirs: &TestDirs) {
    let path = archived(dirs);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, valid_mmd()).unwrap();
}

#[tokio::test]
async fn test_later_distributor_runs_after_earlier_failure() {
    let server = catalog_expecting_one_insert().await;
    let dirs = TestDirs::new();
    archive_record(&dirs);

    let services = services(file_and_catalog(&dirs, &server), &["file", "pycsw"], None);
    let mut worker = Worker::new(&services);
    let record = worker.validate(valid_mmd().as_bytes()).await.unwrap();
    let staged = dirs.stage("job.Q", &record.xml);

    let report = worker
        .distribute(document_args(DistCommand::Insert, &staged, &record.identifier.to_string()))
        .await;

    assert_eq!(report.failed, vec!["file"]);
    assert_eq!(report.called, vec!["pycsw"]);
    assert!(report.skipped.is_empty());
    assert!(!report.is_success());
    assert!(report.message().starts_with("The following distributors failed: file"));
}

#[tokio::test]
async fn test_failed_first_backend_still_publishes_to_catalog() {
    let server = catalog_expecting_one_insert().await;
    let dirs = TestDirs::new();
    archive_record(&dirs);

    let ingest = ingest(&dirs, file_and_catalog(&dirs, &server), &["file", "pycsw"]);
    let err = ingest.insert(valid_mmd().as_bytes()).await.unwrap_err();

    assert_eq!(err.status_code(), 500);
    let message = err.to_string();
    assert!(message.starts_with("The following distributors failed: file\n"), "{}", message);
    assert!(!message.contains("pycsw"));
    assert!(list_dir(&dirs.cache).is_empty());
}

#[tokio::test]
async fn test_deeply_nested_document_is_rejected() {
    let dirs = TestDirs::new();
    let ingest = file_ingest(&dirs, &["file"]);
    let depth = 14_000;
    let data = format!("<mmd>{}{}</mmd>", "<a>".repeat(depth), "</a>".repeat(depth));

    let err = ingest.insert(data.as_bytes()).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(list_dir(&dirs.rejected).len(), 2);
    assert!(list_dir(&dirs.cache).is_empty());
}

#[tokio::test]
async fn test_skipped_distributors_fail_the_job() {
    let dirs = TestDirs::new();
    let ingest = file_ingest(&dirs, &["file", "git", "solr"]);

    let err = ingest.insert(valid_mmd().as_bytes()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "The following jobs were skipped: git, solr"
    );
    // the file backend still ran
    assert!(archived(&dirs).exists());
}

#[tokio::test]
async fn test_update_and_delete_round() {
    let dirs = TestDirs::new();
    let ingest = file_ingest(&dirs, &["file"]);

    ingest.insert(valid_mmd().as_bytes()).await.unwrap();
    let updated = valid_mmd().replace("Daily gridded", "Hourly gridded");
    ingest.update(updated.as_bytes()).await.unwrap();
    assert!(std::fs::read_to_string(archived(&dirs))
        .unwrap()
        .contains("Hourly gridded"));

    let message = ingest.delete(&format!("no.met:{}", RECORD_UUID)).await.unwrap();
    assert_eq!(message, "Everything is OK");
    assert!(!archived(&dirs).exists());

    let err = ingest.delete("no.met:not-a-uuid").await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_environment_suffix_is_applied() {
    let dirs = TestDirs::new();
    let ingest = Ingest::new(
        services(Backends::default().with_file(dirs.archive()), &["file"], Some("dev")),
        dirs.jobs(),
        100_000,
    );

    ingest.insert(valid_mmd().as_bytes()).await.unwrap();
    let stored = std::fs::read_to_string(archived(&dirs)).unwrap();
    assert!(stored.contains(&format!("no.met.dev:{}", RECORD_UUID)));

    // the delete identifier is qualified the same way
    ingest.delete(&format!("no.met:{}", RECORD_UUID)).await.unwrap();
    assert!(!archived(&dirs).exists());

    let err = ingest
        .insert(mmd("no.met.staging", PARENT_UUID).as_bytes())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_child_needs_archived_parent() {
    let dirs = TestDirs::new();
    let ingest = file_ingest(&dirs, &["file"]);
    let parent = format!("no.met:{}", PARENT_UUID);
    let child = child_mmd("no.met", RECORD_UUID, &parent);

    let err = ingest.insert(child.as_bytes()).await.unwrap_err();
    assert_eq!(err.to_string(), "Parent uuid not found");

    ingest.insert(mmd("no.met", PARENT_UUID).as_bytes()).await.unwrap();
    assert_eq!(ingest.insert(child.as_bytes()).await.unwrap(), "Everything is OK");
}
