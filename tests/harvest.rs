//! End-to-end scenarios over the batched harvesting pipeline, using
//! in-process fakes for the Fetcher/ObjectStore/ThumbnailRenderer
//! collaborator interfaces instead of real network/subprocess calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::tempdir;

use oaharvester::batch::BatchEngine;
use oaharvester::catalog::{PmcSource, UnpaywallSource};
use oaharvester::fetch::{extract_archive, Fetcher, StatusToken};
use oaharvester::models::Entry;
use oaharvester::postprocess::{
    sharded_prefix, ObjectStore, ObjectStoreError, PostProcessor, ThumbnailError, ThumbnailRenderer,
};
use oaharvester::store::PersistentStore;

/// A fetcher whose behavior per URL is configured up front: either write
/// fixed bytes to the destination and report success, or report a fixed
/// failure token without touching the filesystem.
struct FakeFetcher {
    responses: Mutex<HashMap<String, FakeResponse>>,
    calls: Mutex<Vec<String>>,
}

enum FakeResponse {
    Bytes(Vec<u8>),
    Failure(String),
}

impl FakeFetcher {
    fn new(responses: HashMap<String, FakeResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str, destination: &Path, entry: Entry) -> (StatusToken, Entry) {
        self.calls.lock().unwrap().push(url.to_string());

        match self.responses.lock().unwrap().get(url) {
            Some(FakeResponse::Bytes(bytes)) => {
                std::fs::write(destination, bytes).expect("write fake download");
                (None, entry)
            }
            Some(FakeResponse::Failure(token)) => (Some(token.clone()), entry),
            None => (Some("no fake response configured".to_string()), entry),
        }
    }
}

struct NoopThumbnailRenderer;
impl ThumbnailRenderer for NoopThumbnailRenderer {
    fn render(&self, _pdf_path: &Path, _out_path: &Path, _height: u32) -> Result<(), ThumbnailError> {
        Err(ThumbnailError::BinaryMissing)
    }
}

struct RecordingObjectStore {
    uploads: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingObjectStore {
    fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    async fn upload(
        &self,
        local_path: &Path,
        remote_prefix: &str,
        _storage_tier: &str,
    ) -> Result<(), ObjectStoreError> {
        self.uploads
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), remote_prefix.to_string()));
        Ok(())
    }
}

fn write_gz_catalog(path: &Path, lines: &[String]) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    use std::io::Write;
    for line in lines {
        writeln!(encoder, "{line}").unwrap();
    }
    encoder.finish().unwrap();
}

/// Scenario A: single success is committed to Entries/DoiIndex, FailLog
/// stays empty, and the artifact lands at the sharded path.
#[tokio::test]
async fn scenario_a_single_success_is_shipped_to_storage() {
    let dir = tempdir().unwrap();
    let catalog_path = dir.path().join("catalog.jsonl.gz");
    write_gz_catalog(
        &catalog_path,
        &[r#"{"doi":"10.1/x","best_oa_location":{"url_for_pdf":"http://ok/x.pdf"}}"#.to_string()],
    );

    let store = Arc::new(PersistentStore::open(dir.path()).unwrap());

    let mut responses = HashMap::new();
    responses.insert(
        "http://ok/x.pdf".to_string(),
        FakeResponse::Bytes(b"123456789012".to_vec()),
    );
    let fetcher: Arc<dyn Fetcher> = Arc::new(FakeFetcher::new(responses));

    let object_store = RecordingObjectStore::new();
    let post_processor = Arc::new(PostProcessor::with_collaborators(
        dir.path().to_path_buf(),
        false,
        Arc::new(NoopThumbnailRenderer),
        Some(Box::new(object_store)),
    ));

    let engine = BatchEngine::new(store.clone(), fetcher, post_processor, 100, 4);
    let mut source = UnpaywallSource::open(&catalog_path, None).unwrap();
    let report = engine.run_harvest(&mut source).await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);

    let (fail_count, total_count) = store.stats().unwrap();
    assert_eq!(total_count, 1);
    assert_eq!(fail_count, 0);
    assert!(store.get_id_by_doi("10.1/x").unwrap().is_some());
}

/// Scenario B: a failure token keeps the Entry committed (for dedup) but
/// records the failure, and leaves no artifact on disk.
#[tokio::test]
async fn scenario_b_failure_is_recorded_without_artifact() {
    let dir = tempdir().unwrap();
    let catalog_path = dir.path().join("catalog.jsonl.gz");
    write_gz_catalog(
        &catalog_path,
        &[r#"{"doi":"10.1/y","best_oa_location":{"url_for_pdf":"http://bad/y.pdf"}}"#.to_string()],
    );

    let store = Arc::new(PersistentStore::open(dir.path()).unwrap());

    let mut responses = HashMap::new();
    responses.insert(
        "http://bad/y.pdf".to_string(),
        FakeResponse::Failure("404".to_string()),
    );
    let fetcher: Arc<dyn Fetcher> = Arc::new(FakeFetcher::new(responses));

    let post_processor = Arc::new(PostProcessor::with_collaborators(
        dir.path().to_path_buf(),
        false,
        Arc::new(NoopThumbnailRenderer),
        None,
    ));

    let engine = BatchEngine::new(store.clone(), fetcher, post_processor, 100, 4);
    let mut source = UnpaywallSource::open(&catalog_path, None).unwrap();
    let report = engine.run_harvest(&mut source).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 0);

    let failures: Vec<_> = store.iter_failures().collect::<Result<_, _>>().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].1, "404");
    assert!(store.get_id_by_doi("10.1/y").unwrap().is_some());

    let (fail_count, total_count) = store.stats().unwrap();
    assert_eq!(total_count, 1);
    assert_eq!(fail_count, 1);
}

/// Scenario D: two runs over the same catalog perform zero fetches on the
/// second run and leave Entries/DoiIndex at the original size.
#[tokio::test]
async fn scenario_d_second_run_is_fully_deduplicated() {
    let dir = tempdir().unwrap();
    let catalog_path = dir.path().join("catalog.jsonl.gz");

    let lines: Vec<String> = (0..250)
        .map(|i| {
            format!(
                r#"{{"doi":"10.1/{i}","best_oa_location":{{"url_for_pdf":"http://ok/{i}.pdf"}}}}"#
            )
        })
        .collect();
    write_gz_catalog(&catalog_path, &lines);

    let store = Arc::new(PersistentStore::open(dir.path()).unwrap());

    let mut responses = HashMap::new();
    for i in 0..250 {
        responses.insert(
            format!("http://ok/{i}.pdf"),
            FakeResponse::Bytes(b"some bytes".to_vec()),
        );
    }
    let fetcher = Arc::new(FakeFetcher::new(responses));
    let fetcher_dyn: Arc<dyn Fetcher> = fetcher.clone();

    let post_processor = Arc::new(PostProcessor::with_collaborators(
        dir.path().to_path_buf(),
        false,
        Arc::new(NoopThumbnailRenderer),
        None,
    ));

    let engine = BatchEngine::new(store.clone(), fetcher_dyn, post_processor.clone(), 100, 8);
    let mut source = UnpaywallSource::open(&catalog_path, None).unwrap();
    engine.run_harvest(&mut source).await.unwrap();

    let (_, total_after_first) = store.stats().unwrap();
    assert_eq!(total_after_first, 250);

    let calls_after_first = fetcher.call_count();

    let mut second_source = UnpaywallSource::open(&catalog_path, None).unwrap();
    let second_report = engine.run_harvest(&mut second_source).await.unwrap();

    assert_eq!(second_report.processed, 0);
    assert_eq!(fetcher.call_count(), calls_after_first);

    let (_, total_after_second) = store.stats().unwrap();
    assert_eq!(total_after_second, 250);
}

/// Scenario E: `--sample 5` on a 1000-line catalog makes at most 5 fetch
/// invocations.
#[tokio::test]
async fn scenario_e_sampling_bounds_fetch_count() {
    let dir = tempdir().unwrap();
    let catalog_path = dir.path().join("catalog.jsonl.gz");

    let lines: Vec<String> = (0..1000)
        .map(|i| {
            format!(
                r#"{{"doi":"10.1/{i}","best_oa_location":{{"url_for_pdf":"http://ok/{i}.pdf"}}}}"#
            )
        })
        .collect();
    write_gz_catalog(&catalog_path, &lines);

    let store = Arc::new(PersistentStore::open(dir.path()).unwrap());

    let mut responses = HashMap::new();
    for i in 0..1000 {
        responses.insert(
            format!("http://ok/{i}.pdf"),
            FakeResponse::Bytes(b"some bytes".to_vec()),
        );
    }
    let fetcher = Arc::new(FakeFetcher::new(responses));
    let fetcher_dyn: Arc<dyn Fetcher> = fetcher.clone();

    let post_processor = Arc::new(PostProcessor::with_collaborators(
        dir.path().to_path_buf(),
        false,
        Arc::new(NoopThumbnailRenderer),
        None,
    ));

    let engine = BatchEngine::new(store, fetcher_dyn, post_processor, 100, 8);
    let mut source = UnpaywallSource::open(&catalog_path, Some(5)).unwrap();
    engine.run_harvest(&mut source).await.unwrap();

    assert!(fetcher.call_count() <= 5);
}

/// Scenario F: a reprocess pass where 3 of 5 failing URLs now succeed
/// removes exactly 3 entries from FailLog.
#[tokio::test]
async fn scenario_f_reprocess_clears_now_succeeding_failures() {
    let dir = tempdir().unwrap();
    let store = Arc::new(PersistentStore::open(dir.path()).unwrap());

    let mut responses = HashMap::new();
    for i in 0..5 {
        let doi = format!("10.1/fail-{i}");
        let id = format!("id-{i}");
        let url = format!("http://retry/{i}.pdf");
        let entry = Entry::from_unpaywall_object(id.clone(), doi, url.clone(), Default::default());
        store.put_entry(&entry).unwrap();
        store.put_failure(&id, "timeout").unwrap();

        if i < 3 {
            responses.insert(url, FakeResponse::Bytes(b"now it works".to_vec()));
        } else {
            responses.insert(url, FakeResponse::Failure("timeout".to_string()));
        }
    }

    let fetcher: Arc<dyn Fetcher> = Arc::new(FakeFetcher::new(responses));
    let post_processor = Arc::new(PostProcessor::with_collaborators(
        dir.path().to_path_buf(),
        false,
        Arc::new(NoopThumbnailRenderer),
        None,
    ));

    let engine = BatchEngine::new(store.clone(), fetcher, post_processor, 100, 4);
    let report = engine.run_reprocess().await.unwrap();

    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 2);

    let failures: Vec<_> = store.iter_failures().collect::<Result<_, _>>().unwrap();
    assert_eq!(failures.len(), 2);
}

/// Scenario C: a PMC archive yields a PDF and NXML member, both renamed
/// out of the archive, the archive deleted, and identifiers preserved.
#[tokio::test]
async fn scenario_c_pmc_archive_extracts_pdf_and_nxml() {
    let dir = tempdir().unwrap();
    let file_list_path = dir.path().join("oa_file_list.txt");
    std::fs::write(
        &file_list_path,
        "generated 2024-01-01\noa_package/a/b/foo.tar.gz\t\tPMC123\tpmid:456\tsome-title\n",
    )
    .unwrap();

    let store = Arc::new(PersistentStore::open(dir.path()).unwrap());

    let tar_url = "http://pmc.example/oa_package/a/b/foo.tar.gz".to_string();

    struct ArchiveFetcher {
        url: String,
    }

    #[async_trait]
    impl Fetcher for ArchiveFetcher {
        async fn fetch(&self, url: &str, destination: &Path, entry: Entry) -> (StatusToken, Entry) {
            assert_eq!(url, self.url);
            let file = std::fs::File::create(destination).unwrap();
            let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
            let mut header = tar::Header::new_gnu();
            let pdf_bytes = b"%PDF-fake-article";
            header.set_size(pdf_bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "foo.pdf", &pdf_bytes[..]).unwrap();

            let mut header = tar::Header::new_gnu();
            let nxml_bytes = b"<article/>";
            header.set_size(nxml_bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "foo.nxml", &nxml_bytes[..]).unwrap();

            builder.into_inner().unwrap().finish().unwrap();

            let data_dir = destination.parent().unwrap();
            match extract_archive(destination, &entry.id, data_dir) {
                Ok(_) => (None, entry),
                Err(err) => (Some(err.to_string()), entry),
            }
        }
    }

    let fetcher: Arc<dyn Fetcher> = Arc::new(ArchiveFetcher { url: tar_url });
    let post_processor = Arc::new(PostProcessor::with_collaborators(
        dir.path().to_path_buf(),
        false,
        Arc::new(NoopThumbnailRenderer),
        None,
    ));

    let engine = BatchEngine::new(store.clone(), fetcher, post_processor, 100, 4);
    let mut source = PmcSource::open(&file_list_path, "http://pmc.example/".to_string(), None).unwrap();
    let report = engine.run_harvest(&mut source).await.unwrap();

    assert_eq!(report.succeeded, 1);

    let entries: Vec<_> = store.iter_entries().collect::<Result<_, _>>().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].pmcid.as_deref(), Some("PMC123"));
    assert_eq!(entries[0].pmid.as_deref(), Some("456"));
    assert_eq!(entries[0].doi, "PMC123");
}

#[test]
fn path_sharding_matches_spec_layout() {
    let prefix = sharded_prefix("deadbeef00112233");
    assert_eq!(prefix, "de/ad/be/ef/");
}
