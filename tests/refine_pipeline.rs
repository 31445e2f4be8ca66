// tests/refine_pipeline.rs
use async_trait::async_trait;
use regulink::config::pipeline::RefinerConfig;
use regulink::refine::source::{ArticleSource, RefineError};
use regulink::retry::{Backoff, RetryPolicy};
use regulink::{ContentAddress, DocumentStore, JsonDirStore, MemoryStore, RawDocument, Refiner};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ARTICLE: &str = "The European Securities and Markets Authority today published its final report \
on guidelines for crypto-asset service providers under MiCA.";

/// Serves canned responses per URL and counts every download.
#[derive(Default)]
struct CannedSource {
    pages: HashMap<String, Result<Option<String>, RefineError>>,
    calls: AtomicUsize,
    per_url: Mutex<HashMap<String, usize>>,
}

impl CannedSource {
    fn with(mut self, url: &str, page: Result<Option<String>, RefineError>) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    fn calls_for(&self, url: &str) -> usize {
        self.per_url.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ArticleSource for CannedSource {
    async fn fetch_article(&self, url: &str) -> Result<Option<String>, RefineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.per_url.lock().unwrap().entry(url.to_string()).or_default() += 1;
        self.pages.get(url).cloned().unwrap_or(Ok(None))
    }
}

fn no_delay() -> RefinerConfig {
    RefinerConfig {
        delay_secs: 0,
        ..RefinerConfig::default()
    }
}

fn instant_retry() -> RetryPolicy {
    RetryPolicy::new(2, Backoff::Fixed(Duration::ZERO))
}

fn registry(dir: &tempfile::TempDir, rows: &[(&str, &str, &str)]) -> std::path::PathBuf {
    let mut csv = String::from("Source Name,Target URL,Extraction Strategy,Notes\n");
    for (name, url, note) in rows {
        csv.push_str(&format!("{name},{url},RSS,\"{note}\"\n"));
    }
    let path = dir.path().join("sources.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

#[tokio::test]
async fn second_run_downloads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry(
        &dir,
        &[
            ("ESMA", "https://www.esma.europa.eu/a", "[2025-02-01 09:00] Success - RSS OK: MiCA..."),
            ("EBA", "https://www.eba.europa.eu/b", "Scrape OK"),
            ("EIOPA", "https://www.eiopa.europa.eu/c", "[2025-02-01 09:01] Failed - Error: HTTP 404"),
            ("ECB", "www.ecb.europa.eu/no-scheme", "Success"),
            ("BaFin", "https://www.bafin.de/d", "Not Success"),
        ],
    );
    let source = Arc::new(
        CannedSource::default()
            .with("https://www.esma.europa.eu/a", Ok(Some(ARTICLE.to_string())))
            .with("https://www.eba.europa.eu/b", Ok(Some(ARTICLE.to_string()))),
    );
    let store = Arc::new(JsonDirStore::<RawDocument>::create(dir.path().join("processed")).unwrap());
    let refiner = Refiner::new(source.clone(), store.clone(), &no_delay()).with_retry(instant_retry());

    let first = refiner.run(&path).await.unwrap();
    assert_eq!(first.selected, 3, "only success notes are selected");
    assert_eq!(first.invalid_url, 1);
    assert_eq!(first.saved, 2);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);

    let key = ContentAddress::for_url("https://www.esma.europa.eu/a");
    let doc = store.get(&key).unwrap().expect("stored under url hash");
    assert_eq!(doc.source, "ESMA");
    assert_eq!(doc.url, "https://www.esma.europa.eu/a");
    assert_eq!(doc.content_clean, ARTICLE);
    assert!(store.path_for(&key).is_file());

    let second = refiner.run(&path).await.unwrap();
    assert_eq!(second.already_present, 2);
    assert_eq!(second.saved, 0);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2, "no re-download");
}

#[tokio::test]
async fn short_content_is_not_stored() {
    let store: Arc<MemoryStore<RawDocument>> = Arc::new(MemoryStore::new());
    let url = "https://www.esma.europa.eu/short";
    let source = Arc::new(CannedSource::default().with(url, Ok(Some("x".repeat(40)))));
    let refiner = Refiner::new(source, store.clone(), &no_delay());

    let mut summary = Default::default();
    refiner.refine_one("ESMA", url, &mut summary).await;
    assert_eq!(summary.too_short, 1);
    assert!(store.is_empty());

    let mut summary = Default::default();
    refiner.refine_one("ESMA", "https://www.esma.europa.eu/empty", &mut summary).await;
    assert_eq!(summary.too_short, 1, "nothing extracted counts as too short");
}

#[tokio::test]
async fn transient_download_errors_are_retried_permanent_are_not() {
    let flaky = "https://www.eba.europa.eu/flaky";
    let gone = "https://www.eba.europa.eu/gone";
    let source = Arc::new(
        CannedSource::default()
            .with(flaky, Err(RefineError::Timeout))
            .with(gone, Err(RefineError::Http { status: 404 })),
    );
    let store: Arc<MemoryStore<RawDocument>> = Arc::new(MemoryStore::new());
    let refiner = Refiner::new(source.clone(), store.clone(), &no_delay()).with_retry(instant_retry());

    let mut summary = Default::default();
    refiner.refine_one("EBA", flaky, &mut summary).await;
    refiner.refine_one("EBA", gone, &mut summary).await;

    assert_eq!(source.calls_for(flaky), 2);
    assert_eq!(source.calls_for(gone), 1);
    assert_eq!(summary.failed, 2);
    assert!(store.is_empty());
}

#[tokio::test]
async fn registry_without_rows_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry(&dir, &[]);
    let store = Arc::new(MemoryStore::<RawDocument>::default());
    let source = Arc::new(CannedSource::default());
    let err = Refiner::new(source.clone(), store, &no_delay())
        .run(&path)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("no source rows"));
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_registry_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let refiner = Refiner::new(
        Arc::new(CannedSource::default()),
        Arc::new(MemoryStore::<RawDocument>::new()),
        &no_delay(),
    );
    assert!(refiner.run(&dir.path().join("missing.csv")).await.is_err());
}
