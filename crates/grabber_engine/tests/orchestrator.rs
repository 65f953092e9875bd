use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use grabber_core::{DeliveryMode, ExportFormat, ExportOutcome, ExportRequest, ItemFailure};
use grabber_engine::{
    ChannelProgressSink, ConflictAction, ConversionError, DeliveryError, DeliverySink, DirectorySink,
    ExportEvent, FailureKind, FetchError, FetchMetadata, FetchOutput, Fetcher, HandleId,
    ImageConverter, MemoryStore, Orchestrator, OrchestratorSettings, RasterConverter,
    SaveRequest, SelectionStore,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Serves fixed bodies; unknown URLs answer 404.
#[derive(Default)]
struct StubFetcher {
    bodies: HashMap<String, Vec<u8>>,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl StubFetcher {
    fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait::async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }
        match self.bodies.get(url) {
            Some(body) => Ok(FetchOutput {
                bytes: Bytes::from(body.clone()),
                metadata: FetchMetadata {
                    original_url: url.to_string(),
                    final_url: url.to_string(),
                    content_type: None,
                    byte_len: body.len() as u64,
                },
            }),
            None => Err(FetchError::new(FailureKind::HttpStatus(404), "404 Not Found")),
        }
    }
}

/// Passes payloads through and remembers the quality it was asked for.
#[derive(Default)]
struct QualityRecorder {
    seen: Mutex<Vec<u8>>,
}

impl ImageConverter for QualityRecorder {
    fn convert(
        &self,
        payload: &[u8],
        _format: ExportFormat,
        quality_percent: u8,
    ) -> Result<Vec<u8>, ConversionError> {
        self.seen.lock().unwrap().push(quality_percent);
        Ok(payload.to_vec())
    }
}

struct BrokenSink;

#[async_trait::async_trait]
impl DeliverySink for BrokenSink {
    async fn stage(&self, _payload: Bytes) -> Result<HandleId, DeliveryError> {
        Err(DeliveryError::Interrupted("disk full".to_string()))
    }

    async fn save(&self, request: SaveRequest) -> Result<PathBuf, DeliveryError> {
        Err(DeliveryError::UnknownHandle(request.handle))
    }

    fn release(&self, _handle: HandleId) {}
}

/// Delegates to a `DirectorySink` and keeps every save request it saw.
struct RecordingSink {
    inner: DirectorySink,
    saves: Mutex<Vec<SaveRequest>>,
}

impl RecordingSink {
    fn new(root: PathBuf) -> Self {
        Self {
            inner: DirectorySink::new(root),
            saves: Mutex::new(Vec::new()),
        }
    }

    fn saves(&self) -> Vec<SaveRequest> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DeliverySink for RecordingSink {
    async fn stage(&self, payload: Bytes) -> Result<HandleId, DeliveryError> {
        self.inner.stage(payload).await
    }

    async fn save(&self, request: SaveRequest) -> Result<PathBuf, DeliveryError> {
        self.saves.lock().unwrap().push(request.clone());
        self.inner.save(request).await
    }

    fn release(&self, handle: HandleId) {
        self.inner.release(handle)
    }
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([200, 10, 10, 128]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn selection_store() -> Arc<SelectionStore> {
    Arc::new(SelectionStore::new(Arc::new(MemoryStore::new()), 50))
}

fn request(urls: &[&str]) -> ExportRequest {
    ExportRequest {
        urls: urls.iter().map(|u| u.to_string()).collect(),
        ..ExportRequest::default()
    }
}

fn files_under(root: &std::path::Path) -> Vec<String> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        if path.is_dir() {
            let dir = entry.file_name().to_string_lossy().into_owned();
            names.extend(files_under(&path).into_iter().map(|n| format!("{dir}/{n}")));
        } else {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    names
}

#[tokio::test]
async fn archive_bundles_successes_and_reports_failures() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(
        StubFetcher::default()
            .with("https://x.test/a.png", png_bytes())
            .with("https://x.test/c.gif", b"GIF89a".to_vec()),
    );
    let selection = selection_store();
    selection
        .set(vec!["https://x.test/a.png".to_string()])
        .await
        .unwrap();
    let orchestrator = Orchestrator::new(
        fetcher,
        Arc::new(RasterConverter),
        Arc::new(DirectorySink::new(temp.path().to_path_buf())),
        selection.clone(),
    );

    let mut req = request(&[
        "https://x.test/a.png",
        "https://x.test/b.png",
        "https://x.test/c.gif",
    ]);
    req.delivery_mode = DeliveryMode::Archive;
    req.page_title = "Cats".to_string();

    let outcome = orchestrator.run(req).await;
    assert_eq!(
        outcome,
        ExportOutcome::PartialFailure(vec![ItemFailure {
            url: "https://x.test/b.png".to_string(),
            error: "fetch failed: http status 404".to_string(),
        }])
    );
    assert_eq!(files_under(temp.path()), vec!["Cats.zip".to_string()]);

    let bytes = fs::read(temp.path().join("Cats.zip")).unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let names: Vec<String> = archive.file_names().map(ToOwned::to_owned).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["Cats_001.png", "Cats_003.gif"]);
    let mut gif = Vec::new();
    archive
        .by_name("Cats_003.gif")
        .unwrap()
        .read_to_end(&mut gif)
        .unwrap();
    assert_eq!(gif, b"GIF89a");

    assert!(selection.get().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn direct_mode_runs_batches_with_delay_between_them() {
    let temp = TempDir::new().unwrap();
    let urls: Vec<String> = (1..=5).map(|i| format!("https://x.test/p{i}.jpg")).collect();
    let mut stub = StubFetcher::default();
    for url in &urls {
        stub = stub.with(url, b"jpeg".to_vec());
    }
    let fetcher = Arc::new(stub);
    let sink = Arc::new(RecordingSink::new(temp.path().to_path_buf()));
    let (tx, rx) = mpsc::channel();
    let orchestrator = Orchestrator::new(
        fetcher.clone(),
        Arc::new(RasterConverter),
        sink.clone(),
        selection_store(),
    )
    .with_progress(Arc::new(ChannelProgressSink::new(tx)));

    let mut req = ExportRequest {
        urls: urls.clone(),
        ..ExportRequest::default()
    };
    req.batch_size = 2;
    req.inter_batch_delay_ms = 100;
    req.folder_name = "My:Pics".to_string();

    let outcome = orchestrator.run(req).await;
    assert_eq!(outcome, ExportOutcome::Completed);

    let batches: Vec<usize> = rx
        .try_iter()
        .filter_map(|event| match event {
            ExportEvent::BatchStarted { size, .. } => Some(size),
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![2, 2, 1]);

    let times = fetcher.call_times();
    assert_eq!(times.len(), 5);
    assert!(times[2] - times[0] >= Duration::from_millis(100));
    assert!(times[4] - times[0] >= Duration::from_millis(200));

    assert_eq!(
        files_under(temp.path()),
        vec![
            "My_Pics/Images_001.jpg",
            "My_Pics/Images_002.jpg",
            "My_Pics/Images_003.jpg",
            "My_Pics/Images_004.jpg",
            "My_Pics/Images_005.jpg",
        ]
    );

    let saves = sink.saves();
    assert_eq!(saves.len(), 5);
    assert!(saves
        .iter()
        .all(|save| save.conflict == ConflictAction::Uniquify && !save.prompt));
    let mut names: Vec<&str> = saves.iter().map(|save| save.filename.as_str()).collect();
    names.sort();
    assert_eq!(names[0], "My_Pics/Images_001.jpg");
}

#[tokio::test]
async fn direct_mode_never_overwrites_existing_files() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("image_001.png"), b"old").unwrap();
    let fetcher = Arc::new(StubFetcher::default().with("https://x.test/a.png", png_bytes()));
    let orchestrator = Orchestrator::new(
        fetcher,
        Arc::new(RasterConverter),
        Arc::new(DirectorySink::new(temp.path().to_path_buf())),
        selection_store(),
    );

    let mut req = request(&["https://x.test/a.png"]);
    req.naming_mode = grabber_core::NamingMode::Sequential;

    assert_eq!(orchestrator.run(req).await, ExportOutcome::Completed);
    assert_eq!(
        files_under(temp.path()),
        vec!["image_001 (1).png", "image_001.png"]
    );
    assert_eq!(fs::read(temp.path().join("image_001.png")).unwrap(), b"old");
}

#[tokio::test]
async fn conversion_failure_only_fails_that_item() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(
        StubFetcher::default()
            .with("https://x.test/broken.png", b"not an image".to_vec())
            .with("https://x.test/fine.png", png_bytes()),
    );
    let orchestrator = Orchestrator::new(
        fetcher,
        Arc::new(RasterConverter),
        Arc::new(DirectorySink::new(temp.path().to_path_buf())),
        selection_store(),
    );

    let mut req = request(&["https://x.test/broken.png", "https://x.test/fine.png"]);
    req.format = ExportFormat::Jpeg;

    let outcome = orchestrator.run(req).await;
    let failures = outcome.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].url, "https://x.test/broken.png");
    assert!(failures[0].error.starts_with("decode failed"), "{}", failures[0].error);

    assert_eq!(files_under(temp.path()), vec!["Images_002.jpg"]);
    let saved = fs::read(temp.path().join("Images_002.jpg")).unwrap();
    assert_eq!(
        image::guess_format(&saved).unwrap(),
        image::ImageFormat::Jpeg
    );
}

#[tokio::test]
async fn request_without_valid_urls_is_rejected() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(StubFetcher::default());
    let orchestrator = Orchestrator::new(
        fetcher.clone(),
        Arc::new(RasterConverter),
        Arc::new(DirectorySink::new(temp.path().to_path_buf())),
        selection_store(),
    );

    let outcome = orchestrator
        .run(request(&["ftp://x.test/a.png", "relative.png", "data:image/png;base64,AA"]))
        .await;
    assert_eq!(outcome, ExportOutcome::Rejected("No valid URLs.".to_string()));
    assert!(fetcher.call_times().is_empty());
}

#[tokio::test]
async fn identical_url_set_is_rejected_while_running() {
    let temp = TempDir::new().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let fetcher = Arc::new(
        StubFetcher::default()
            .with("https://x.test/a.jpg", b"a".to_vec())
            .with("https://x.test/b.jpg", b"b".to_vec())
            .gated(gate.clone()),
    );
    let orchestrator = Orchestrator::new(
        fetcher,
        Arc::new(RasterConverter),
        Arc::new(DirectorySink::new(temp.path().to_path_buf())),
        selection_store(),
    );

    let first = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run(request(&["https://x.test/a.jpg"])).await }
    });
    let other = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run(request(&["https://x.test/b.jpg"])).await }
    });
    while orchestrator.active_runs() < 2 {
        tokio::task::yield_now().await;
    }

    let duplicate = orchestrator.run(request(&["https://x.test/a.jpg"])).await;
    assert_eq!(
        duplicate,
        ExportOutcome::Rejected("Download in progress.".to_string())
    );

    gate.add_permits(10);
    assert_eq!(first.await.unwrap(), ExportOutcome::Completed);
    assert_eq!(other.await.unwrap(), ExportOutcome::Completed);
    assert_eq!(orchestrator.active_runs(), 0);

    let again = orchestrator.run(request(&["https://x.test/a.jpg"])).await;
    assert_eq!(again, ExportOutcome::Completed);
}

#[tokio::test]
async fn abandoned_caller_keeps_the_run_exclusive_until_it_finishes() {
    let temp = TempDir::new().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let fetcher = Arc::new(
        StubFetcher::default()
            .with("https://x.test/a.jpg", b"a".to_vec())
            .gated(gate.clone()),
    );
    let selection = selection_store();
    selection
        .set(vec!["https://x.test/a.jpg".to_string()])
        .await
        .unwrap();
    let orchestrator = Orchestrator::new(
        fetcher,
        Arc::new(RasterConverter),
        Arc::new(DirectorySink::new(temp.path().to_path_buf())),
        selection.clone(),
    );

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        orchestrator.run(request(&["https://x.test/a.jpg"])),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(orchestrator.active_runs(), 1);

    let duplicate = orchestrator.run(request(&["https://x.test/a.jpg"])).await;
    assert_eq!(
        duplicate,
        ExportOutcome::Rejected("Download in progress.".to_string())
    );

    gate.add_permits(10);
    while orchestrator.active_runs() > 0 {
        tokio::task::yield_now().await;
    }
    assert!(selection.get().await.unwrap().is_empty());
    assert_eq!(files_under(temp.path()), vec!["Images_001.jpg"]);

    let again = orchestrator.run(request(&["https://x.test/a.jpg"])).await;
    assert_eq!(again, ExportOutcome::Completed);
}

#[tokio::test]
async fn selection_is_cleared_even_when_the_run_fails() {
    let fetcher = Arc::new(StubFetcher::default().with("https://x.test/a.jpg", b"a".to_vec()));
    let selection = selection_store();
    selection
        .set(vec!["https://x.test/a.jpg".to_string()])
        .await
        .unwrap();
    let orchestrator = Orchestrator::new(
        fetcher,
        Arc::new(RasterConverter),
        Arc::new(BrokenSink),
        selection.clone(),
    );

    let mut req = request(&["https://x.test/a.jpg"]);
    req.delivery_mode = DeliveryMode::Archive;

    let outcome = orchestrator.run(req).await;
    assert_eq!(
        outcome,
        ExportOutcome::Rejected("save interrupted: disk full".to_string())
    );
    assert!(selection.get().await.unwrap().is_empty());
    assert_eq!(orchestrator.active_runs(), 0);
}

#[tokio::test]
async fn low_performance_mode_lowers_quality_for_large_runs() {
    let temp = TempDir::new().unwrap();
    let urls: Vec<String> = (0..21).map(|i| format!("https://x.test/{i}.jpg")).collect();
    let mut stub = StubFetcher::default();
    for url in &urls {
        stub = stub.with(url, b"x".to_vec());
    }
    let recorder = Arc::new(QualityRecorder::default());
    let orchestrator = Orchestrator::new(
        Arc::new(stub),
        recorder.clone(),
        Arc::new(DirectorySink::new(temp.path().to_path_buf())),
        selection_store(),
    );

    let mut req = ExportRequest {
        urls,
        ..ExportRequest::default()
    };
    req.low_performance_mode = true;
    req.inter_batch_delay_ms = 0;
    req.delivery_mode = DeliveryMode::Archive;

    assert_eq!(orchestrator.run(req).await, ExportOutcome::Completed);
    let seen = recorder.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 21);
    assert!(seen.iter().all(|q| *q == 70));
}

#[tokio::test(start_paused = true)]
async fn staged_payloads_are_released_after_the_grace_period() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(
        StubFetcher::default()
            .with("https://x.test/a.jpg", b"a".to_vec())
            .with("https://x.test/b.jpg", b"b".to_vec()),
    );
    let sink = Arc::new(DirectorySink::new(temp.path().to_path_buf()));
    let orchestrator = Orchestrator::new(
        fetcher,
        Arc::new(RasterConverter),
        sink.clone(),
        selection_store(),
    )
    .with_settings(OrchestratorSettings {
        handle_grace: Duration::from_secs(15),
    });

    let outcome = orchestrator
        .run(request(&["https://x.test/a.jpg", "https://x.test/b.jpg"]))
        .await;
    assert_eq!(outcome, ExportOutcome::Completed);
    assert_eq!(sink.staged_count(), 2);

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(sink.staged_count(), 0);
}
