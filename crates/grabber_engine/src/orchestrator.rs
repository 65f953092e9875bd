use std::collections::HashSet;
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::join_all;
use grabber_core::{
    accepted_urls, archive_filename, effective_quality, generate_filename, run_fingerprint,
    sanitize_segment, source_extension, DeliveryMode, DownloadLocation, ExportOutcome,
    ExportRequest, ItemFailure, NamingSettings,
};
use grabber_logging::{grab_debug, grab_error, grab_info, grab_warn};

use crate::archive::{ArchiveBuilder, ArchiveError};
use crate::convert::{ConversionError, ImageConverter};
use crate::fetch::Fetcher;
use crate::sink::{ConflictAction, DeliveryError, DeliverySink, HandleId, SaveRequest};
use crate::store::SelectionStore;
use crate::{ExportEvent, FetchError};

/// How long a staged payload stays addressable after it was handed to the sink.
pub const DEFAULT_HANDLE_GRACE: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No valid URLs.")]
    NoValidUrls,
    #[error("Download in progress.")]
    InProgress,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub handle_grace: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            handle_grace: DEFAULT_HANDLE_GRACE,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ExportEvent);
}

pub struct ChannelProgressSink {
    tx: mpsc::Sender<ExportEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<ExportEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: ExportEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: ExportEvent) {}
}

type Registry = Arc<Mutex<HashSet<String>>>;

/// Marks a URL set as running; unregisters when dropped.
struct InFlightGuard {
    registry: Registry,
    fingerprint: String,
}

impl InFlightGuard {
    fn acquire(registry: &Registry, fingerprint: String) -> Option<Self> {
        let mut active = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(fingerprint.clone()) {
            return None;
        }
        Some(Self {
            registry: registry.clone(),
            fingerprint,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut active = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        active.remove(&self.fingerprint);
    }
}

struct ExportJob {
    request: ExportRequest,
    urls: Vec<String>,
    quality: u8,
    naming: NamingSettings,
}

struct PreparedItem {
    filename: String,
    payload: Vec<u8>,
}

/// Runs export jobs: fetch, convert, name, then deliver per item or as one archive.
///
/// Runs over distinct URL sets may overlap; a second run over a URL set that is
/// still in flight is rejected.
#[derive(Clone)]
pub struct Orchestrator {
    fetcher: Arc<dyn Fetcher>,
    converter: Arc<dyn ImageConverter>,
    sink: Arc<dyn DeliverySink>,
    selection: Arc<SelectionStore>,
    progress: Arc<dyn ProgressSink>,
    settings: OrchestratorSettings,
    in_flight: Registry,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        converter: Arc<dyn ImageConverter>,
        sink: Arc<dyn DeliverySink>,
        selection: Arc<SelectionStore>,
    ) -> Self {
        Self {
            fetcher,
            converter,
            sink,
            selection,
            progress: Arc::new(NullProgressSink),
            settings: OrchestratorSettings::default(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn selection(&self) -> &Arc<SelectionStore> {
        &self.selection
    }

    /// Number of URL sets currently being exported.
    pub fn active_runs(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Runs one export. Never fails and never panics; every problem is in the outcome.
    pub async fn run(&self, request: ExportRequest) -> ExportOutcome {
        let urls = accepted_urls(&request.urls);
        if urls.is_empty() {
            grab_warn!("Export rejected: no valid URLs in {} entries", request.urls.len());
            return ExportOutcome::Rejected(ExportError::NoValidUrls.to_string());
        }

        let fingerprint = run_fingerprint(&urls);
        let Some(guard) = InFlightGuard::acquire(&self.in_flight, fingerprint) else {
            grab_warn!("Export rejected: identical URL set already running");
            return ExportOutcome::Rejected(ExportError::InProgress.to_string());
        };

        let quality = effective_quality(request.quality, urls.len(), request.low_performance_mode);
        grab_info!(
            "Export started: {} urls, mode {:?}, format {:?}, quality {}",
            urls.len(),
            request.delivery_mode,
            request.format,
            quality
        );
        let job = ExportJob {
            naming: NamingSettings::from(&request),
            request,
            urls,
            quality,
        };

        // Owns the guard and the selection clear; outlives a caller that stops awaiting.
        let this = self.clone();
        let detached = tokio::spawn(async move {
            let _guard = guard;
            let worker = this.clone();
            let executed = match tokio::spawn(async move { worker.execute(job).await }).await {
                Ok(result) => result,
                Err(err) => Err(ExportError::Internal(err.to_string())),
            };
            if let Err(err) = this.selection.clear().await {
                grab_warn!("Failed to clear selection after export: {}", err);
            }
            executed
        });

        let outcome = match detached.await {
            Ok(Ok(failures)) => ExportOutcome::from_failures(failures),
            Ok(Err(err)) => {
                grab_error!("Export aborted: {}", err);
                ExportOutcome::Rejected(err.to_string())
            }
            Err(err) => {
                grab_error!("Export task failed: {}", err);
                ExportOutcome::Rejected(ExportError::Internal(err.to_string()).to_string())
            }
        };

        match &outcome {
            ExportOutcome::Completed => grab_info!("Export finished without failures"),
            ExportOutcome::PartialFailure(failures) => {
                grab_info!("Export finished with {} failed items", failures.len())
            }
            ExportOutcome::Rejected(_) => {}
        }
        outcome
    }

    async fn execute(&self, job: ExportJob) -> Result<Vec<ItemFailure>, ExportError> {
        match job.request.delivery_mode {
            DeliveryMode::Archive => self.run_archive(&job).await,
            DeliveryMode::Direct => self.run_direct(&job).await,
        }
    }

    async fn run_archive(&self, job: &ExportJob) -> Result<Vec<ItemFailure>, ExportError> {
        let mut archive = ArchiveBuilder::new();
        let mut failures = Vec::new();
        for (index, url) in job.urls.iter().enumerate() {
            match self.prepare_item(job, index, url).await {
                Ok(item) => archive.add(item.filename, item.payload),
                Err(err) => failures.push(self.record_failure(url, err)),
            }
        }

        let entries = archive.len();
        let bytes = tokio::task::spawn_blocking(move || archive.finish())
            .await
            .map_err(|err| ExportError::Internal(err.to_string()))??;

        let filename = archive_filename(&job.request.folder_name, &job.request.page_title);
        let handle = self.sink.stage(Bytes::from(bytes)).await?;
        self.schedule_release(handle);
        let saved = self
            .sink
            .save(SaveRequest {
                handle,
                filename: filename.clone(),
                conflict: ConflictAction::Uniquify,
                prompt: job.request.download_location == DownloadLocation::Ask,
            })
            .await?;
        grab_info!("Archive with {} entries saved to {:?}", entries, saved);
        self.progress
            .emit(ExportEvent::ArchiveSaved { filename, entries });
        Ok(failures)
    }

    async fn run_direct(&self, job: &ExportJob) -> Result<Vec<ItemFailure>, ExportError> {
        let batch_size = job.request.batch_size.max(1);
        let delay = Duration::from_millis(job.request.inter_batch_delay_ms);
        let mut failures = Vec::new();

        for (batch_index, batch) in job.urls.chunks(batch_size).enumerate() {
            if batch_index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            grab_debug!("Batch {} with {} items", batch_index, batch.len());
            self.progress.emit(ExportEvent::BatchStarted {
                index: batch_index,
                size: batch.len(),
            });

            let first_index = batch_index * batch_size;
            let results = join_all(
                batch
                    .iter()
                    .enumerate()
                    .map(|(offset, url)| self.deliver_item(job, first_index + offset, url)),
            )
            .await;

            for (url, result) in batch.iter().zip(results) {
                if let Err(err) = result {
                    failures.push(self.record_failure(url, err));
                }
            }
        }
        Ok(failures)
    }

    async fn deliver_item(&self, job: &ExportJob, index: usize, url: &str) -> Result<(), ExportError> {
        let item = self.prepare_item(job, index, url).await?;
        let filename = if job.request.folder_name.is_empty() {
            item.filename
        } else {
            format!("{}/{}", sanitize_segment(&job.request.folder_name), item.filename)
        };

        let handle = self.sink.stage(Bytes::from(item.payload)).await?;
        self.schedule_release(handle);
        let saved = self
            .sink
            .save(SaveRequest {
                handle,
                filename: filename.clone(),
                conflict: ConflictAction::Uniquify,
                prompt: job.request.download_location == DownloadLocation::Ask,
            })
            .await?;
        grab_debug!("Saved {} to {:?}", url, saved);
        self.progress.emit(ExportEvent::ItemSaved {
            url: url.to_string(),
            filename,
        });
        Ok(())
    }

    async fn prepare_item(
        &self,
        job: &ExportJob,
        index: usize,
        url: &str,
    ) -> Result<PreparedItem, ExportError> {
        let fetched = self.fetcher.fetch(url).await?;

        let converter = self.converter.clone();
        let format = job.request.format;
        let quality = job.quality;
        let payload = tokio::task::spawn_blocking(move || {
            converter.convert(&fetched.bytes, format, quality)
        })
        .await
        .map_err(|err| ExportError::Internal(err.to_string()))??;

        let filename = generate_filename(
            &job.naming,
            index,
            &job.request.page_title,
            &job.request.site_id,
            &source_extension(url),
        );
        Ok(PreparedItem { filename, payload })
    }

    fn record_failure(&self, url: &str, err: ExportError) -> ItemFailure {
        let error = err.to_string();
        grab_warn!("Export of {} failed: {}", url, error);
        self.progress.emit(ExportEvent::ItemFailed {
            url: url.to_string(),
            error: error.clone(),
        });
        ItemFailure {
            url: url.to_string(),
            error,
        }
    }

    /// Releases `handle` after the grace period whether or not the save finished.
    fn schedule_release(&self, handle: HandleId) {
        let sink = self.sink.clone();
        let grace = self.settings.handle_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            sink.release(handle);
        });
    }
}
