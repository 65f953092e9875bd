//! Grabber core: pure selection and export rules, no I/O.
mod candidate;
mod filename;
mod outcome;
mod request;
mod selection;

pub use candidate::{CandidateResolver, ImageElement};
pub use filename::{
    archive_filename, generate_filename, sanitize_segment, source_extension, NamingSettings,
    DEFAULT_EXTENSION,
};
pub use outcome::{ExportOutcome, ItemFailure};
pub use request::{
    accepted_urls, effective_quality, run_fingerprint, DeliveryMode, DownloadLocation,
    ExportFormat, ExportRequest, NamingMode, DEFAULT_BATCH_SIZE, DEFAULT_INTER_BATCH_DELAY_MS,
    DEFAULT_PAGE_TITLE, DEFAULT_QUALITY, DEFAULT_SITE_ID, LOW_PERFORMANCE_THRESHOLD,
};
pub use selection::{normalize_selection, SelectionSet, ToggleOutcome, DEFAULT_MAX_SELECTION};
