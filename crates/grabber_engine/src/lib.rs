//! Grabber engine: fetching, page scanning, conversion, persistence and export runs.
mod archive;
mod convert;
mod decode;
mod fetch;
mod orchestrator;
mod page;
mod persist;
mod scan;
mod sink;
mod store;
mod types;

pub use archive::{ArchiveBuilder, ArchiveError};
pub use convert::{ConversionError, ImageConverter, RasterConverter};
pub use decode::{decode_page, DecodedPage};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher, DEFAULT_FETCH_TIMEOUT};
pub use orchestrator::{
    ChannelProgressSink, ExportError, NullProgressSink, Orchestrator, OrchestratorSettings,
    ProgressSink, DEFAULT_HANDLE_GRACE,
};
pub use page::PageInfo;
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use scan::{
    filter_candidates, image_element, ImageKind, PageScanner, ScannedImage, SelectionMode,
    DEFAULT_MIN_DIMENSION,
};
pub use sink::{ConflictAction, DeliveryError, DeliverySink, DirectorySink, HandleId, SaveRequest};
pub use store::{
    JsonFileStore, KeyValueStore, MemoryStore, SelectionStore, StoreError, SELECTION_KEY,
};
pub use types::{ExportEvent, FailureKind, FetchError, FetchMetadata, FetchOutput};
