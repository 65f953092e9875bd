use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use grabber_logging::grab_debug;

use crate::persist::{AtomicFileWriter, PersistError};

/// Opaque reference to a staged payload, valid until released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictAction {
    /// Pick a free name (`name (1).ext`) when the target exists.
    #[default]
    Uniquify,
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub handle: HandleId,
    /// Relative path, `folder/name.ext` or `name.ext`.
    pub filename: String,
    pub conflict: ConflictAction,
    /// Ask the user where to save, when the sink can.
    pub prompt: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("unknown or released {0}")]
    UnknownHandle(HandleId),
    #[error("save failed: {0}")]
    Persist(#[from] PersistError),
    #[error("save interrupted: {0}")]
    Interrupted(String),
}

/// Where finished payloads go.
///
/// Payloads are staged first and saved by handle; the caller decides when a
/// handle is released, independently of whether the save has been read back.
#[async_trait::async_trait]
pub trait DeliverySink: Send + Sync {
    async fn stage(&self, payload: Bytes) -> Result<HandleId, DeliveryError>;
    async fn save(&self, request: SaveRequest) -> Result<PathBuf, DeliveryError>;
    fn release(&self, handle: HandleId);
}

/// Saves into a local directory with atomic writes.
pub struct DirectorySink {
    root: PathBuf,
    staged: Mutex<HashMap<HandleId, Bytes>>,
    next_id: AtomicU64,
}

impl DirectorySink {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            staged: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Number of payloads staged and not yet released.
    pub fn staged_count(&self) -> usize {
        self.staged.lock().map(|map| map.len()).unwrap_or(0)
    }

    fn staged_payload(&self, handle: HandleId) -> Option<Bytes> {
        self.staged
            .lock()
            .ok()
            .and_then(|map| map.get(&handle).cloned())
    }
}

#[async_trait::async_trait]
impl DeliverySink for DirectorySink {
    async fn stage(&self, payload: Bytes) -> Result<HandleId, DeliveryError> {
        let handle = HandleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.staged
            .lock()
            .map_err(|e| DeliveryError::Interrupted(e.to_string()))?
            .insert(handle, payload);
        Ok(handle)
    }

    async fn save(&self, request: SaveRequest) -> Result<PathBuf, DeliveryError> {
        let payload = self
            .staged_payload(request.handle)
            .ok_or(DeliveryError::UnknownHandle(request.handle))?;
        if request.prompt {
            grab_debug!(
                "Location prompt requested for {}; saving under {:?}",
                request.filename,
                self.root
            );
        }

        let writer = AtomicFileWriter::new(self.root.clone());
        let filename = request.filename;
        let conflict = request.conflict;
        tokio::task::spawn_blocking(move || match conflict {
            ConflictAction::Uniquify => writer.write_unique(&filename, &payload),
            ConflictAction::Overwrite => writer.write(&filename, &payload),
        })
        .await
        .map_err(|e| DeliveryError::Interrupted(e.to_string()))?
        .map_err(DeliveryError::from)
    }

    fn release(&self, handle: HandleId) {
        if let Ok(mut map) = self.staged.lock() {
            map.remove(&handle);
        }
    }
}
