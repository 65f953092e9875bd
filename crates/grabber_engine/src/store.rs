use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use grabber_core::{normalize_selection, SelectionSet, ToggleOutcome};
use grabber_logging::{grab_debug, grab_warn};
use serde_json::{Map, Value};

use crate::persist::{AtomicFileWriter, PersistError};

pub const SELECTION_KEY: &str = "ibd_selectedImages_v1";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("invalid store path {0:?}")]
    InvalidPath(PathBuf),
}

/// Asynchronous named-value persistence.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// All keys in one JSON object file, rewritten atomically on every `set`.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Map<String, Value>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                grab_warn!("Ignoring malformed store file {:?}", self.path);
                Ok(Map::new())
            }
        }
    }

    fn save(&self, map: Map<String, Value>) -> Result<(), StoreError> {
        let (Some(dir), Some(name)) = (self.path.parent(), self.path.file_name()) else {
            return Err(StoreError::InvalidPath(self.path.clone()));
        };
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir.to_path_buf()
        };
        let content = serde_json::to_vec_pretty(&Value::Object(map))?;
        AtomicFileWriter::new(dir).write(&name.to_string_lossy(), &content)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.load()?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load()?;
        map.insert(key.to_string(), value);
        self.save(map)
    }
}

/// Bounded, deduplicated, insertion-ordered selection persisted in a [`KeyValueStore`].
///
/// Every mutation is one read-modify-write under an exclusive lock, so the cap
/// holds at every point another reader can observe.
pub struct SelectionStore {
    store: Arc<dyn KeyValueStore>,
    cap: usize,
    lock: tokio::sync::Mutex<()>,
}

impl SelectionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, max_selection: usize) -> Self {
        Self {
            store,
            cap: SelectionSet::new(max_selection).cap(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub async fn get(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read().await?.into_urls())
    }

    pub async fn set(&self, urls: Vec<String>) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock().await;
        let normalized = normalize_selection(urls, self.cap);
        self.write(&normalized).await?;
        Ok(normalized)
    }

    pub async fn toggle(&self, url: &str) -> Result<ToggleOutcome, StoreError> {
        let _guard = self.lock.lock().await;
        let mut selection = self.read().await?;
        let outcome = selection.toggle(url);
        match outcome {
            ToggleOutcome::Added | ToggleOutcome::Removed => {
                self.write(selection.urls()).await?;
            }
            ToggleOutcome::AtCapacity => {
                grab_warn!("Selection full ({}); not adding {}", self.cap, url);
            }
            ToggleOutcome::Ignored => {}
        }
        grab_debug!("Toggle {} -> {:?}", url, outcome);
        Ok(outcome)
    }

    /// Appends `urls` behind the current selection, dropping duplicates and overflow.
    pub async fn add_all(&self, urls: Vec<String>) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut selection = self.read().await?;
        selection.extend(urls);
        self.write(selection.urls()).await?;
        Ok(selection.into_urls())
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.set(Vec::new()).await.map(|_| ())
    }

    async fn read(&self) -> Result<SelectionSet, StoreError> {
        let stored = self.store.get(SELECTION_KEY).await?;
        let urls: Vec<String> = match stored {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(ToOwned::to_owned))
                .collect(),
            _ => Vec::new(),
        };
        Ok(SelectionSet::from_urls(urls, self.cap))
    }

    async fn write(&self, urls: &[String]) -> Result<(), StoreError> {
        let value = Value::Array(urls.iter().cloned().map(Value::String).collect());
        self.store.set(SELECTION_KEY, value).await
    }
}
