use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use grabber_core::DEFAULT_MAX_SELECTION;
use grabber_engine::DEFAULT_FETCH_TIMEOUT;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LOG_FILENAME: &str = "grabber.log";

/// Settings read from `grabber.ron`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub store_path: PathBuf,
    pub max_selection: usize,
    pub fetch_timeout_ms: u64,
    pub log_to_file: bool,
    /// Export request fields, with the same names as the JSON request.
    pub defaults: BTreeMap<String, Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./downloads"),
            store_path: PathBuf::from("./.grabber_store.json"),
            max_selection: DEFAULT_MAX_SELECTION,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT.as_millis() as u64,
            log_to_file: false,
            defaults: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Reads `path`. A missing file gives the defaults silently; an unreadable
    /// or malformed one gives the defaults plus a warning for the caller to log.
    pub fn load(path: &Path) -> (Self, Option<String>) {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return (Self::default(), None);
            }
            Err(err) => {
                return (
                    Self::default(),
                    Some(format!("Failed to read config {path:?}: {err}")),
                );
            }
        };

        match ron::from_str(&content) {
            Ok(config) => (config, None),
            Err(err) => (
                Self::default(),
                Some(format!("Failed to parse config {path:?}: {err}")),
            ),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.max(1))
    }

    pub fn defaults_json(&self) -> Value {
        Value::Object(self.defaults.clone().into_iter().collect())
    }
}
