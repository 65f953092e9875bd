use std::collections::HashSet;
use std::fmt::Write;

use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

pub const DEFAULT_QUALITY: u8 = 90;
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_INTER_BATCH_DELAY_MS: u64 = 100;
pub const DEFAULT_PAGE_TITLE: &str = "Images";
pub const DEFAULT_SITE_ID: &str = "any";

/// Above this many URLs, low-performance mode lowers the encode quality.
pub const LOW_PERFORMANCE_THRESHOLD: usize = 20;
const LOW_PERFORMANCE_PENALTY: u8 = 20;
const LOW_PERFORMANCE_FLOOR: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    #[default]
    Direct,
    Archive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Original,
    Jpeg,
    Png,
    Webp,
    Bmp,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "original" => Some(Self::Original),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    /// File extension for converted output; `None` keeps the source extension.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Self::Original => None,
            Self::Jpeg => Some("jpg"),
            Self::Png => Some("png"),
            Self::Webp => Some("webp"),
            Self::Bmp => Some("bmp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingMode {
    #[default]
    Auto,
    Sequential,
    Custom,
}

impl NamingMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "sequential" => Some(Self::Sequential),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadLocation {
    #[default]
    Default,
    Ask,
}

/// Everything an export run needs. Construct with `Default` or `from_json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub urls: Vec<String>,
    pub quality: u8,
    pub delivery_mode: DeliveryMode,
    pub format: ExportFormat,
    pub folder_name: String,
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub naming_mode: NamingMode,
    pub custom_template: String,
    pub page_title: String,
    pub site_id: String,
    pub low_performance_mode: bool,
    pub download_location: DownloadLocation,
}

impl Default for ExportRequest {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            quality: DEFAULT_QUALITY,
            delivery_mode: DeliveryMode::Direct,
            format: ExportFormat::Original,
            folder_name: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            inter_batch_delay_ms: DEFAULT_INTER_BATCH_DELAY_MS,
            naming_mode: NamingMode::Auto,
            custom_template: String::new(),
            page_title: DEFAULT_PAGE_TITLE.to_string(),
            site_id: DEFAULT_SITE_ID.to_string(),
            low_performance_mode: false,
            download_location: DownloadLocation::Default,
        }
    }
}

impl ExportRequest {
    /// Lenient parse: every missing or malformed field keeps its default.
    pub fn from_json(value: &Value) -> Self {
        Self::default().merge_json(value)
    }

    /// Overlays the recognised fields of `value` onto `self`.
    pub fn merge_json(mut self, value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return self;
        };
        let field = |names: &[&str]| names.iter().find_map(|name| obj.get(*name));

        if let Some(urls) = field(&["urls"]).and_then(Value::as_array) {
            self.urls = urls
                .iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect();
        }
        if let Some(q) = field(&["quality"]).and_then(as_integer) {
            self.quality = q.clamp(1, 100) as u8;
        }
        if let Some(mode) = field(&["deliveryMode"]).and_then(Value::as_str) {
            match mode.trim().to_ascii_lowercase().as_str() {
                "archive" | "zip" => self.delivery_mode = DeliveryMode::Archive,
                "direct" => self.delivery_mode = DeliveryMode::Direct,
                _ => {}
            }
        } else if field(&["zipBundle"]).and_then(Value::as_bool) == Some(true) {
            self.delivery_mode = DeliveryMode::Archive;
        }
        if let Some(format) = field(&["format"])
            .and_then(Value::as_str)
            .and_then(ExportFormat::parse)
        {
            self.format = format;
        }
        if let Some(folder) = field(&["folderName"]).and_then(Value::as_str) {
            self.folder_name = folder.to_string();
        }
        if let Some(size) = field(&["batchSize"]).and_then(as_integer) {
            if size >= 1 {
                self.batch_size = size as usize;
            }
        }
        if let Some(delay) = field(&["interBatchDelayMs", "downloadDelay"]).and_then(as_integer) {
            if delay >= 0 {
                self.inter_batch_delay_ms = delay as u64;
            }
        }
        if let Some(mode) = field(&["namingMode"])
            .and_then(Value::as_str)
            .and_then(NamingMode::parse)
        {
            self.naming_mode = mode;
        }
        if let Some(template) = field(&["customTemplate"]).and_then(Value::as_str) {
            self.custom_template = template.to_string();
        }
        if let Some(title) = field(&["pageTitle"]).and_then(Value::as_str) {
            self.page_title = title.to_string();
        }
        if let Some(site) = field(&["siteId", "site"]).and_then(Value::as_str) {
            self.site_id = site.to_string();
        }
        if let Some(low) = field(&["lowPerformanceMode", "lowPerf"]).and_then(Value::as_bool) {
            self.low_performance_mode = low;
        }
        if let Some(location) = field(&["downloadLocation"]).and_then(Value::as_str) {
            self.download_location = if location.eq_ignore_ascii_case("ask") {
                DownloadLocation::Ask
            } else {
                DownloadLocation::Default
            };
        }
        self
    }
}

/// Integers, or floats with no fractional part; `i64` range only.
fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Absolute http(s) URLs, deduplicated, first occurrence kept.
pub fn accepted_urls(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter(|url| is_http_url(url))
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}

fn is_http_url(candidate: &str) -> bool {
    Url::parse(candidate)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Encode quality after the low-performance adjustment.
pub fn effective_quality(requested: u8, url_count: usize, low_performance_mode: bool) -> u8 {
    if low_performance_mode && url_count > LOW_PERFORMANCE_THRESHOLD {
        requested
            .saturating_sub(LOW_PERFORMANCE_PENALTY)
            .max(LOW_PERFORMANCE_FLOOR)
    } else {
        requested
    }
}

/// Mutual-exclusion key of a run: hex SHA-256 over the newline-joined URL list.
pub fn run_fingerprint(urls: &[String]) -> String {
    let mut hasher = Sha256::new();
    for (i, url) in urls.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(url.as_bytes());
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
