use url::Url;

use crate::request::{ExportFormat, ExportRequest, NamingMode};

pub const DEFAULT_EXTENSION: &str = "jpg";
const ARCHIVE_FALLBACK_NAME: &str = "images";

/// Naming-related subset of an export request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamingSettings {
    pub naming_mode: NamingMode,
    pub custom_template: String,
    pub format: ExportFormat,
}

impl From<&ExportRequest> for NamingSettings {
    fn from(request: &ExportRequest) -> Self {
        Self {
            naming_mode: request.naming_mode,
            custom_template: request.custom_template.clone(),
            format: request.format,
        }
    }
}

/// Builds the file name for the item at zero-based `index`.
///
/// `original_extension` is only used for `ExportFormat::Original`.
pub fn generate_filename(
    settings: &NamingSettings,
    index: usize,
    page_title: &str,
    site_id: &str,
    original_extension: &str,
) -> String {
    let id = format!("{:03}", index + 1);
    let base = match settings.naming_mode {
        NamingMode::Auto => format!("{page_title}_{id}"),
        NamingMode::Custom if !settings.custom_template.is_empty() => settings
            .custom_template
            .replace("{site}", site_id)
            .replace("{title}", page_title)
            .replace("{index}", &id),
        NamingMode::Sequential | NamingMode::Custom => format!("image_{id}"),
    };
    let extension = settings.format.extension().unwrap_or(original_extension);
    format!("{}.{}", sanitize_segment(&base), sanitize_segment(extension))
}

/// Extension of the last path segment of `url`; `jpg` when there is none.
pub fn source_extension(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let last_segment = path.rsplit('/').next().unwrap_or_default();
    match last_segment.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_string(),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// Name of the bundled archive: folder name, else page title, else `images`.
pub fn archive_filename(folder_name: &str, page_title: &str) -> String {
    let stem = [folder_name, page_title]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or(ARCHIVE_FALLBACK_NAME);
    sanitize_segment(&format!("{stem}.zip"))
}

/// Replaces characters that are unsafe in a single path segment with `_`.
pub fn sanitize_segment(input: &str) -> String {
    input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect()
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}
