use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::CompressionMethod;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// In-memory archive keyed by entry name; adding an existing name replaces it.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: String, payload: Vec<u8>) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = payload,
            None => self.entries.push((name, payload)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes all entries, in insertion order, into one ZIP payload.
    pub fn finish(self) -> Result<Vec<u8>, ArchiveError> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, payload) in &self.entries {
            writer.start_file(name.as_str(), options)?;
            writer.write_all(payload)?;
        }
        Ok(writer.finish()?.into_inner())
    }
}
