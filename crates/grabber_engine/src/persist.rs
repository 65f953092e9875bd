use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

const MAX_UNIQUE_ATTEMPTS: usize = 10_000;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("invalid relative file name: {0}")]
    InvalidName(String),
    #[error("no free file name for {0}")]
    NoFreeName(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // Writability check: try creating a temp file.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Writes `{dir}/{relative}` through a temp file in the target directory, then renames.
///
/// `relative` may contain sub-directories (`folder/name.jpg`); they are created
/// on demand. Absolute paths and `..` are rejected.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes, replacing any existing file with the same name.
    pub fn write(&self, relative: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        let target = self.target_path(relative)?;
        let tmp = self.stage(&target, content)?;

        if target.exists() {
            fs::remove_file(&target)?;
        }
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }

    /// Writes without clobbering: `name.ext`, then `name (1).ext`, `name (2).ext`, ...
    pub fn write_unique(&self, relative: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        let target = self.target_path(relative)?;
        let mut tmp = self.stage(&target, content)?;

        for attempt in 0..MAX_UNIQUE_ATTEMPTS {
            let candidate = numbered_variant(&target, attempt);
            match tmp.persist_noclobber(&candidate) {
                Ok(_) => return Ok(candidate),
                Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => tmp = err.file,
                Err(err) => return Err(PersistError::Io(err.error)),
            }
        }
        Err(PersistError::NoFreeName(relative.to_string()))
    }

    fn target_path(&self, relative: &str) -> Result<PathBuf, PersistError> {
        let rel = Path::new(relative);
        let is_plain = rel.components().count() > 0
            && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(PersistError::InvalidName(relative.to_string()));
        }
        Ok(self.dir.join(rel))
    }

    fn stage(&self, target: &Path, content: &[u8]) -> Result<NamedTempFile, PersistError> {
        let parent = target.parent().unwrap_or(&self.dir);
        ensure_output_dir(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        Ok(tmp)
    }
}

fn numbered_variant(target: &Path, n: usize) -> PathBuf {
    if n == 0 {
        return target.to_path_buf();
    }
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem} ({n}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({n})"),
    };
    target.with_file_name(name)
}
