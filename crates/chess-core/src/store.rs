//! Flat-file persistence: atomic whole-file replacement, JSON arrays and
//! append-only text.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::error;

use crate::error::StoreError;

/// A stage result together with the outcome of persisting it.
///
/// The value is always handed back, even when the save failed, so an
/// interactive caller keeps a finished computation.
#[derive(Debug)]
pub struct Saved<T> {
    pub value: T,
    pub save_error: Option<StoreError>,
}

impl<T> Saved<T> {
    pub fn new(value: T, saved: Result<(), StoreError>) -> Self {
        let save_error = match saved {
            Ok(()) => None,
            Err(e) => {
                error!(error = %e, "Failed to persist stage output");
                Some(e)
            }
        };
        Self { value, save_error }
    }

    pub fn is_saved(&self) -> bool {
        self.save_error.is_none()
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Replace `path` with `contents` via a sibling temp file and rename, so
/// readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    tmp.write_all(contents).map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StoreError::Persist {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

/// Load a JSON document. A missing file is `Ok(None)`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Load a JSON array of records, treating a missing file as empty.
pub fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    Ok(load_json(path)?.unwrap_or_default())
}

/// Read a whole text file. A missing file reads as empty.
pub fn read_text(path: &Path) -> Result<String, StoreError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Append `text` to `path`, creating it (and its directory) if needed.
pub fn append_text(path: &Path, text: &str) -> Result<(), StoreError> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| StoreError::io(path, e))?;
    file.sync_data().map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Current size of a file in bytes; 0 if it does not exist.
pub fn file_len(path: &Path) -> Result<u64, StoreError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(StoreError::io(path, e)),
    }
}
