//! Discovery of previously downloaded assets under a product directory.
//!
//! The directory tree is the only record of past runs: every
//! `<asset id>/<file>` pair below a product directory is a local copy.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// A file found in an asset id directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCopy {
    /// File name as found on disk.
    pub file_name: String,
    /// Observed size in bytes.
    pub size: u64,
    /// Full path of the file.
    pub path: PathBuf,
}

/// Local copies keyed by asset id directory name.
pub type LocalState = BTreeMap<String, LocalCopy>;

/// Errors raised while scanning a product directory.
#[derive(Debug, Error)]
#[error("failed to inspect {path}: {source}")]
pub struct InspectError {
    /// Directory or file that could not be read.
    pub path: PathBuf,
    /// Underlying IO error.
    #[source]
    pub source: std::io::Error,
}

impl InspectError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reports the local copy of every asset under `product_dir`.
///
/// A missing directory yields an empty state. Plain files directly in the
/// product directory (payload dumps, shortcuts) are not assets and are
/// ignored, as are dot-files such as in-progress downloads.
///
/// # Errors
///
/// Returns [`InspectError`] if an existing directory cannot be read.
pub fn inspect(product_dir: &Path) -> Result<LocalState, InspectError> {
    let mut state = LocalState::new();

    let entries = match fs::read_dir(product_dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            debug!(dir = %product_dir.display(), "product directory does not exist yet");
            return Ok(state);
        }
        Err(error) => return Err(InspectError::io(product_dir, error)),
    };

    for entry in entries {
        let entry = entry.map_err(|e| InspectError::io(product_dir, e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| InspectError::io(&entry.path(), e))?;
        if !file_type.is_dir() {
            continue;
        }
        let id = entry.file_name().to_string_lossy().into_owned();
        if id.starts_with('.') {
            continue;
        }
        if let Some(copy) = inspect_asset_dir(&id, &entry.path())? {
            state.insert(id, copy);
        }
    }

    debug!(dir = %product_dir.display(), assets = state.len(), "inspected product directory");
    Ok(state)
}

fn inspect_asset_dir(id: &str, dir: &Path) -> Result<Option<LocalCopy>, InspectError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| InspectError::io(dir, e))? {
        let entry = entry.map_err(|e| InspectError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| InspectError::io(&entry.path(), e))?;
        if metadata.is_file() {
            files.push(LocalCopy {
                file_name: name,
                size: metadata.len(),
                path: entry.path(),
            });
        }
    }

    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    if files.len() > 1 {
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        warn!(
            asset_id = id,
            dir = %dir.display(),
            files = ?names,
            "asset directory holds more than one file; using the first"
        );
    }
    Ok(files.into_iter().next())
}
