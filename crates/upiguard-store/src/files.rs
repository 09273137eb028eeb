//! Whole-file reads and atomic writes for artifacts and reports.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use crate::StoreError;

/// Write `bytes` to `path` atomically.
///
/// The data goes to a temporary file in the destination directory, is
/// synced, and is then renamed over `path`. Readers see either the previous
/// file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

    info!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

/// Read a whole file into memory.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>, StoreError> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }
    Ok(fs::read(path)?)
}
