//! Filesystem utilities.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Create a temp file next to `dest` so the final rename stays on one filesystem.
pub fn temp_file_beside(dest: &Path) -> Result<NamedTempFile> {
    let dir = dest
        .parent()
        .with_context(|| format!("no parent directory for {}", dest.display()))?;
    ensure_dir(dir)?;
    NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))
}

/// Move a finished temp file into place atomically.
pub fn persist(mut file: NamedTempFile, dest: &Path) -> Result<()> {
    file.as_file_mut()
        .flush()
        .with_context(|| format!("failed to flush {}", file.path().display()))?;
    file.persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to write {}", dest.display()))?;
    Ok(())
}

/// Write bytes to `dest` atomically (temp file plus rename).
pub fn write_atomic(dest: &Path, contents: &[u8]) -> Result<()> {
    let mut file = temp_file_beside(dest)?;
    file.write_all(contents)
        .with_context(|| format!("failed to write {}", file.path().display()))?;
    persist(file, dest)
}

/// Total size in bytes of the files under `path`.
pub fn dir_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
