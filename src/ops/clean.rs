//! Artifact cache removal.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::util::fs::{dir_size, remove_dir_all_if_exists};

/// What `clean` removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanResult {
    pub path: PathBuf,
    /// Whether there was anything to remove
    pub existed: bool,
    /// Bytes freed
    pub bytes: u64,
}

/// Remove the artifact cache at `cache_dir`.
pub fn clean(cache_dir: &Path) -> Result<CleanResult> {
    let existed = cache_dir.exists();
    let bytes = if existed { dir_size(cache_dir) } else { 0 };

    remove_dir_all_if_exists(cache_dir)?;
    tracing::debug!("Removed {} ({} bytes)", cache_dir.display(), bytes);

    Ok(CleanResult {
        path: cache_dir.to_path_buf(),
        existed,
        bytes,
    })
}
