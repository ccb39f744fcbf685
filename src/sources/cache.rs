//! Checksum-keyed artifact cache.
//!
//! Verified archives live at `<dir>/<algorithm>/<checksum>.zip`. Lookups
//! take a read lock on the key map; a miss installs a per-key slot whose
//! mutex is held for the whole fetch, so each checksum is downloaded at
//! most once even when several workers ask for it concurrently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tempfile::NamedTempFile;

use crate::resolver::errors::ResolveError;
use crate::util::fs;
use crate::util::hash::ChecksumAlgorithm;

type Slot = Arc<Mutex<Option<PathBuf>>>;

/// A cache entry handed back to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub path: PathBuf,
    /// False only when this call performed the download
    pub from_cache: bool,
}

/// Content-addressed store for downloaded artifacts.
#[derive(Debug)]
pub struct ArtifactCache {
    dir: PathBuf,
    algorithm: ChecksumAlgorithm,
    slots: RwLock<HashMap<String, Slot>>,
}

impl ArtifactCache {
    /// Create a cache rooted at `dir`. Nothing is created on disk until a write.
    pub fn new(dir: impl Into<PathBuf>, algorithm: ChecksumAlgorithm) -> Self {
        ArtifactCache {
            dir: dir.into(),
            algorithm,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// On-disk location for `checksum`.
    pub fn entry_path(&self, checksum: &str) -> PathBuf {
        self.dir
            .join(self.algorithm.as_str())
            .join(format!("{}.zip", checksum))
    }

    /// Number of checksums known to this cache instance.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, checksum: &str) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(checksum)
        {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(checksum.to_string()).or_default())
    }

    /// Return the cached archive for `checksum`, or run `fetch` to produce it.
    ///
    /// `fetch` receives the final entry path and returns a verified temp
    /// file, which is renamed into place. A file already on disk is re-hashed
    /// before it is trusted; a corrupt one is discarded and fetched again.
    pub fn get_or_fetch<F>(
        &self,
        target: &str,
        checksum: &str,
        fetch: F,
    ) -> Result<CachedArtifact, ResolveError>
    where
        F: FnOnce(&Path) -> Result<NamedTempFile, ResolveError>,
    {
        let slot = self.slot(checksum);
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(path) = entry.as_ref() {
            tracing::debug!("Cache hit (memory) for {}: {}", target, checksum);
            return Ok(CachedArtifact {
                path: path.clone(),
                from_cache: true,
            });
        }

        let path = self.entry_path(checksum);

        if path.is_file() {
            let actual = self
                .algorithm
                .digest_file(&path)
                .map_err(|e| ResolveError::io(target, e))?;

            if actual == checksum {
                tracing::debug!("Cache hit (disk) for {}: {}", target, path.display());
                *entry = Some(path.clone());
                return Ok(CachedArtifact {
                    path,
                    from_cache: true,
                });
            }

            tracing::warn!(
                "Discarding corrupt cache entry {} (hash {})",
                path.display(),
                actual
            );
            std::fs::remove_file(&path).map_err(|e| ResolveError::io(target, e))?;
        }

        let file = fetch(&path)?;
        fs::persist(file, &path).map_err(|e| ResolveError::io(target, e))?;

        *entry = Some(path.clone());
        Ok(CachedArtifact {
            path,
            from_cache: false,
        })
    }
}
