//! Binary artifact resolution.
//!
//! Local archives are hashed in place. Remote archives go through the
//! checksum-keyed cache and are only trusted once their digest matches the
//! one pinned in the manifest.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tempfile::NamedTempFile;
use url::Url;

use crate::core::platform::{Platform, PlatformName};
use crate::core::target::{Provisioning, Target};
use crate::resolver::errors::ResolveError;
use crate::sources::cache::ArtifactCache;
use crate::sources::fetch::{FetchError, Fetcher};
use crate::util::config::Config;
use crate::util::fs;
use crate::util::hash::{ChecksumAlgorithm, Hasher};

/// Where a verified artifact came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactOrigin {
    Local,
    Remote { url: Url },
}

/// A binary target's archive, located and verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub target: String,
    pub path: PathBuf,
    pub checksum: String,
    pub algorithm: ChecksumAlgorithm,
    pub origin: ArtifactOrigin,
    pub from_cache: bool,
    /// Slice directories of an unpacked `.xcframework`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slices: Vec<String>,
}

/// Download behaviour for remote artifacts.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Attempts per download, including the first
    pub retries: u32,
    /// Delay before the first retry, doubled after each
    pub backoff: Duration,
    pub refetch_on_mismatch: bool,
    pub offline: bool,
}

impl FetchPolicy {
    pub fn from_config(config: &Config) -> Self {
        FetchPolicy {
            retries: config.retries(),
            backoff: config.backoff(),
            refetch_on_mismatch: config.refetch_on_mismatch(),
            offline: config.net.offline,
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Resolves binary targets to verified artifacts.
pub struct ArtifactResolver<'a> {
    cache: &'a ArtifactCache,
    fetcher: &'a dyn Fetcher,
    policy: FetchPolicy,
}

impl<'a> ArtifactResolver<'a> {
    pub fn new(cache: &'a ArtifactCache, fetcher: &'a dyn Fetcher, policy: FetchPolicy) -> Self {
        ArtifactResolver {
            cache,
            fetcher,
            policy,
        }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.cache.algorithm()
    }

    /// Resolve a binary target. Returns `None` for source and resource targets.
    pub fn resolve(
        &self,
        package_root: &Path,
        target: &Target,
        platforms: &[Platform],
        cancel: &AtomicBool,
    ) -> Result<Option<Artifact>, ResolveError> {
        match target.provisioning() {
            None => Ok(None),
            Some(Provisioning::Local { path }) => self
                .resolve_local(&target.name, &package_root.join(path), platforms)
                .map(Some),
            Some(Provisioning::Remote { url, checksum }) => self
                .resolve_remote(&target.name, url, checksum, cancel)
                .map(Some),
        }
    }

    /// Locate and fingerprint an archive shipped with the package.
    pub fn resolve_local(
        &self,
        target: &str,
        path: &Path,
        platforms: &[Platform],
    ) -> Result<Artifact, ResolveError> {
        if !path.exists() {
            return Err(ResolveError::ArtifactNotFound {
                target: target.to_string(),
                path: path.to_path_buf(),
            });
        }

        let algorithm = self.algorithm();
        let checksum = algorithm
            .digest_path(path)
            .map_err(|e| ResolveError::io(target, e))?;
        tracing::debug!("Hashed {} ({}): {}", target, algorithm, checksum);

        let slices = if is_xcframework(path) {
            let slices = list_slices(path).map_err(|e| ResolveError::io(target, e))?;
            for platform in platforms {
                if !slices.iter().any(|s| slice_matches(platform.name, s)) {
                    tracing::warn!(
                        "`{}` declares {} but {} has no matching slice",
                        target,
                        platform.name,
                        path.display()
                    );
                }
            }
            slices
        } else {
            Vec::new()
        };

        Ok(Artifact {
            target: target.to_string(),
            path: path.to_path_buf(),
            checksum,
            algorithm,
            origin: ArtifactOrigin::Local,
            from_cache: false,
            slices,
        })
    }

    /// Fetch (or reuse) a remote archive and verify it against `checksum`.
    pub fn resolve_remote(
        &self,
        target: &str,
        url: &Url,
        checksum: &str,
        cancel: &AtomicBool,
    ) -> Result<Artifact, ResolveError> {
        let entry = self.cache.get_or_fetch(target, checksum, |dest| {
            if self.policy.offline {
                return Err(ResolveError::Network {
                    target: target.to_string(),
                    url: url.to_string(),
                    attempts: 0,
                    message: "not cached and offline mode is enabled".into(),
                });
            }
            self.download_verified(target, url, checksum, dest, cancel)
        })?;

        Ok(Artifact {
            target: target.to_string(),
            path: entry.path,
            checksum: checksum.to_string(),
            algorithm: self.algorithm(),
            origin: ArtifactOrigin::Remote { url: url.clone() },
            from_cache: entry.from_cache,
            slices: Vec::new(),
        })
    }

    /// Download into a temp file beside `dest`, refetching once on mismatch.
    fn download_verified(
        &self,
        target: &str,
        url: &Url,
        expected: &str,
        dest: &Path,
        cancel: &AtomicBool,
    ) -> Result<NamedTempFile, ResolveError> {
        let rounds = if self.policy.refetch_on_mismatch { 2 } else { 1 };
        let mut actual = String::new();

        for round in 0..rounds {
            if round > 0 {
                tracing::warn!(
                    "Checksum mismatch for {} (got {}), downloading again",
                    target,
                    actual
                );
            }

            let mut file = fs::temp_file_beside(dest).map_err(|e| ResolveError::io(target, e))?;
            actual = self.download(target, url, file.as_file_mut(), cancel)?;

            if actual == expected {
                tracing::debug!("Verified {}: {}", target, actual);
                return Ok(file);
            }
        }

        Err(ResolveError::ChecksumMismatch {
            target: target.to_string(),
            url: url.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }

    /// Download with retries, returning the digest of what was written.
    fn download(
        &self,
        target: &str,
        url: &Url,
        file: &mut std::fs::File,
        cancel: &AtomicBool,
    ) -> Result<String, ResolveError> {
        let mut delay = self.policy.backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.load(Ordering::Relaxed) {
                return Err(ResolveError::Cancelled {
                    target: target.to_string(),
                });
            }

            tracing::info!("Downloading {} from {}", target, url);
            truncate(file).map_err(|e| ResolveError::io(target, e))?;

            let mut sink = HashingWriter::new(&mut *file, self.algorithm());
            let error = match self.fetcher.fetch(url, &mut sink, cancel) {
                Ok(bytes) => {
                    tracing::debug!("Downloaded {} bytes for {}", bytes, target);
                    return Ok(sink.finish());
                }
                Err(e) => e,
            };

            match error {
                FetchError::Cancelled => {
                    return Err(ResolveError::Cancelled {
                        target: target.to_string(),
                    })
                }
                FetchError::Sink(message) => {
                    return Err(ResolveError::Io {
                        target: target.to_string(),
                        message,
                    })
                }
                _ => {}
            }

            if !error.is_retryable() || attempt >= self.policy.retries {
                return Err(ResolveError::Network {
                    target: target.to_string(),
                    url: url.to_string(),
                    attempts: attempt,
                    message: error.to_string(),
                });
            }

            tracing::warn!(
                "Download of {} failed ({}), retrying in {:?} ({}/{})",
                target,
                error,
                delay,
                attempt,
                self.policy.retries
            );
            std::thread::sleep(delay);
            delay = delay.saturating_mul(2);
        }
    }
}

/// A writer that hashes everything it forwards.
struct HashingWriter<W> {
    inner: W,
    hasher: Hasher,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W, algorithm: ChecksumAlgorithm) -> Self {
        HashingWriter {
            inner,
            hasher: algorithm.hasher(),
        }
    }

    fn finish(self) -> String {
        self.hasher.finish()
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn truncate(file: &mut std::fs::File) -> std::io::Result<()> {
    use std::io::{Seek, SeekFrom};
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(())
}

fn is_xcframework(path: &Path) -> bool {
    path.is_dir() && path.extension().is_some_and(|e| e == "xcframework")
}

/// Slice directory names of an `.xcframework`, sorted.
fn list_slices(path: &Path) -> std::io::Result<Vec<String>> {
    let mut slices = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            slices.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    slices.sort();
    Ok(slices)
}

fn slice_matches(platform: PlatformName, slice: &str) -> bool {
    match platform {
        PlatformName::Maccatalyst => slice.ends_with("-maccatalyst"),
        PlatformName::Ios => slice.starts_with("ios-") && !slice.ends_with("-maccatalyst"),
        other => slice.starts_with(other.slice_prefix()),
    }
}
