//! Hashing utilities for artifact checksums.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Algorithm used to verify remote artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl ChecksumAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Blake3 => "blake3",
        }
    }

    /// Start an incremental hash.
    pub fn hasher(&self) -> Hasher {
        match self {
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            ChecksumAlgorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Hash a byte slice, hex encoded.
    pub fn digest(&self, data: &[u8]) -> String {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finish()
    }

    /// Hash a file without loading it into memory.
    pub fn digest_file(&self, path: &Path) -> Result<String> {
        let file = File::open(path)
            .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

        let mut reader = BufReader::new(file);
        let mut hasher = self.hasher();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finish())
    }

    /// Hash a directory tree: sorted relative paths with their contents.
    ///
    /// Used for unpacked bundles such as `.xcframework` directories.
    pub fn digest_dir(&self, dir: &Path) -> Result<String> {
        let mut hasher = self.hasher();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry =
                entry.with_context(|| format!("failed to walk directory: {}", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
            hasher.update(b"\0");
            hasher.update(self.digest_file(entry.path())?.as_bytes());
            hasher.update(b"\0");
        }

        Ok(hasher.finish())
    }

    /// Hash a file or directory.
    pub fn digest_path(&self, path: &Path) -> Result<String> {
        if path.is_dir() {
            self.digest_dir(path)
        } else {
            self.digest_file(path)
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incremental hasher over one of the supported algorithms.
pub enum Hasher {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finalize and return the digest as lowercase hex.
    pub fn finish(self) -> String {
        match self {
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hasher::Sha256(_) => f.write_str("Hasher::Sha256"),
            Hasher::Blake3(_) => f.write_str("Hasher::Blake3"),
        }
    }
}

/// Compute SHA256 hash of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    ChecksumAlgorithm::Sha256.digest(data)
}
