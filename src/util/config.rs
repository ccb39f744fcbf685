//! Configuration file support for Pier.
//!
//! Pier supports two configuration file locations:
//! - Global: `~/.pier/config.toml` - User-wide defaults
//! - Project: `.pier/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::hash::ChecksumAlgorithm;

/// Default number of download attempts per artifact.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BACKOFF_MS: u64 = 500;

/// Default HTTP timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Pier configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Network settings
    pub net: NetConfig,

    /// Artifact cache settings
    pub cache: CacheConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Concurrent artifact workers (None = number of CPUs)
    pub jobs: Option<usize>,
}

/// Network-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetConfig {
    /// Download attempts per artifact, including the first
    pub retries: Option<u32>,

    /// Initial retry delay in milliseconds, doubled per attempt
    pub backoff_ms: Option<u64>,

    /// HTTP timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Allow one fresh download after a checksum mismatch
    pub refetch_on_mismatch: Option<bool>,

    /// User agent for artifact downloads
    pub user_agent: Option<String>,

    /// Offline mode (only cached artifacts)
    #[serde(default)]
    pub offline: bool,
}

/// Artifact cache configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory (default: `<package>/.pier/artifacts`)
    pub dir: Option<PathBuf>,

    /// Checksum algorithm for remote artifacts
    pub checksum: Option<ChecksumAlgorithm>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }

        if other.net.retries.is_some() {
            self.net.retries = other.net.retries;
        }
        if other.net.backoff_ms.is_some() {
            self.net.backoff_ms = other.net.backoff_ms;
        }
        if other.net.timeout_secs.is_some() {
            self.net.timeout_secs = other.net.timeout_secs;
        }
        if other.net.refetch_on_mismatch.is_some() {
            self.net.refetch_on_mismatch = other.net.refetch_on_mismatch;
        }
        if other.net.user_agent.is_some() {
            self.net.user_agent = other.net.user_agent;
        }
        if other.net.offline {
            self.net.offline = true;
        }

        if other.cache.dir.is_some() {
            self.cache.dir = other.cache.dir;
        }
        if other.cache.checksum.is_some() {
            self.cache.checksum = other.cache.checksum;
        }
    }

    /// Download attempts per artifact (at least one).
    pub fn retries(&self) -> u32 {
        self.net.retries.unwrap_or(DEFAULT_RETRIES).max(1)
    }

    /// Delay before the first retry.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.net.backoff_ms.unwrap_or(DEFAULT_BACKOFF_MS))
    }

    /// HTTP timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.net.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn refetch_on_mismatch(&self) -> bool {
        self.net.refetch_on_mismatch.unwrap_or(true)
    }

    pub fn user_agent(&self) -> String {
        self.net
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("pier/{}", env!("CARGO_PKG_VERSION")))
    }

    pub fn checksum_algorithm(&self) -> ChecksumAlgorithm {
        self.cache.checksum.unwrap_or_default()
    }

    /// Cache directory for a package rooted at `root`.
    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        match &self.cache.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.join(".pier").join("artifacts"),
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.pier/config.toml)
/// 2. Global config (~/.pier/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path));
    }

    config.merge(Config::load_or_default(project_path));

    config
}

/// Get the global pier config directory (~/.pier).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".pier"))
}

/// Get the global config path (~/.pier/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.pier/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".pier").join("config.toml")
}
