//! Global context for Pier operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::core::manifest::MANIFEST_NAME;
use crate::util::config::{self, Config};

/// Error locating a package manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("could not find `{MANIFEST_NAME}` in `{}` or any parent directory", .dir.display())]
    NotFound { dir: PathBuf },
}

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global Pier data (~/.pier/)
    home: PathBuf,

    /// Merged global and project configuration
    config: Config,
}

impl GlobalContext {
    /// Create a new GlobalContext with defaults.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::at(cwd))
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        Ok(Self::at(cwd))
    }

    fn at(cwd: PathBuf) -> Self {
        let home = config::global_config_dir().unwrap_or_else(|| PathBuf::from(".pier"));

        GlobalContext {
            cwd,
            home,
            config: Config::default(),
        }
    }

    /// Load global and project configuration for the package at `root`.
    pub fn load_config(&mut self, root: &Path) {
        let global = self.home.join("config.toml");
        self.config = config::load_config(Some(&global), &config::project_config_path(root));
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the Pier home directory (~/.pier/).
    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Find `Pier.toml` starting from cwd and searching upward.
    pub fn find_manifest(&self) -> Result<PathBuf, ManifestError> {
        let mut current = self.cwd.clone();
        loop {
            let candidate = current.join(MANIFEST_NAME);
            if candidate.is_file() {
                return Ok(candidate);
            }
            if !current.pop() {
                return Err(ManifestError::NotFound {
                    dir: self.cwd.clone(),
                });
            }
        }
    }

    /// Find the package root (directory containing Pier.toml).
    pub fn find_package_root(&self) -> Result<PathBuf, ManifestError> {
        let manifest = self.find_manifest()?;
        Ok(manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.cwd.clone()))
    }

    /// Artifact cache directory for the package at `root`.
    pub fn artifact_cache_dir(&self, root: &Path) -> PathBuf {
        self.config.cache_dir(root)
    }
}
