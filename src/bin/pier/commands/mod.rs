//! Command implementations

pub mod clean;
pub mod completions;
pub mod fetch;
pub mod resolve;
pub mod tree;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cli::{GlobalArgs, NetArgs};
use pier::ops::{ResolveOptions, Session};
use pier::resolver::ResolveError;
use pier::sources::{ArtifactCache, HttpFetcher};
use pier::util::GlobalContext;
use pier::Manifest;

/// The package a command operates on.
pub struct Package {
    pub ctx: GlobalContext,
    pub manifest: Manifest,
}

impl Package {
    pub fn root(&self) -> &Path {
        &self.manifest.manifest_dir
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.ctx.artifact_cache_dir(self.root())
    }

    /// Apply `--jobs` and `--offline` over the loaded configuration.
    pub fn apply_net_args(&mut self, args: &NetArgs) {
        let config = self.ctx.config_mut();
        if args.jobs.is_some() {
            config.build.jobs = args.jobs;
        }
        if args.offline {
            config.net.offline = true;
        }
    }

    /// Run `f` with a cache and HTTP fetcher built from configuration.
    pub fn with_session<T>(
        &self,
        f: impl FnOnce(&Session<'_>) -> Result<T, ResolveError>,
    ) -> Result<T> {
        let config = self.ctx.config();
        let cache = ArtifactCache::new(self.cache_dir(), config.checksum_algorithm());
        let fetcher = HttpFetcher::new(config.timeout(), &config.user_agent())?;

        let session = Session {
            cache: &cache,
            fetcher: &fetcher,
            options: ResolveOptions::from_config(config),
        };

        Ok(f(&session)?)
    }
}

/// Locate and parse the manifest, then load configuration for its package.
pub fn load_package(global: &GlobalArgs) -> Result<Package> {
    let mut ctx = GlobalContext::new()?;

    let manifest_path = match &global.manifest_path {
        Some(path) => path
            .canonicalize()
            .with_context(|| format!("manifest not found: {}", path.display()))?,
        None => ctx.find_manifest().map_err(|e| {
            anyhow::anyhow!("{}\nhelp: Run pier inside a package, or pass --manifest-path", e)
        })?,
    };

    let manifest = Manifest::load(&manifest_path)?;
    ctx.load_config(&manifest.manifest_dir);

    Ok(Package { ctx, manifest })
}
