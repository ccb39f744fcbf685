//! Filesystem package loader - path dependencies and pinned checkouts.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::core::manifest::MANIFEST_NAME;
use crate::core::{Dependency, Manifest};
use crate::resolver::errors::ResolveError;
use crate::sources::PackageLoader;

/// Loads dependency manifests from disk.
///
/// Path dependencies are read relative to the declaring package; remote
/// dependencies from `.pier/checkouts/<name>` under it. Each manifest is
/// parsed at most once per loader.
#[derive(Debug, Default)]
pub struct PathLoader {
    /// Cached manifests by manifest path
    loaded: HashMap<PathBuf, Manifest>,
}

impl PathLoader {
    /// Create a new loader.
    pub fn new() -> Self {
        PathLoader {
            loaded: HashMap::new(),
        }
    }
}

impl PackageLoader for PathLoader {
    fn load(&mut self, parent: &Manifest, dep: &Dependency) -> Result<Manifest, ResolveError> {
        let dir = dep.package_dir(&parent.manifest_dir);
        let manifest_path = dir.join(MANIFEST_NAME);

        if let Some(cached) = self.loaded.get(&manifest_path) {
            return Ok(cached.clone());
        }

        if !manifest_path.is_file() {
            return Err(ResolveError::DependencyUnavailable {
                package: dep.name().to_string(),
                path: dir,
            });
        }

        let dir = dir.canonicalize().unwrap_or(dir);
        tracing::debug!("Loading dependency {} from {}", dep.name(), dir.display());
        let manifest = Manifest::load(&dir.join(MANIFEST_NAME))?;

        if manifest.name() != dep.name() {
            return Err(ResolveError::malformed(
                parent.name(),
                format!(
                    "dependency `{}` resolves to package `{}` at {}",
                    dep.name(),
                    manifest.name(),
                    dir.display()
                ),
            ));
        }

        self.loaded.insert(manifest_path, manifest.clone());
        Ok(manifest)
    }
}
