//! PackageLoader trait - how dependency manifests are obtained.

use crate::core::{Dependency, Manifest};
use crate::resolver::errors::ResolveError;

/// A source of already-pinned dependency packages.
pub trait PackageLoader {
    /// Load the manifest of `dep`, declared by `parent`.
    fn load(&mut self, parent: &Manifest, dep: &Dependency) -> Result<Manifest, ResolveError>;
}
