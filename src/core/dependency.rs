//! External package dependencies.
//!
//! A dependency is already pinned by the time the resolver sees it: a path
//! dependency points at a package on disk, a remote one at a checkout that
//! an earlier fetch step placed under `.pier/checkouts/<name>`. Version
//! selection never happens here.

use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};
use url::Url;

/// Where an external package lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DependencySource {
    /// Package directory relative to the depending package's root.
    Path { path: PathBuf },

    /// A remote repository pinned to a version or revision.
    Remote {
        url: Url,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<Version>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
    },
}

/// A dependency on an external package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Package name
    name: String,

    /// Where the package lives
    source: DependencySource,

    /// Products this package is allowed to depend on
    products: Vec<String>,
}

impl Dependency {
    /// Create a path dependency.
    pub fn path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Dependency {
            name: name.into(),
            source: DependencySource::Path { path: path.into() },
            products: Vec::new(),
        }
    }

    /// Create a dependency with an explicit source.
    pub fn new(name: impl Into<String>, source: DependencySource) -> Self {
        Dependency {
            name: name.into(),
            source,
            products: Vec::new(),
        }
    }

    /// Set the exported products this package may use.
    pub fn with_products(mut self, products: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.products = products.into_iter().map(Into::into).collect();
        self
    }

    /// Get the package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the source.
    pub fn source(&self) -> &DependencySource {
        &self.source
    }

    /// Get the usable products.
    pub fn products(&self) -> &[String] {
        &self.products
    }

    /// Whether `product` may be depended upon.
    pub fn exports(&self, product: &str) -> bool {
        self.products.iter().any(|p| p == product)
    }

    /// Directory holding this dependency's manifest, given the depending
    /// package's root.
    pub fn package_dir(&self, root: &Path) -> PathBuf {
        match &self.source {
            DependencySource::Path { path } => root.join(path),
            DependencySource::Remote { .. } => checkouts_dir(root).join(&self.name),
        }
    }
}

/// Directory where pinned remote dependencies are checked out.
pub fn checkouts_dir(root: &Path) -> PathBuf {
    root.join(".pier").join("checkouts")
}
