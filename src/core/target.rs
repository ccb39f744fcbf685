//! Target definitions - the named build units of a package.
//!
//! A target is one of three closed variants: compiled from source,
//! resource-only, or a precompiled binary. The variant decides which
//! fields are legal, so hybrid declarations never make it past parsing.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::platform::Platform;
use crate::core::resource::Resource;

/// Where a binary target's archive comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Provisioning {
    /// Archive committed alongside the manifest, relative to the package root.
    Local { path: PathBuf },

    /// Archive downloaded from a URL and pinned by checksum.
    Remote { url: Url, checksum: String },
}

impl Provisioning {
    pub fn is_remote(&self) -> bool {
        matches!(self, Provisioning::Remote { .. })
    }
}

impl fmt::Display for Provisioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provisioning::Local { path } => write!(f, "{}", path.display()),
            Provisioning::Remote { url, .. } => write!(f, "{}", url),
        }
    }
}

/// A dependency edge out of a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TargetDep {
    /// A local target, or failing that a same-named product of a dependency.
    ByName { name: String },

    /// A target in this package.
    Target { name: String },

    /// A product exported by an external dependency.
    Product { package: String, product: String },
}

impl TargetDep {
    /// The referenced name, for error messages.
    pub fn reference(&self) -> String {
        match self {
            TargetDep::ByName { name } | TargetDep::Target { name } => name.clone(),
            TargetDep::Product { package, product } => format!("{}/{}", package, product),
        }
    }
}

/// Variant-specific target data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TargetKind {
    /// Compiled from source.
    Source {
        path: PathBuf,
        resources: Vec<Resource>,
        deps: Vec<TargetDep>,
    },

    /// A resource bundle with no code.
    Resource {
        path: PathBuf,
        resources: Vec<Resource>,
        deps: Vec<TargetDep>,
    },

    /// A precompiled, opaque binary.
    Binary { provisioning: Provisioning },
}

/// A build target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Target name, unique across the package and its dependencies' exports
    pub name: String,

    /// Variant data
    #[serde(flatten)]
    pub kind: TargetKind,

    /// Per-target platform overrides layered over the package's list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<Platform>,
}

impl Target {
    /// Create a source target rooted at `Sources/<name>`.
    pub fn source(name: impl Into<String>) -> Self {
        let name = name.into();
        Target {
            kind: TargetKind::Source {
                path: default_source_path(&name),
                resources: Vec::new(),
                deps: Vec::new(),
            },
            name,
            platforms: Vec::new(),
        }
    }

    /// Create a resource-only target rooted at `path`.
    pub fn resource(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Target {
            name: name.into(),
            kind: TargetKind::Resource {
                path: path.into(),
                resources: Vec::new(),
                deps: Vec::new(),
            },
            platforms: Vec::new(),
        }
    }

    /// Create a binary target.
    pub fn binary(name: impl Into<String>, provisioning: Provisioning) -> Self {
        Target {
            name: name.into(),
            kind: TargetKind::Binary { provisioning },
            platforms: Vec::new(),
        }
    }

    /// Add resources (no-op for binary targets).
    pub fn with_resources(mut self, items: impl IntoIterator<Item = Resource>) -> Self {
        if let TargetKind::Source { resources, .. } | TargetKind::Resource { resources, .. } =
            &mut self.kind
        {
            resources.extend(items);
        }
        self
    }

    /// Add dependency edges (no-op for binary targets).
    pub fn with_deps(mut self, items: impl IntoIterator<Item = TargetDep>) -> Self {
        if let TargetKind::Source { deps, .. } | TargetKind::Resource { deps, .. } = &mut self.kind
        {
            deps.extend(items);
        }
        self
    }

    /// Root directory relative to the package root (none for binaries).
    pub fn root(&self) -> Option<&Path> {
        match &self.kind {
            TargetKind::Source { path, .. } | TargetKind::Resource { path, .. } => Some(path),
            TargetKind::Binary { .. } => None,
        }
    }

    /// Declared resources.
    pub fn resources(&self) -> &[Resource] {
        match &self.kind {
            TargetKind::Source { resources, .. } | TargetKind::Resource { resources, .. } => {
                resources
            }
            TargetKind::Binary { .. } => &[],
        }
    }

    /// Declared dependency edges.
    pub fn deps(&self) -> &[TargetDep] {
        match &self.kind {
            TargetKind::Source { deps, .. } | TargetKind::Resource { deps, .. } => deps,
            TargetKind::Binary { .. } => &[],
        }
    }

    /// Provisioning source for binary targets.
    pub fn provisioning(&self) -> Option<&Provisioning> {
        match &self.kind {
            TargetKind::Binary { provisioning } => Some(provisioning),
            _ => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.kind, TargetKind::Binary { .. })
    }

    /// Short kind label for display.
    pub fn kind_str(&self) -> &'static str {
        match self.kind {
            TargetKind::Source { .. } => "source",
            TargetKind::Resource { .. } => "resource",
            TargetKind::Binary { .. } => "binary",
        }
    }
}

/// Default source directory for a target.
pub fn default_source_path(name: &str) -> PathBuf {
    Path::new("Sources").join(name)
}
