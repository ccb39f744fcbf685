//! ResolvedPackage - the immutable result of a successful resolution.

use serde::Serialize;

use crate::core::resource::Placement;
use crate::resolver::platform::EffectivePlatforms;
use crate::resolver::product::ComposedProduct;
use crate::sources::artifact::Artifact;

/// One target after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub name: String,
    pub package: String,
    pub kind: &'static str,
    /// Direct dependencies, sorted
    pub dependencies: Vec<String>,
    pub platforms: EffectivePlatforms,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    /// Bundle directory, for targets with resources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Placement>,
}

/// The fully resolved package handed to the build driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPackage {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_localization: Option<String>,
    /// Targets in topological order
    targets: Vec<ResolvedTarget>,
    products: Vec<ComposedProduct>,
}

impl ResolvedPackage {
    pub(crate) fn new(
        name: String,
        default_localization: Option<String>,
        targets: Vec<ResolvedTarget>,
        products: Vec<ComposedProduct>,
    ) -> Self {
        ResolvedPackage {
            name,
            default_localization,
            targets,
            products,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_localization(&self) -> Option<&str> {
        self.default_localization.as_deref()
    }

    /// Target names, dependencies first.
    pub fn order(&self) -> impl Iterator<Item = &str> + '_ {
        self.targets.iter().map(|t| t.name.as_str())
    }

    /// Targets in topological order.
    pub fn targets(&self) -> &[ResolvedTarget] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&ResolvedTarget> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn products(&self) -> &[ComposedProduct] {
        &self.products
    }

    pub fn product(&self, name: &str) -> Option<&ComposedProduct> {
        self.products.iter().find(|p| p.name == name)
    }

    /// Verified artifact of a binary target.
    pub fn artifact(&self, target: &str) -> Option<&Artifact> {
        self.target(target).and_then(|t| t.artifact.as_ref())
    }

    /// Resource placements of a target.
    pub fn placements(&self, target: &str) -> &[Placement] {
        self.target(target)
            .map(|t| t.resources.as_slice())
            .unwrap_or_default()
    }

    /// Serialize for the build driver.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
