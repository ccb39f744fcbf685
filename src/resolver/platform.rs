//! Platform constraint validation.
//!
//! Each target's effective minimum per platform is the maximum of what it
//! declares (its package's list with its own overrides layered on top) and
//! what every dependency effectively requires. Computed bottom-up in
//! topological order, so dependencies are always settled first.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::platform::{OsVersion, Platform, PlatformName};
use crate::resolver::errors::ResolveError;
use crate::resolver::graph::{TargetGraph, TargetNode};

/// Minimum version per platform.
pub type PlatformSet = BTreeMap<PlatformName, OsVersion>;

/// A dependency raised a target above its declared minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaisedFloor {
    pub platform: PlatformName,
    pub declared: OsVersion,
    pub effective: OsVersion,
    /// Dependency that imposed the higher minimum
    pub required_by: String,
}

/// Effective platform requirements of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePlatforms {
    pub platforms: Vec<Platform>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub raised: Vec<RaisedFloor>,
}

impl EffectivePlatforms {
    /// Minimum version for `name`, if the target runs there at all.
    pub fn minimum(&self, name: PlatformName) -> Option<&OsVersion> {
        self.platforms
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.version)
    }
}

/// Collect a declaration list, rejecting same-platform contradictions.
pub fn declared_set(owner: &str, package: &str, list: &[Platform]) -> Result<PlatformSet, ResolveError> {
    let mut set = PlatformSet::new();

    for platform in list {
        if let Some(existing) = set.get(&platform.name) {
            if existing != &platform.version {
                return Err(ResolveError::PlatformConflict {
                    target: owner.to_string(),
                    platform: platform.name.to_string(),
                    first: existing.to_string(),
                    second: platform.version.to_string(),
                });
            }
            return Err(ResolveError::malformed(
                package,
                format!(
                    "platform {} is declared more than once for `{}`",
                    platform.name, owner
                ),
            ));
        }
        set.insert(platform.name, platform.version.clone());
    }

    Ok(set)
}

/// Compute effective platforms for every target in the graph.
pub fn validate(graph: &TargetGraph) -> Result<BTreeMap<String, EffectivePlatforms>, ResolveError> {
    let mut package_sets: BTreeMap<&str, PlatformSet> = BTreeMap::new();
    let mut effective: BTreeMap<String, PlatformSet> = BTreeMap::new();
    let mut result = BTreeMap::new();

    for node in graph.topological_order() {
        if !package_sets.contains_key(node.package.as_str()) {
            let manifest = graph.package(&node.package).ok_or_else(|| {
                ResolveError::malformed(&node.package, "package is missing from the graph")
            })?;
            let set = declared_set(&node.package, &node.package, &manifest.platforms)?;
            package_sets.insert(node.package.as_str(), set);
        }

        let declared = declared_for(node, &package_sets[node.package.as_str()])?;
        let mut current = declared.clone();
        let mut raised: BTreeMap<PlatformName, RaisedFloor> = BTreeMap::new();

        for dep in graph.dependencies(node.name()) {
            let Some(required) = effective.get(dep) else {
                continue;
            };

            for (platform, version) in required {
                if current.get(platform).map_or(true, |have| version > have) {
                    current.insert(*platform, version.clone());
                }

                let Some(own) = declared.get(platform) else {
                    continue;
                };
                // One note per platform, naming the first dependency at the final value.
                let higher = raised.get(platform).map_or(true, |r| version > &r.effective);
                if version > own && higher {
                    raised.insert(
                        *platform,
                        RaisedFloor {
                            platform: *platform,
                            declared: own.clone(),
                            effective: version.clone(),
                            required_by: dep.to_string(),
                        },
                    );
                }
            }
        }
        let raised: Vec<RaisedFloor> = raised.into_values().collect();

        for r in &raised {
            tracing::warn!(
                "`{}` requires {} {} because of `{}` (declared {})",
                node.name(),
                r.platform,
                r.effective,
                r.required_by,
                r.declared
            );
        }

        result.insert(
            node.name().to_string(),
            EffectivePlatforms {
                platforms: current
                    .iter()
                    .map(|(name, version)| Platform::new(*name, version.clone()))
                    .collect(),
                raised,
            },
        );
        effective.insert(node.name().to_string(), current);
    }

    Ok(result)
}

/// A target's own declaration: its package's list with overrides on top.
fn declared_for(node: &TargetNode, package: &PlatformSet) -> Result<PlatformSet, ResolveError> {
    let overrides = declared_set(node.name(), &node.package, &node.target.platforms)?;
    let mut set = package.clone();
    set.extend(overrides);
    Ok(set)
}
