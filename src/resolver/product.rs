//! Product composition.
//!
//! A product is satisfied by the transitive closure of the targets it
//! lists. Composition runs last, once every binary in the graph has a
//! verified artifact.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::core::product::{Product, ProductKind};
use crate::resolver::errors::ResolveError;
use crate::resolver::graph::TargetGraph;
use crate::sources::artifact::Artifact;

/// A product with its full target set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposedProduct {
    pub name: String,
    pub kind: ProductKind,
    /// Targets as listed in the manifest
    pub targets: Vec<String>,
    /// Listed targets and everything they depend on, dependencies first
    pub closure: Vec<String>,
    /// Binary targets in the closure
    pub binaries: Vec<String>,
    /// Some binary in the closure has no resolved artifact
    #[serde(skip)]
    pub has_pending_binary: bool,
}

impl ComposedProduct {
    pub fn contains(&self, target: &str) -> bool {
        self.closure.iter().any(|t| t == target)
    }
}

/// Compose every product of the root package.
pub fn compose(
    graph: &TargetGraph,
    artifacts: &BTreeMap<String, Artifact>,
) -> Result<Vec<ComposedProduct>, ResolveError> {
    graph
        .root_package()
        .products
        .iter()
        .map(|p| compose_one(graph, artifacts, p))
        .collect()
}

fn compose_one(
    graph: &TargetGraph,
    artifacts: &BTreeMap<String, Artifact>,
    product: &Product,
) -> Result<ComposedProduct, ResolveError> {
    let unsatisfiable = |reason: String| ResolveError::UnsatisfiableProduct {
        product: product.name.clone(),
        reason,
    };

    if product.targets.is_empty() {
        return Err(unsatisfiable("it lists no targets".into()));
    }

    let root = graph.root_package().name();
    for name in &product.targets {
        let Some(node) = graph.node(name) else {
            return Err(unsatisfiable(format!("target `{}` does not exist", name)));
        };
        if node.package != root {
            return Err(unsatisfiable(format!(
                "target `{}` belongs to package `{}`, not `{}`",
                name, node.package, root
            )));
        }
    }

    let members: BTreeSet<String> = graph.closure(product.targets.iter().map(String::as_str));
    let closure: Vec<String> = graph
        .topological_order()
        .filter(|n| members.contains(n.name()))
        .map(|n| n.name().to_string())
        .collect();

    let binaries: Vec<String> = graph
        .topological_order()
        .filter(|n| members.contains(n.name()) && n.target.is_binary())
        .map(|n| n.name().to_string())
        .collect();

    let has_pending_binary = binaries.iter().any(|b| !artifacts.contains_key(b));

    tracing::debug!(
        "Product {} closes over {} target(s)",
        product.name,
        closure.len()
    );

    Ok(ComposedProduct {
        name: product.name.clone(),
        kind: product.kind,
        targets: product.targets.clone(),
        closure,
        binaries,
        has_pending_binary,
    })
}
