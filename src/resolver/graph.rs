//! TargetGraph - the immutable target dependency graph.
//!
//! One node per target (local targets plus every target reachable from
//! the products a dependency exports), one edge per dependency edge,
//! pointing from the dependent to its dependency.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::core::{Manifest, Target, TargetDep};
use crate::resolver::errors::ResolveError;
use crate::sources::PackageLoader;

/// A target together with the package that declares it.
#[derive(Debug, Clone)]
pub struct TargetNode {
    /// Declaring package
    pub package: String,

    /// The target itself
    pub target: Target,
}

impl TargetNode {
    pub fn name(&self) -> &str {
        &self.target.name
    }
}

/// The validated, acyclic target graph.
#[derive(Debug, Clone)]
pub struct TargetGraph {
    /// Target graph; an edge `a -> b` means `a` depends on `b`
    graph: DiGraph<TargetNode, ()>,

    /// Map from target name to node index
    by_name: HashMap<String, NodeIndex>,

    /// Manifests of every package contributing a node, by name
    packages: HashMap<String, Manifest>,

    /// Name of the root package
    root: String,

    /// Dependencies-first order, computed once the graph is known to be acyclic
    order: Vec<NodeIndex>,
}

impl TargetGraph {
    /// Build the graph for `root`, loading dependency packages via `loader`.
    pub fn build(root: &Manifest, loader: &mut dyn PackageLoader) -> Result<Self, ResolveError> {
        let mut builder = GraphBuilder {
            graph: DiGraph::new(),
            by_name: HashMap::new(),
            packages: HashMap::new(),
            pending: Vec::new(),
            loader,
        };

        builder.packages.insert(root.name().to_string(), root.clone());
        for target in &root.targets {
            builder.add_node(root.name(), target)?;
        }

        // Exported targets join the graph even when no local edge names them,
        // so name collisions with the root package always surface.
        for dependency in &root.dependencies {
            for product in dependency.products() {
                builder.product_targets(root.name(), root.name(), dependency.name(), product)?;
            }
        }

        while let Some(node) = builder.pending.pop() {
            builder.connect(node)?;
        }

        let GraphBuilder {
            graph,
            by_name,
            packages,
            ..
        } = builder;

        if let Some(cycle) = find_cycle(&graph) {
            let cycle: Vec<String> = cycle.iter().map(|&n| graph[n].name().to_string()).collect();
            return Err(ResolveError::CyclicDependency { cycle });
        }

        let mut order = toposort(&graph, None).map_err(|c| ResolveError::CyclicDependency {
            cycle: vec![graph[c.node_id()].name().to_string()],
        })?;
        // Edges point at dependencies, so reverse to build dependencies first.
        order.reverse();

        tracing::debug!(
            "Built target graph: {} targets, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(TargetGraph {
            graph,
            by_name,
            packages,
            root: root.name().to_string(),
            order,
        })
    }

    /// Targets in topological order (dependencies before dependents).
    pub fn topological_order(&self) -> impl Iterator<Item = &TargetNode> + '_ {
        self.order.iter().map(|&n| &self.graph[n])
    }

    /// Look up a node by target name.
    pub fn node(&self, name: &str) -> Option<&TargetNode> {
        self.by_name.get(name).map(|&n| &self.graph[n])
    }

    /// Check if a target is in the graph.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Direct dependencies of a target, sorted by name.
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Targets that depend directly on the given target, sorted by name.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, dir: Direction) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .by_name
            .get(name)
            .map(|&n| {
                self.graph
                    .neighbors_directed(n, dir)
                    .map(|m| self.graph[m].name())
                    .collect()
            })
            .unwrap_or_default();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// The given targets plus everything they transitively depend on.
    ///
    /// Unknown names are skipped; callers check membership first.
    pub fn closure<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        let mut stack: Vec<NodeIndex> = names
            .into_iter()
            .filter_map(|n| self.by_name.get(n).copied())
            .collect();

        while let Some(current) = stack.pop() {
            if visited.insert(self.graph[current].name().to_string()) {
                stack.extend(self.graph.neighbors(current));
            }
        }

        visited
    }

    /// Manifest of a package contributing to the graph.
    pub fn package(&self, name: &str) -> Option<&Manifest> {
        self.packages.get(name)
    }

    /// The root package's manifest.
    pub fn root_package(&self) -> &Manifest {
        &self.packages[&self.root]
    }

    /// Root directory of the package declaring `node`.
    pub fn package_root(&self, node: &TargetNode) -> &Path {
        self.packages
            .get(&node.package)
            .map(|m| m.manifest_dir.as_path())
            .unwrap_or(Path::new("."))
    }

    /// All nodes, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &TargetNode> + '_ {
        self.graph.node_weights()
    }

    /// Get the number of targets.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

struct GraphBuilder<'l> {
    graph: DiGraph<TargetNode, ()>,
    by_name: HashMap<String, NodeIndex>,
    packages: HashMap<String, Manifest>,
    pending: Vec<NodeIndex>,
    loader: &'l mut dyn PackageLoader,
}

impl GraphBuilder<'_> {
    /// Add a node, or return the existing one for the same package.
    fn add_node(&mut self, package: &str, target: &Target) -> Result<NodeIndex, ResolveError> {
        if let Some(&existing) = self.by_name.get(&target.name) {
            let owner = &self.graph[existing].package;
            if owner != package {
                return Err(ResolveError::malformed(
                    package,
                    format!(
                        "target `{}` collides with the target of the same name in package `{}`",
                        target.name, owner
                    ),
                ));
            }
            return Ok(existing);
        }

        let node = self.graph.add_node(TargetNode {
            package: package.to_string(),
            target: target.clone(),
        });
        self.by_name.insert(target.name.clone(), node);
        self.pending.push(node);
        Ok(node)
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Resolve every outgoing edge of `node`.
    fn connect(&mut self, node: NodeIndex) -> Result<(), ResolveError> {
        let package = self.graph[node].package.clone();
        let from = self.graph[node].name().to_string();
        let deps = self.graph[node].target.deps().to_vec();

        for dep in deps {
            let targets = self.resolve_dep(&package, &from, &dep)?;
            for target in targets {
                self.add_edge(node, target);
            }
        }

        Ok(())
    }

    fn resolve_dep(
        &mut self,
        package: &str,
        from: &str,
        dep: &TargetDep,
    ) -> Result<Vec<NodeIndex>, ResolveError> {
        let dangling = || ResolveError::DanglingReference {
            from: from.to_string(),
            reference: dep.reference(),
        };

        match dep {
            TargetDep::Target { name } => self.local_target(package, name)?.ok_or_else(dangling),
            TargetDep::ByName { name } => {
                if let Some(local) = self.local_target(package, name)? {
                    return Ok(local);
                }

                // Fall back to a same-named product of exactly one dependency.
                let manifest = &self.packages[package];
                let exporters: Vec<String> = manifest
                    .dependencies
                    .iter()
                    .filter(|d| d.exports(name))
                    .map(|d| d.name().to_string())
                    .collect();

                match exporters.as_slice() {
                    [] => Err(dangling()),
                    [only] => self.product_targets(package, from, only, name),
                    _ => Err(ResolveError::malformed(
                        package,
                        format!(
                            "`{}` in target `{}` is ambiguous: exported by {}",
                            name,
                            from,
                            exporters.join(", ")
                        ),
                    )),
                }
            }
            TargetDep::Product {
                package: dep_pkg,
                product,
            } => self.product_targets(package, from, dep_pkg, product),
        }
    }

    /// Node for a target declared by `package` itself, added on first use.
    fn local_target(
        &mut self,
        package: &str,
        name: &str,
    ) -> Result<Option<Vec<NodeIndex>>, ResolveError> {
        let target = match self.packages[package].target(name) {
            Some(t) => t.clone(),
            None => return Ok(None),
        };
        Ok(Some(vec![self.add_node(package, &target)?]))
    }

    /// Nodes for every target of `product`, exported by dependency `dep_pkg`
    /// of `package`.
    fn product_targets(
        &mut self,
        package: &str,
        from: &str,
        dep_pkg: &str,
        product: &str,
    ) -> Result<Vec<NodeIndex>, ResolveError> {
        let dangling = || ResolveError::DanglingReference {
            from: from.to_string(),
            reference: format!("{}/{}", dep_pkg, product),
        };

        let parent = &self.packages[package];
        let dependency = match parent.dependency(dep_pkg) {
            Some(d) if d.exports(product) => d.clone(),
            _ => return Err(dangling()),
        };

        if !self.packages.contains_key(dep_pkg) {
            let parent = parent.clone();
            let manifest = self.loader.load(&parent, &dependency)?;
            self.packages.insert(dep_pkg.to_string(), manifest);
        }

        let manifest = &self.packages[dep_pkg];
        let targets: Vec<Target> = {
            let declared = manifest.product(product).ok_or_else(dangling)?;
            declared
                .targets
                .iter()
                .map(|t| manifest.target(t).cloned().ok_or_else(dangling))
                .collect::<Result<_, _>>()?
        };

        targets
            .iter()
            .map(|t| self.add_node(dep_pkg, t))
            .collect()
    }
}

/// Find a cycle with a depth-first search, returning the path that closes it
/// (first and last element are the same node).
fn find_cycle(graph: &DiGraph<TargetNode, ()>) -> Option<Vec<NodeIndex>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }

    fn visit(
        graph: &DiGraph<TargetNode, ()>,
        node: NodeIndex,
        marks: &mut [Mark],
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        marks[node.index()] = Mark::OnStack;
        path.push(node);

        let mut next: Vec<NodeIndex> = graph.neighbors(node).collect();
        next.sort_unstable();

        for succ in next {
            match marks[succ.index()] {
                Mark::OnStack => {
                    let start = path.iter().position(|&n| n == succ).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(succ);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(graph, succ, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        path.pop();
        marks[node.index()] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; graph.node_count()];
    let mut path = Vec::new();

    for node in graph.node_indices() {
        if marks[node.index()] == Mark::Unvisited {
            if let Some(cycle) = visit(graph, node, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::Provisioning;
    use crate::core::{Dependency, Product};
    use crate::sources::PathLoader;

    fn by_name(name: &str) -> TargetDep {
        TargetDep::ByName { name: name.into() }
    }

    fn kit() -> Manifest {
        Manifest::new("Kit", "/kit")
            .with_target(Target::resource("Bundle", "Resources"))
            .with_target(Target::binary(
                "Core",
                Provisioning::Local {
                    path: "core.zip".into(),
                },
            ))
            .with_target(Target::source("Lib").with_deps([by_name("Bundle"), by_name("Core")]))
            .with_product(Product::library("Kit", ["Lib"]))
    }

    fn position(graph: &TargetGraph, name: &str) -> usize {
        graph
            .topological_order()
            .position(|n| n.name() == name)
            .unwrap()
    }

    #[test]
    fn test_dependencies_come_first() {
        let graph = TargetGraph::build(&kit(), &mut PathLoader::new()).unwrap();

        assert_eq!(graph.len(), 3);
        assert!(position(&graph, "Bundle") < position(&graph, "Lib"));
        assert!(position(&graph, "Core") < position(&graph, "Lib"));
        assert_eq!(graph.dependencies("Lib"), vec!["Bundle", "Core"]);
        assert_eq!(graph.dependents("Core"), vec!["Lib"]);
    }

    #[test]
    fn test_chain_order() {
        let m = Manifest::new("P", "/p")
            .with_target(Target::source("A").with_deps([by_name("B")]))
            .with_target(Target::source("B").with_deps([by_name("C")]))
            .with_target(Target::source("C"))
            .with_product(Product::library("P", ["A"]));
        let graph = TargetGraph::build(&m, &mut PathLoader::new()).unwrap();

        let order: Vec<&str> = graph.topological_order().map(|n| n.name()).collect();
        assert_eq!(order, vec!["C", "B", "A"]);
    }

    #[test]
    fn test_dangling_reference() {
        let m = Manifest::new("P", "/p")
            .with_target(Target::source("A").with_deps([by_name("Missing")]))
            .with_product(Product::library("P", ["A"]));
        let err = TargetGraph::build(&m, &mut PathLoader::new()).unwrap_err();

        assert!(matches!(
            err,
            ResolveError::DanglingReference { ref from, ref reference }
                if from == "A" && reference == "Missing"
        ));
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let m = Manifest::new("P", "/p")
            .with_target(Target::source("A").with_deps([by_name("B")]))
            .with_target(Target::source("B").with_deps([by_name("C")]))
            .with_target(Target::source("C").with_deps([by_name("A")]))
            .with_product(Product::library("P", ["A"]));
        let err = TargetGraph::build(&m, &mut PathLoader::new()).unwrap_err();

        match err {
            ResolveError::CyclicDependency { cycle } => {
                assert_eq!(cycle.len(), 4);
                assert_eq!(cycle.first(), cycle.last());
                for name in ["A", "B", "C"] {
                    assert!(cycle.iter().any(|c| c == name));
                }
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let m = Manifest::new("P", "/p")
            .with_target(Target::source("A").with_deps([by_name("A")]))
            .with_product(Product::library("P", ["A"]));
        let err = TargetGraph::build(&m, &mut PathLoader::new()).unwrap_err();
        assert!(matches!(err, ResolveError::CyclicDependency { ref cycle } if cycle == &["A", "A"]));
    }

    #[test]
    fn test_adding_cyclic_edge_to_valid_graph() {
        let mut m = kit();
        assert!(TargetGraph::build(&m, &mut PathLoader::new()).is_ok());

        // Bundle -> Lib closes Lib -> Bundle.
        let bundle = m.targets.iter_mut().find(|t| t.name == "Bundle").unwrap();
        *bundle = bundle.clone().with_deps([by_name("Lib")]);

        let err = TargetGraph::build(&m, &mut PathLoader::new()).unwrap_err();
        assert!(matches!(err, ResolveError::CyclicDependency { .. }));
    }

    #[test]
    fn test_closure() {
        let graph = TargetGraph::build(&kit(), &mut PathLoader::new()).unwrap();
        let closure: Vec<String> = graph.closure(["Lib"]).into_iter().collect();
        assert_eq!(closure, vec!["Bundle", "Core", "Lib"]);

        let closure = graph.closure(["Core"]);
        assert_eq!(closure.len(), 1);
    }

    mod with_dependencies {
        use super::*;
        use crate::core::manifest::MANIFEST_NAME;
        use tempfile::TempDir;

        fn write_codec(dir: &Path) {
            std::fs::create_dir_all(dir).unwrap();
            std::fs::write(
                dir.join(MANIFEST_NAME),
                r#"
[package]
name = "Codec"

[[products]]
name = "Opus"
targets = ["OpusKit"]

[[products]]
name = "Internal"
targets = ["Hidden"]

[[targets]]
name = "OpusKit"
dependencies = ["OpusBinary"]

[[targets]]
name = "OpusBinary"
kind = "binary"
path = "opus.xcframework"

[[targets]]
name = "Hidden"
"#,
            )
            .unwrap();
        }

        fn app(root: &Path, deps: Vec<TargetDep>, exported: &[&str]) -> Manifest {
            Manifest::new("App", root)
                .with_target(Target::source("App").with_deps(deps))
                .with_product(Product::library("App", ["App"]))
                .with_dependency(Dependency::path("Codec", "codec").with_products(exported.to_vec()))
        }

        #[test]
        fn test_exported_targets_are_pulled_in() {
            let tmp = TempDir::new().unwrap();
            write_codec(&tmp.path().join("codec"));

            let m = app(
                tmp.path(),
                vec![TargetDep::Product {
                    package: "Codec".into(),
                    product: "Opus".into(),
                }],
                &["Opus"],
            );
            let graph = TargetGraph::build(&m, &mut PathLoader::new()).unwrap();

            assert_eq!(graph.len(), 3);
            assert!(!graph.contains("Hidden"));
            assert_eq!(graph.node("OpusBinary").unwrap().package, "Codec");
            assert!(position(&graph, "OpusBinary") < position(&graph, "OpusKit"));
            assert!(position(&graph, "OpusKit") < position(&graph, "App"));
            assert_eq!(graph.package_root(graph.node("OpusKit").unwrap()), tmp.path().join("codec"));
        }

        #[test]
        fn test_by_name_falls_back_to_product() {
            let tmp = TempDir::new().unwrap();
            write_codec(&tmp.path().join("codec"));

            let m = app(tmp.path(), vec![by_name("Opus")], &["Opus"]);
            let graph = TargetGraph::build(&m, &mut PathLoader::new()).unwrap();
            assert_eq!(graph.dependencies("App"), vec!["OpusKit"]);
        }

        #[test]
        fn test_unexported_product_is_dangling() {
            let tmp = TempDir::new().unwrap();
            write_codec(&tmp.path().join("codec"));

            let m = app(
                tmp.path(),
                vec![TargetDep::Product {
                    package: "Codec".into(),
                    product: "Internal".into(),
                }],
                &["Opus"],
            );
            let err = TargetGraph::build(&m, &mut PathLoader::new()).unwrap_err();
            assert!(matches!(
                err,
                ResolveError::DanglingReference { ref reference, .. } if reference == "Codec/Internal"
            ));
        }

        #[test]
        fn test_name_collision_across_packages() {
            let tmp = TempDir::new().unwrap();
            write_codec(&tmp.path().join("codec"));

            let m = Manifest::new("App", tmp.path())
                .with_target(Target::source("OpusKit"))
                .with_target(Target::source("App").with_deps([TargetDep::Product {
                    package: "Codec".into(),
                    product: "Opus".into(),
                }]))
                .with_product(Product::library("App", ["App"]))
                .with_dependency(Dependency::path("Codec", "codec").with_products(["Opus"]));

            let err = TargetGraph::build(&m, &mut PathLoader::new()).unwrap_err();
            assert!(err.to_string().contains("collides"));
        }

        #[test]
        fn test_collision_with_unreferenced_export() {
            let tmp = TempDir::new().unwrap();
            write_codec(&tmp.path().join("codec"));

            let m = Manifest::new("App", tmp.path())
                .with_target(Target::source("OpusKit"))
                .with_product(Product::library("App", ["OpusKit"]))
                .with_dependency(Dependency::path("Codec", "codec").with_products(["Opus"]));

            let err = TargetGraph::build(&m, &mut PathLoader::new()).unwrap_err();
            assert!(matches!(err, ResolveError::MalformedManifest { .. }));
            assert!(err.to_string().contains("collides"));
        }

        #[test]
        fn test_exports_join_graph_without_edges() {
            let tmp = TempDir::new().unwrap();
            write_codec(&tmp.path().join("codec"));

            let m = app(tmp.path(), Vec::new(), &["Opus"]);
            let graph = TargetGraph::build(&m, &mut PathLoader::new()).unwrap();

            assert!(graph.contains("OpusKit"));
            assert!(graph.contains("OpusBinary"));
            assert!(!graph.contains("Hidden"));
            assert!(graph.dependencies("App").is_empty());
        }
    }
}
