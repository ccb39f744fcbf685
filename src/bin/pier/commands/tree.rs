//! `pier tree` command

use std::collections::HashSet;

use anyhow::{bail, Result};

use crate::cli::{GlobalArgs, TreeArgs};
use pier::ops;
use pier::sources::PathLoader;
use pier::TargetGraph;

pub fn execute(global: &GlobalArgs, args: TreeArgs) -> Result<()> {
    let package = super::load_package(global)?;
    let (graph, _) = ops::validate_structure(&package.manifest, &mut PathLoader::new())?;

    let roots: Vec<String> = match &args.target {
        Some(target) => {
            if !graph.contains(target) {
                bail!("target `{}` is not in the graph of {}", target, package.manifest.name());
            }
            vec![target.clone()]
        }
        None if args.invert => graph
            .topological_order()
            .filter(|n| graph.dependencies(n.name()).is_empty())
            .map(|n| n.name().to_string())
            .collect(),
        None => graph
            .root_package()
            .products
            .iter()
            .flat_map(|p| p.targets.iter().cloned())
            .collect(),
    };

    let max_depth = args.depth.unwrap_or(usize::MAX);
    for root in &roots {
        let mut seen = HashSet::new();
        print_tree(&graph, root, 0, max_depth, args.invert, &mut seen);
    }

    Ok(())
}

fn print_tree(
    graph: &TargetGraph,
    name: &str,
    depth: usize,
    max_depth: usize,
    invert: bool,
    seen: &mut HashSet<String>,
) {
    if depth > max_depth {
        return;
    }

    let prefix = if depth == 0 {
        String::new()
    } else {
        format!("{}├── ", "│   ".repeat(depth - 1))
    };

    let Some(node) = graph.node(name) else {
        return;
    };

    let is_duplicate = !seen.insert(name.to_string());
    let package = if node.package == graph.root_package().name() {
        String::new()
    } else {
        format!(" [{}]", node.package)
    };

    println!(
        "{}{} ({}){}{}",
        prefix,
        name,
        node.target.kind_str(),
        package,
        if is_duplicate { " (*)" } else { "" }
    );

    if is_duplicate {
        return;
    }

    let next = if invert {
        graph.dependents(name)
    } else {
        graph.dependencies(name)
    };
    for child in next {
        print_tree(graph, child, depth + 1, max_depth, invert, seen);
    }
}
