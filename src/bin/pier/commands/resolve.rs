//! `pier resolve` command

use anyhow::Result;

use crate::cli::{GlobalArgs, ResolveArgs};
use pier::ops;
use pier::sources::artifact::ArtifactOrigin;
use pier::sources::PathLoader;
use pier::ResolvedPackage;

pub fn execute(global: &GlobalArgs, args: ResolveArgs) -> Result<()> {
    let mut package = super::load_package(global)?;
    package.apply_net_args(&args.net);

    let resolved = package.with_session(|session| {
        ops::resolve(&package.manifest, &mut PathLoader::new(), session)
    })?;

    if args.json {
        println!("{}", resolved.to_json()?);
    } else {
        print_summary(&resolved);
    }

    Ok(())
}

fn print_summary(resolved: &ResolvedPackage) {
    let width = resolved.order().map(str::len).max().unwrap_or(0);

    println!("{}", resolved.name());
    for target in resolved.targets() {
        let platforms: Vec<String> = target
            .platforms
            .platforms
            .iter()
            .map(|p| p.to_string())
            .collect();

        let mut line = format!(
            "  {:<width$}  {:<8}  {}",
            target.name,
            target.kind,
            platforms.join(", "),
            width = width
        );

        if let Some(artifact) = &target.artifact {
            let short = artifact.checksum.get(..12).unwrap_or(&artifact.checksum);
            line.push_str(&format!("  {}:{}", artifact.algorithm, short));
            if let ArtifactOrigin::Remote { .. } = artifact.origin {
                line.push_str(if artifact.from_cache { " (cached)" } else { " (downloaded)" });
            }
        }

        if let Some(bundle) = &target.bundle {
            let processed = target.resources.iter().filter(|r| r.needs_processing).count();
            line.push_str(&format!(
                "  {} ({} resources, {} to process)",
                bundle,
                target.resources.len(),
                processed
            ));
        }

        println!("{}", line.trim_end());
    }

    for product in resolved.products() {
        println!("  product {}: {}", product.name, product.closure.join(", "));
    }
}
