//! `pier fetch` command

use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::{FetchArgs, GlobalArgs};
use pier::ops;
use pier::sources::PathLoader;

pub fn execute(global: &GlobalArgs, args: FetchArgs) -> Result<()> {
    let mut package = super::load_package(global)?;
    package.apply_net_args(&args.net);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Fetching artifacts for {}", package.manifest.name()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = package.with_session(|session| {
        ops::fetch_artifacts(&package.manifest, &mut PathLoader::new(), session)
    });
    spinner.finish_and_clear();

    let artifacts = result?;
    for artifact in &artifacts {
        eprintln!(
            "    Verified {} ({}:{})",
            artifact.target,
            artifact.algorithm,
            artifact.checksum.get(..12).unwrap_or(&artifact.checksum)
        );
    }
    eprintln!("     Fetched {} artifact(s)", artifacts.len());

    Ok(())
}
