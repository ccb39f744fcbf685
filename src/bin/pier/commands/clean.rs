//! `pier clean` command

use anyhow::Result;

use crate::cli::{CleanArgs, GlobalArgs};
use pier::ops;

pub fn execute(global: &GlobalArgs, args: CleanArgs) -> Result<()> {
    let package = super::load_package(global)?;
    let cache_dir = package.cache_dir();

    if args.dry_run {
        eprintln!("Would remove {}", cache_dir.display());
        return Ok(());
    }

    let result = ops::clean(&cache_dir)?;
    if result.existed {
        eprintln!(
            "     Removed {} ({} bytes)",
            result.path.display(),
            result.bytes
        );
    } else {
        eprintln!("     Nothing to clean at {}", result.path.display());
    }

    Ok(())
}
