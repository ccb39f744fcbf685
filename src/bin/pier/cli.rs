//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Pier - resolve packages that ship precompiled binaries
#[derive(Parser)]
#[command(name = "pier")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args, Clone, Debug)]
pub struct GlobalArgs {
    /// Path to Pier.toml (defaults to searching upward from the current directory)
    #[arg(long, global = true, env = "PIER_MANIFEST_PATH")]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the package: graph, platforms, artifacts, resources and products
    Resolve(ResolveArgs),

    /// Display the target graph
    Tree(TreeArgs),

    /// Download and verify binary artifacts only
    Fetch(FetchArgs),

    /// Remove the artifact cache
    Clean(CleanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Options controlling artifact downloads.
#[derive(Args, Clone, Debug)]
pub struct NetArgs {
    /// Number of concurrent workers
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Use only cached artifacts
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Print the resolved package as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub net: NetArgs,
}

#[derive(Args)]
pub struct TreeArgs {
    /// Target to show the tree for (defaults to every product)
    pub target: Option<String>,

    /// Maximum depth to display
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Show dependents instead of dependencies
    #[arg(short, long)]
    pub invert: bool,
}

#[derive(Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub net: NetArgs,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Print what would be removed without removing it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
