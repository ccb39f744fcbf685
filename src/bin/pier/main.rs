//! Pier CLI - resolve packages that ship precompiled binaries

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use miette::{GraphicalReportHandler, GraphicalTheme};
use tracing_subscriber::EnvFilter;

use pier::ResolveError;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        report(&e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("pier=debug")
    } else {
        EnvFilter::new("pier=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    // Execute command
    match cli.command {
        Commands::Resolve(args) => commands::resolve::execute(&cli.global, args),
        Commands::Tree(args) => commands::tree::execute(&cli.global, args),
        Commands::Fetch(args) => commands::fetch::execute(&cli.global, args),
        Commands::Clean(args) => commands::clean::execute(&cli.global, args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Print an error, rendering resolution failures as diagnostics.
fn report(err: &anyhow::Error) {
    if let Some(resolve_err) = err.downcast_ref::<ResolveError>() {
        let theme = if std::io::stderr().is_terminal() {
            GraphicalTheme::unicode()
        } else {
            GraphicalTheme::unicode_nocolor()
        };
        let mut out = String::new();
        if GraphicalReportHandler::new_themed(theme)
            .render_report(&mut out, resolve_err)
            .is_ok()
        {
            eprint!("{}", out);
            return;
        }
    }
    eprintln!("error: {:#}", err);
}
