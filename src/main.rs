//! envdict CLI
//!
//! Loads an env file (explicit or discovered), applies overrides and prints it.

use anyhow::Result;
use clap::Parser;
use envdict::cli::render::RenderArgs;
use envdict::cli::{Cli, Command, LogTarget};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Install the global subscriber for `--log` and `--verbose`.
fn init_logging(target: LogTarget, verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let (writer, ansi) = match target {
        LogTarget::Off => return Ok(()),
        LogTarget::Stdout => (BoxMakeWriter::new(std::io::stdout), true),
        LogTarget::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(writer)
        .with_ansi(ansi)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_target(), cli.verbose)?;

    let command = cli
        .command
        .unwrap_or_else(|| Command::Render(RenderArgs::default()));
    debug!(?command, "Running command");

    let output = match command {
        Command::Render(args) => args.run()?,
        Command::Keys(args) => args.run()?,
    };
    println!("{}", output);
    Ok(())
}
