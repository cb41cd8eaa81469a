//! CLI command definitions for envdict
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod render;

use clap::{Parser, Subcommand};
use render::{KeysArgs, RenderArgs};
use std::path::PathBuf;

/// Load, expand and inspect env files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    pub fn log_target(&self) -> LogTarget {
        LogTarget::parse(&self.log)
    }
}

/// Destination of log output, from `--log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Off,
    Stdout,
    Stderr,
    /// Append to a file, without ANSI colors
    File(PathBuf),
}

impl LogTarget {
    pub fn parse(value: &str) -> Self {
        match value {
            "0" | "off" => LogTarget::Off,
            "1" | "stdout" => LogTarget::Stdout,
            "2" | "stderr" => LogTarget::Stderr,
            filename => LogTarget::File(PathBuf::from(filename)),
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the expanded env (default if no subcommand given)
    Render(RenderArgs),

    /// List every key of the env, at every depth
    Keys(KeysArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_target_parse() {
        assert_eq!(LogTarget::parse("0"), LogTarget::Off);
        assert_eq!(LogTarget::parse("off"), LogTarget::Off);
        assert_eq!(LogTarget::parse("1"), LogTarget::Stdout);
        assert_eq!(LogTarget::parse("stderr"), LogTarget::Stderr);
        assert_eq!(
            LogTarget::parse("envdict.log"),
            LogTarget::File(PathBuf::from("envdict.log"))
        );
    }

    #[test]
    fn test_default_log_is_stderr() {
        let cli = Cli::parse_from(["envdict"]);
        assert_eq!(cli.log_target(), LogTarget::Stderr);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_render_flags() {
        let cli = Cli::parse_from([
            "envdict", "-v", "render", "--set", "env__a=1", "--key", "a", "--format", "json",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Some(Command::Render(args)) => {
                assert_eq!(args.source.set, vec!["env__a=1".to_string()]);
                assert_eq!(args.key.as_deref(), Some("a"));
                assert_eq!(args.format, render::OutputFormat::Json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
