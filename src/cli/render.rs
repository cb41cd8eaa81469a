//! Render and keys subcommands for envdict CLI
//!
//! Both load an env the same way the library does (explicit file or
//! discovery), apply `env__a__b=value` overrides, and print the result.

use crate::decorators::OverridePath;
use crate::env_dict::{EnvDict, Override};
use crate::node::Node;
use crate::source::EnvSource;
use crate::validate::collect_keys;
use anyhow::{Result, anyhow};
use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// Output format for rendered values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Dictionary literal, as `Display` prints it (default)
    #[default]
    Repr,
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
}

impl OutputFormat {
    pub fn render(self, node: &Node) -> Result<String> {
        Ok(match self {
            OutputFormat::Repr => node.to_string(),
            OutputFormat::Json => serde_json::to_string_pretty(&node.to_json())?,
            OutputFormat::Yaml => serde_yaml::to_string(&node.to_json())?
                .trim_end()
                .to_string(),
        })
    }
}

/// Where to load the env from, and what to override.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Env file to load (default: discover env.<hostname>.yaml or env.yaml)
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Discover a file with this exact name instead of the default candidates
    #[arg(short, long, value_name = "NAME", conflicts_with = "file")]
    pub name: Option<String>,

    /// Directory discovery starts from (default: current directory)
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// How many parent directories discovery may visit
    #[arg(long, value_name = "N")]
    pub levels: Option<usize>,

    /// Override a value, e.g. --set env__db__port=5433 (repeatable)
    #[arg(short, long = "set", value_name = "env__KEY=VALUE")]
    pub set: Vec<String>,
}

impl SourceArgs {
    /// Build the env and apply overrides.
    pub fn load(&self) -> Result<EnvDict> {
        let mut builder = EnvDict::builder();
        if let Some(ref dir) = self.dir {
            builder = builder.start_dir(dir.clone());
        }
        if let Some(levels) = self.levels {
            builder = builder.search_levels(levels);
        }
        builder = match self.file {
            Some(ref file) => builder.source(EnvSource::File(file.clone())),
            None => builder.source(EnvSource::Discover(self.name.clone())),
        };

        let env = builder.build()?;
        let overrides = self.overrides()?;
        if overrides.is_empty() {
            return Ok(env);
        }
        Ok(env.with_overrides(overrides)?)
    }

    /// Parse every `--set` argument.
    pub fn overrides(&self) -> Result<Vec<Override>> {
        self.set.iter().map(|s| parse_override(s)).collect()
    }
}

/// Arguments for the render subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct RenderArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Only print the value at this dotted path
    #[arg(short, long, value_name = "PATH")]
    pub key: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Repr)]
    pub format: OutputFormat,
}

impl RenderArgs {
    pub fn run(&self) -> Result<String> {
        let env = self.source.load()?;
        let node = match self.key {
            Some(ref key) => env.lookup(key)?,
            None => env.as_node(),
        };
        self.format.render(node)
    }
}

/// Arguments for the keys subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct KeysArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

impl KeysArgs {
    pub fn run(&self) -> Result<String> {
        let env = self.source.load()?;
        Ok(collect_keys(env.as_node()).join("\n"))
    }
}

/// Parse `env__a__b=value`. The value is read as a YAML scalar.
fn parse_override(arg: &str) -> Result<Override> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid override '{}': expected env__KEY=VALUE", arg))?;
    let path = OverridePath::parse(name.trim())
        .ok_or_else(|| anyhow!("Invalid override '{}': name must start with env__", arg))?;
    Ok(path.into_override(Node::parse_scalar(value)))
}
