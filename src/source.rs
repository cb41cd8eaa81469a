//! Where an env comes from.
//!
//! - Discovery of env files by name, hostname and default name, walking up
//!   from a start directory
//! - YAML loading into a [`Node`] tree
//! - Env names derived from file names (`env.yaml` → `root`, `env.dev.yaml` → `dev`)
//! - Resolution of the `_module` key to a directory
//!
//! ## Environment Variables
//! - `ENVDICT_SEARCH_LEVELS` - How many parent directories discovery may visit (default: 6)
//! - `ENVDICT_MODULE_PATH` - Extra roots for `_module` lookup, `PATH`-style list

use crate::error::{EnvError, EnvResult};
use crate::node::{Node, NodeMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// File name used when no explicit name is given.
pub const DEFAULT_ENV_FILE: &str = "env.yaml";

/// Default number of parent directories searched during discovery.
pub const DEFAULT_SEARCH_LEVELS: usize = 6;

/// Placeholder accepted as the `_module` value to mean "the env file's directory".
pub const HERE_PLACEHOLDER: &str = "{{here}}";

/// Where an env is built from.
#[derive(Debug, Clone)]
pub enum EnvSource {
    /// An in-memory mapping.
    Map(Node),
    /// A file path. Bare file names that do not exist in the start directory
    /// are searched for like [`EnvSource::Discover`].
    File(PathBuf),
    /// Discover a file, optionally by explicit name.
    Discover(Option<String>),
}

impl From<Node> for EnvSource {
    fn from(node: Node) -> Self {
        EnvSource::Map(node)
    }
}

impl From<serde_json::Value> for EnvSource {
    fn from(value: serde_json::Value) -> Self {
        EnvSource::Map(Node::from(value))
    }
}

impl From<NodeMap> for EnvSource {
    fn from(map: NodeMap) -> Self {
        EnvSource::Map(Node::Map(map))
    }
}

impl From<PathBuf> for EnvSource {
    fn from(path: PathBuf) -> Self {
        EnvSource::File(path)
    }
}

impl From<&Path> for EnvSource {
    fn from(path: &Path) -> Self {
        EnvSource::File(path.to_path_buf())
    }
}

impl From<&str> for EnvSource {
    fn from(path: &str) -> Self {
        EnvSource::File(PathBuf::from(path))
    }
}

/// Directories visited during discovery.
#[derive(Debug, Clone)]
pub struct SearchPaths {
    /// First directory searched.
    pub start_dir: PathBuf,
    /// How many ancestors of `start_dir` are searched after it.
    pub levels: usize,
}

impl Default for SearchPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl SearchPaths {
    /// Search from the working directory, depth from `ENVDICT_SEARCH_LEVELS`.
    pub fn discover() -> Self {
        let start_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let levels = std::env::var("ENVDICT_SEARCH_LEVELS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_SEARCH_LEVELS);

        Self { start_dir, levels }
    }

    /// Search from an explicit directory with the default depth.
    pub fn from_dir(start_dir: impl Into<PathBuf>) -> Self {
        Self {
            start_dir: start_dir.into(),
            levels: DEFAULT_SEARCH_LEVELS,
        }
    }

    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels;
        self
    }

    /// The start directory followed by up to `levels` ancestors.
    pub fn dirs(&self) -> impl Iterator<Item = &Path> {
        self.start_dir.ancestors().take(self.levels + 1)
    }

    /// First directory containing a file called `name`.
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        self.dirs()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}

/// Name of this machine, if it can be determined.
pub fn hostname() -> Option<String> {
    if let Ok(name) = std::env::var("HOSTNAME") {
        let name = name.trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    if let Ok(name) = std::fs::read_to_string("/etc/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    let output = Command::new("hostname").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// File names tried during discovery, in order.
///
/// An explicit name is the only candidate. Otherwise `env.<hostname>.yaml`
/// is tried before `env.yaml`.
pub fn candidate_names(name: Option<&str>) -> Vec<String> {
    match name {
        Some(name) => vec![name.to_string()],
        None => {
            let mut names = Vec::new();
            if let Some(host) = hostname() {
                names.push(format!("env.{}.yaml", host));
            }
            names.push(DEFAULT_ENV_FILE.to_string());
            names
        }
    }
}

/// Find an env file. Each candidate name is searched through every directory
/// before moving on to the next name.
pub fn find_env_file(name: Option<&str>, search: &SearchPaths) -> EnvResult<PathBuf> {
    let names = candidate_names(name);

    for candidate in &names {
        if let Some(found) = search.find(candidate) {
            debug!(path = %found.display(), "Found env file");
            return Ok(found);
        }
    }

    Err(EnvError::Discovery {
        name: names
            .last()
            .cloned()
            .unwrap_or_else(|| DEFAULT_ENV_FILE.to_string()),
        levels: search.levels,
    })
}

/// Resolve a file source: existing paths are used as-is, bare names are discovered.
pub fn locate(path: &Path, search: &SearchPaths) -> EnvResult<PathBuf> {
    let direct = if path.is_absolute() {
        path.to_path_buf()
    } else {
        search.start_dir.join(path)
    };

    if direct.is_file() {
        return Ok(direct);
    }

    let is_bare_name = path.components().count() == 1;
    match path.to_str() {
        Some(name) if is_bare_name => find_env_file(Some(name), search),
        _ => Err(EnvError::Discovery {
            name: path.display().to_string(),
            levels: 0,
        }),
    }
}

/// Read a YAML file whose top level is a mapping. An empty file is an empty mapping.
pub fn load_yaml(path: &Path) -> EnvResult<Node> {
    let content = std::fs::read_to_string(path)?;
    parse_yaml(&content, path)
}

/// Parse YAML text; `origin` is only used in error messages.
pub fn parse_yaml(content: &str, origin: &Path) -> EnvResult<Node> {
    let value: serde_yaml::Value = serde_yaml::from_str(content).map_err(|source| EnvError::Yaml {
        path: origin.to_path_buf(),
        source,
    })?;

    match Node::from(value) {
        Node::Null => Ok(Node::map()),
        node @ Node::Map(_) => Ok(node),
        _ => Err(EnvError::NotAMapping(origin.to_path_buf())),
    }
}

/// Env name from its file name: `env.yaml` → `root`, `env.<name>.yaml` → `<name>`.
pub fn env_name_from_path(path: &Path) -> EnvResult<String> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EnvError::InvalidFileName(path.to_path_buf()))?;

    let parts: Vec<&str> = file_name.split('.').collect();
    match parts.as_slice() {
        ["env", "yaml"] => Ok("root".to_string()),
        ["env", name, "yaml"] if !name.is_empty() => Ok(name.to_string()),
        _ => Err(EnvError::InvalidFileName(path.to_path_buf())),
    }
}

/// Maps a dotted module name to the directory holding it.
pub trait ModuleResolver: Send + Sync + fmt::Debug {
    fn find_module(&self, name: &str) -> Option<PathBuf>;
}

/// Resolves `a.b` to `<root>/a/b` for each configured root.
#[derive(Debug, Clone)]
pub struct PathModuleResolver {
    roots: Vec<PathBuf>,
}

impl Default for PathModuleResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PathModuleResolver {
    /// Roots from `ENVDICT_MODULE_PATH`, then the working directory.
    pub fn from_env() -> Self {
        let mut roots: Vec<PathBuf> = std::env::var_os("ENVDICT_MODULE_PATH")
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();

        if let Ok(cwd) = std::env::current_dir() {
            roots.push(cwd);
        }

        Self { roots }
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl ModuleResolver for PathModuleResolver {
    fn find_module(&self, name: &str) -> Option<PathBuf> {
        let valid = !name.is_empty()
            && name.split('.').all(|part| {
                !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
            });
        if !valid {
            return None;
        }

        let relative: PathBuf = name.split('.').collect();
        self.roots
            .iter()
            .map(|root| root.join(&relative))
            .find(|candidate| candidate.is_dir())
            .map(|dir| dir.canonicalize().unwrap_or(dir))
    }
}

/// Resolve the value of `_module` to a directory.
///
/// `{{here}}` means the directory of the env file and requires one. Other
/// values are looked up as module names, then accepted if they name an
/// existing directory.
pub fn resolve_module(
    value: &str,
    file_dir: Option<&Path>,
    resolver: &dyn ModuleResolver,
) -> EnvResult<PathBuf> {
    if is_here_placeholder(value) {
        return file_dir.map(Path::to_path_buf).ok_or_else(|| {
            EnvError::Resolution(format!(
                "_module cannot be {} if not loaded from a file",
                HERE_PLACEHOLDER
            ))
        });
    }

    if let Some(dir) = resolver.find_module(value) {
        debug!(module = value, dir = %dir.display(), "Resolved _module");
        return Ok(dir);
    }

    let as_dir = Path::new(value);
    if as_dir.is_dir() {
        return Ok(as_dir.canonicalize()?);
    }

    Err(EnvError::unresolved_module(value))
}

fn is_here_placeholder(value: &str) -> bool {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    compact == HERE_PLACEHOLDER
}
