//! The env container.
//!
//! An [`EnvDict`] is built in one pass, all-or-nothing:
//! 1. Load the raw tree (in-memory mapping, file, or discovered file)
//! 2. Resolve `_module` to a directory
//! 3. Validate keys
//! 4. Expand `{{tag}}` placeholders
//! 5. Cast path sub-trees
//!
//! The raw (unexpanded) tree is kept so that overrides can be applied to a
//! copy and the whole pipeline re-run, which is how per-call overrides reach
//! placeholders and path casting.

use crate::cast::{PATH_KEY, cast_path_keys, cast_paths};
use crate::error::{EnvError, EnvResult};
use crate::expand::{Expander, PlaceholderRegistry, Resolver};
use crate::node::{Node, NodeMap};
use crate::source::{self, EnvSource, ModuleResolver, PathModuleResolver, SearchPaths};
use crate::validate::{MODULE_KEY, validate_keys};
use serde::de::DeserializeOwned;
use std::fmt;
use std::ops::Index;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Replace the value at an existing path of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub segments: Vec<String>,
    pub value: Node,
}

impl Override {
    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>, value: impl Into<Node>) -> Self {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            value: value.into(),
        }
    }

    /// Override addressed by a dotted path (`a.b.c`).
    pub fn dotted(path: &str, value: impl Into<Node>) -> Self {
        Self::new(path.split('.'), value)
    }

    /// Dotted form of the path, for messages.
    pub fn key(&self) -> String {
        self.segments.join(".")
    }
}

/// Replace the leaf at `segments` in `root`.
///
/// Every segment must already exist and every intermediate must be a mapping;
/// nothing is created along the way.
pub fn apply_override(root: &mut Node, segments: &[String], value: Node) -> EnvResult<()> {
    let key = segments.join(".");
    let Some((last, parents)) = segments.split_last() else {
        return Err(EnvError::missing_segment(key, ""));
    };

    let mut current = root;
    for segment in parents {
        current = current
            .as_map_mut()
            .and_then(|map| map.get_mut(segment))
            .ok_or_else(|| EnvError::missing_segment(&key, segment))?;
    }

    let slot = current
        .as_map_mut()
        .and_then(|map| map.get_mut(last))
        .ok_or_else(|| EnvError::missing_segment(&key, last))?;
    *slot = value;
    Ok(())
}

/// Settings shared by an env and every copy derived from it by overrides.
#[derive(Clone)]
struct BuildOptions {
    resolvers: PlaceholderRegistry,
    path_keys: Vec<String>,
    module_resolver: Arc<dyn ModuleResolver>,
    search: SearchPaths,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            resolvers: PlaceholderRegistry::new(),
            path_keys: vec![PATH_KEY.to_string()],
            module_resolver: Arc::new(PathModuleResolver::from_env()),
            search: SearchPaths::discover(),
        }
    }
}

/// Builder for [`EnvDict`] with custom resolvers, path keys and search settings.
#[derive(Default)]
pub struct EnvDictBuilder {
    source: Option<EnvSource>,
    options: BuildOptions,
}

impl EnvDictBuilder {
    pub fn source(mut self, source: impl Into<EnvSource>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Register a placeholder resolver. Shadows a built-in with the same name.
    pub fn resolver(mut self, name: impl Into<String>, resolver: Resolver) -> Self {
        self.options.resolvers.register(name, resolver);
        self
    }

    /// Flag another top-level key as path-like.
    pub fn path_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.options.path_keys.contains(&key) {
            self.options.path_keys.push(key);
        }
        self
    }

    pub fn module_resolver(mut self, resolver: impl ModuleResolver + 'static) -> Self {
        self.options.module_resolver = Arc::new(resolver);
        self
    }

    /// Directory discovery starts from (default: the working directory).
    pub fn start_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.search.start_dir = dir.into();
        self
    }

    /// How many parent directories discovery may visit.
    pub fn search_levels(mut self, levels: usize) -> Self {
        self.options.search.levels = levels;
        self
    }

    pub fn build(self) -> EnvResult<EnvDict> {
        let source = self.source.unwrap_or(EnvSource::Discover(None));
        let (raw, path_to_env) = match source {
            EnvSource::Map(node) => (node, None),
            EnvSource::File(path) => {
                let found = source::locate(&path, &self.options.search)?;
                (source::load_yaml(&found)?, Some(found))
            }
            EnvSource::Discover(name) => {
                let found = source::find_env_file(name.as_deref(), &self.options.search)?;
                (source::load_yaml(&found)?, Some(found))
            }
        };

        if !matches!(raw, Node::Map(_)) {
            return Err(EnvError::InvalidSource(raw.to_string()));
        }

        let path_to_env = match path_to_env {
            Some(path) => Some(path.canonicalize()?),
            None => None,
        };

        EnvDict::construct(raw, path_to_env, Arc::new(self.options))
    }
}

/// Nested, addressable env built from a mapping or a YAML file.
#[derive(Clone)]
pub struct EnvDict {
    data: Node,
    raw: Node,
    module_dir: Option<PathBuf>,
    path_to_env: Option<PathBuf>,
    name: Option<String>,
    options: Arc<BuildOptions>,
}

impl EnvDict {
    /// Build from a mapping, a file path, or (with [`EnvSource::Discover`]) a discovered file.
    pub fn new(source: impl Into<EnvSource>) -> EnvResult<Self> {
        Self::builder().source(source).build()
    }

    pub fn from_file(path: impl AsRef<Path>) -> EnvResult<Self> {
        Self::builder()
            .source(EnvSource::File(path.as_ref().to_path_buf()))
            .build()
    }

    /// Find `env.<hostname>.yaml` or `env.yaml` from the working directory upwards.
    pub fn discover() -> EnvResult<Self> {
        Self::builder().source(EnvSource::Discover(None)).build()
    }

    pub fn builder() -> EnvDictBuilder {
        EnvDictBuilder::default()
    }

    fn construct(raw: Node, path_to_env: Option<PathBuf>, options: Arc<BuildOptions>) -> EnvResult<Self> {
        let file_dir = path_to_env
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);

        let module_dir = match raw.as_map().and_then(|map| map.get(MODULE_KEY)) {
            None => None,
            Some(Node::String(value)) => Some(source::resolve_module(
                value,
                file_dir.as_deref(),
                options.module_resolver.as_ref(),
            )?),
            Some(Node::Path(path)) => Some(source::resolve_module(
                &path.to_string_lossy(),
                file_dir.as_deref(),
                options.module_resolver.as_ref(),
            )?),
            Some(other) => {
                return Err(EnvError::Resolution(format!(
                    "_module must be a string, got {}",
                    other
                )));
            }
        };

        validate_keys(&raw)?;

        let here = match file_dir {
            Some(dir) => dir,
            None => std::env::current_dir()?.canonicalize()?,
        };
        let mut registry = PlaceholderRegistry::builtin(&here);
        registry.extend(&options.resolvers);

        let mut expanded = {
            let mut expander = Expander::new(&registry, module_dir.as_deref());
            expander.expand(raw.clone())?
        };

        if let (Some(dir), Some(map)) = (&module_dir, expanded.as_map_mut()) {
            map.insert(MODULE_KEY.to_string(), Node::Path(dir.clone()));
        }

        let data = cast_path_keys(expanded, &options.path_keys);

        let name = path_to_env
            .as_deref()
            .and_then(|path| source::env_name_from_path(path).ok());

        debug!(
            source = %path_to_env.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "<mapping>".to_string()),
            keys = data.as_map().map(NodeMap::len).unwrap_or(0),
            "Built env"
        );

        Ok(Self {
            data,
            raw,
            module_dir,
            path_to_env,
            name,
            options,
        })
    }

    /// A new env with `overrides` applied to a copy of the raw tree.
    ///
    /// The whole pipeline re-runs, so overriding a value with `{{user}}`
    /// expands it and overriding a path leaf casts it. `self` is untouched.
    pub fn with_overrides(&self, overrides: impl IntoIterator<Item = Override>) -> EnvResult<Self> {
        let mut raw = self.raw.clone();
        for item in overrides {
            debug!(key = %item.key(), value = %item.value, "Applying override");
            apply_override(&mut raw, &item.segments, item.value)?;
        }
        Self::construct(raw, self.path_to_env.clone(), Arc::clone(&self.options))
    }

    /// Top-level value.
    pub fn get(&self, key: &str) -> EnvResult<&Node> {
        self.data.get(key)
    }

    /// Value at a dotted path (`a.b.c`).
    pub fn lookup(&self, dotted: &str) -> EnvResult<&Node> {
        self.data.lookup(dotted)
    }

    /// Deserialize the value at a dotted path into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, dotted: &str) -> EnvResult<T> {
        let node = self.lookup(dotted)?;
        serde_json::from_value(node.to_json()).map_err(|e| EnvError::Deserialize {
            key: dotted.to_string(),
            message: e.to_string(),
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.as_map().is_some_and(|map| map.contains_key(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data
            .as_map()
            .into_iter()
            .flat_map(|map| map.keys().map(String::as_str))
    }

    /// Assign a top-level key after construction.
    ///
    /// The key must pass validation; values under path-like keys are cast.
    /// Setting `_module` rebuilds the env so the module directory and the
    /// tags depending on it follow; on error the env is left unchanged.
    pub fn set(&mut self, key: &str, value: impl Into<Node>) -> EnvResult<()> {
        let value = value.into();
        let mut single = NodeMap::new();
        single.insert(key.to_string(), value.clone());
        validate_keys(&Node::Map(single))?;

        if key == MODULE_KEY {
            let mut raw = self.raw.clone();
            if let Some(map) = raw.as_map_mut() {
                map.insert(key.to_string(), value);
            }
            *self = Self::construct(raw, self.path_to_env.clone(), Arc::clone(&self.options))?;
            return Ok(());
        }

        let cast = if self.options.path_keys.iter().any(|k| k == key) {
            cast_paths(value.clone())
        } else {
            value.clone()
        };

        if let Some(map) = self.data.as_map_mut() {
            map.insert(key.to_string(), cast);
        }
        if let Some(map) = self.raw.as_map_mut() {
            map.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// The final tree (expanded and cast).
    pub fn as_node(&self) -> &Node {
        &self.data
    }

    /// The validated tree before expansion.
    pub fn raw(&self) -> &Node {
        &self.raw
    }

    /// Resolved `_module` directory.
    pub fn module_dir(&self) -> Option<&Path> {
        self.module_dir.as_deref()
    }

    /// File the env was loaded from.
    pub fn path_to_env(&self) -> Option<&Path> {
        self.path_to_env.as_deref()
    }

    /// Env name taken from the file name (`root` for `env.yaml`).
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.data.to_json()
    }
}

impl Index<&str> for EnvDict {
    type Output = Node;

    fn index(&self, key: &str) -> &Node {
        match self.get(key) {
            Ok(node) => node,
            Err(_) => panic!("{:?} is not a key in the env", key),
        }
    }
}

impl PartialEq for EnvDict {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl fmt::Display for EnvDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data)
    }
}

impl fmt::Debug for EnvDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnvDict({})", self.data)
    }
}
