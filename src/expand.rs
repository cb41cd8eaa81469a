//! Placeholder expansion for string leaves.
//!
//! A string leaf may contain `{{tag}}` occurrences. Each tag is looked up in a
//! [`PlaceholderRegistry`] and replaced by its resolver's output. Resolvers run
//! only for tags that actually occur, at most once per expansion pass, and their
//! output is never expanded again.
//!
//! Resolvers come in two shapes:
//! - [`Resolver::Plain`]: independent of location (`user`, `now`, ...)
//! - [`Resolver::ModulePath`]: receives the resolved `_module` directory
//!   (`version`, `git`)

use crate::error::{EnvError, EnvResult};
use crate::node::Node;
use crate::vcs;
use regex_lite::{Captures, Regex};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, OnceLock};
use tracing::debug;

type PlainFn = dyn Fn() -> EnvResult<String> + Send + Sync;
type ModulePathFn = dyn Fn(&Path) -> EnvResult<String> + Send + Sync;

/// A named placeholder resolver.
#[derive(Clone)]
pub enum Resolver {
    Plain(Arc<PlainFn>),
    ModulePath(Arc<ModulePathFn>),
}

impl Resolver {
    pub fn plain(f: impl Fn() -> EnvResult<String> + Send + Sync + 'static) -> Self {
        Resolver::Plain(Arc::new(f))
    }

    pub fn module_path(f: impl Fn(&Path) -> EnvResult<String> + Send + Sync + 'static) -> Self {
        Resolver::ModulePath(Arc::new(f))
    }

    /// A resolver that always returns `value`.
    pub fn fixed(value: impl Into<String>) -> Self {
        let value = value.into();
        Resolver::plain(move || Ok(value.clone()))
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::Plain(_) => write!(f, "Resolver::Plain"),
            Resolver::ModulePath(_) => write!(f, "Resolver::ModulePath"),
        }
    }
}

/// Registry of placeholder resolvers, keyed by tag name.
#[derive(Clone, Default, Debug)]
pub struct PlaceholderRegistry {
    resolvers: HashMap<String, Resolver>,
}

impl PlaceholderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tags.
    ///
    /// `here` is the directory the env was loaded from (or the working
    /// directory for in-memory envs).
    pub fn builtin(here: &Path) -> Self {
        let here = here.to_path_buf();
        let start = here.clone();

        Self::new()
            .with("user", Resolver::plain(current_user))
            .with("here", Resolver::fixed(here.to_string_lossy()))
            .with(
                "root",
                Resolver::plain(move || {
                    let root = vcs::find_repo_root(&start).unwrap_or(&start);
                    Ok(root.to_string_lossy().into_owned())
                }),
            )
            .with("now", Resolver::plain(now))
            .with("version", Resolver::module_path(module_version))
            .with("git", Resolver::module_path(vcs::git_location))
    }

    /// Register a resolver, returning the one it replaced.
    pub fn register(&mut self, name: impl Into<String>, resolver: Resolver) -> Option<Resolver> {
        self.resolvers.insert(name.into(), resolver)
    }

    /// Register a resolver (builder pattern).
    pub fn with(mut self, name: impl Into<String>, resolver: Resolver) -> Self {
        self.register(name, resolver);
        self
    }

    /// Copy every resolver of `other` into this registry, replacing on conflict.
    pub fn extend(&mut self, other: &PlaceholderRegistry) {
        for (name, resolver) in &other.resolvers {
            self.resolvers.insert(name.clone(), resolver.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Resolver> {
        self.resolvers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    /// Registered tag names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.resolvers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("tag pattern is valid"))
}

/// Tag names occurring in `s`, in order of first occurrence.
pub fn placeholders(s: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for caps in tag_pattern().captures_iter(s) {
        let tag = &caps[1];
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Depth-first placeholder expander over a [`Node`] tree.
pub struct Expander<'a> {
    registry: &'a PlaceholderRegistry,
    module_dir: Option<&'a Path>,
    resolved: HashMap<String, String>,
}

impl<'a> Expander<'a> {
    pub fn new(registry: &'a PlaceholderRegistry, module_dir: Option<&'a Path>) -> Self {
        Self {
            registry,
            module_dir,
            resolved: HashMap::new(),
        }
    }

    /// Expand every string leaf of `node`. Keys and non-string leaves are left alone.
    pub fn expand(&mut self, node: Node) -> EnvResult<Node> {
        match node {
            Node::String(s) => Ok(Node::String(self.expand_str(&s)?)),
            Node::Seq(items) => items
                .into_iter()
                .map(|item| self.expand(item))
                .collect::<EnvResult<Vec<_>>>()
                .map(Node::Seq),
            Node::Map(map) => {
                let mut expanded = map;
                for value in expanded.values_mut() {
                    *value = self.expand(std::mem::take(value))?;
                }
                Ok(Node::Map(expanded))
            }
            other => Ok(other),
        }
    }

    /// Expand the tags of a single string.
    pub fn expand_str(&mut self, s: &str) -> EnvResult<String> {
        let tags = placeholders(s);
        if tags.is_empty() {
            return Ok(s.to_string());
        }

        for tag in &tags {
            self.resolve(tag)?;
        }

        let resolved = &self.resolved;
        let expanded = tag_pattern().replace_all(s, |caps: &Captures| {
            resolved.get(&caps[1]).cloned().unwrap_or_default()
        });
        Ok(expanded.into_owned())
    }

    fn resolve(&mut self, tag: &str) -> EnvResult<()> {
        if self.resolved.contains_key(tag) {
            return Ok(());
        }

        let resolver = self
            .registry
            .get(tag)
            .ok_or_else(|| EnvError::UnknownPlaceholder {
                tag: tag.to_string(),
            })?;

        let value = match resolver {
            Resolver::Plain(f) => f()?,
            Resolver::ModulePath(f) => {
                let module_dir = self.module_dir.ok_or_else(|| {
                    EnvError::Resolution(format!(
                        "_module key is required to use the {{{{{}}}}} placeholder",
                        tag
                    ))
                })?;
                f(module_dir)?
            }
        };

        debug!(tag, value = %value, "Resolved placeholder");
        self.resolved.insert(tag.to_string(), value);
        Ok(())
    }
}

/// Environment variables holding the user name, in lookup order.
const USER_VARS: [&str; 4] = ["LOGNAME", "USER", "LNAME", "USERNAME"];

/// Name of the user running the process.
///
/// Falls back to the login name of the process uid when no variable is set.
fn current_user() -> EnvResult<String> {
    if let Some(name) = user_from_vars(|var| std::env::var(var).ok()) {
        return Ok(name);
    }
    login_name().ok_or_else(|| {
        EnvError::resolver(
            "user",
            format!(
                "none of {} is set and the login name could not be determined",
                USER_VARS.join(", ")
            ),
        )
    })
}

/// First non-empty user variable.
fn user_from_vars(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    USER_VARS
        .iter()
        .filter_map(|var| lookup(var))
        .find(|name| !name.is_empty())
}

/// Login name of the process uid, from `id -un`.
fn login_name() -> Option<String> {
    let output = Command::new("id").arg("-un").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!name.is_empty()).then_some(name)
}

fn now() -> EnvResult<String> {
    Ok(chrono::Local::now().format("%Y-%m-%dT%H:%M").to_string())
}

/// Version of the module at `module_dir`.
///
/// Read from a `VERSION` file, falling back to `package.version` in `Cargo.toml`.
fn module_version(module_dir: &Path) -> EnvResult<String> {
    let version_file = module_dir.join("VERSION");
    if version_file.is_file() {
        return Ok(std::fs::read_to_string(&version_file)?.trim().to_string());
    }

    let manifest: PathBuf = module_dir.join("Cargo.toml");
    if manifest.is_file() {
        let content = std::fs::read_to_string(&manifest)?;
        let parsed: toml::Table = toml::from_str(&content)
            .map_err(|e| EnvError::resolver("version", e.to_string()))?;
        if let Some(version) = parsed
            .get("package")
            .and_then(|p| p.get("version"))
            .and_then(|v| v.as_str())
        {
            return Ok(version.to_string());
        }
    }

    Err(EnvError::resolver(
        "version",
        format!(
            "no VERSION file or Cargo.toml package version in {}",
            module_dir.display()
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn user_registry() -> PlaceholderRegistry {
        PlaceholderRegistry::new().with("user", Resolver::fixed("username"))
    }

    #[test]
    fn test_expand_tags() {
        let registry = user_registry();
        let raw = Node::from(json!({"a": "{{user}}", "b": {"c": "{{user}} {{user}}"}}));

        let expanded = Expander::new(&registry, None).expand(raw).unwrap();

        assert_eq!(
            expanded,
            Node::from(json!({"a": "username", "b": {"c": "username username"}}))
        );
    }

    #[test]
    fn test_whitespace_inside_braces() {
        let registry = user_registry();
        let out = Expander::new(&registry, None).expand_str("{{ user }}").unwrap();
        assert_eq!(out, "username");
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let registry = user_registry();
        let err = Expander::new(&registry, None)
            .expand(Node::from("{{nope}}"))
            .unwrap_err();
        match err {
            EnvError::UnknownPlaceholder { tag } => assert_eq!(tag, "nope"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_resolvers_are_lazy_and_run_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = PlaceholderRegistry::new()
            .with(
                "expensive",
                Resolver::plain(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok("x".to_string())
                }),
            )
            .with("unused", Resolver::plain(|| panic!("should not run")));

        let raw = Node::from(json!({"a": "{{expensive}}", "b": ["{{expensive}}-{{expensive}}"]}));
        let expanded = Expander::new(&registry, None).expand(raw).unwrap();

        assert_eq!(expanded, Node::from(json!({"a": "x", "b": ["x-x"]})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resolver_output_is_not_reexpanded() {
        let registry = PlaceholderRegistry::new().with("a", Resolver::fixed("{{b}}"));
        let out = Expander::new(&registry, None).expand_str("{{a}}").unwrap();
        assert_eq!(out, "{{b}}");
    }

    #[test]
    fn test_non_string_leaves_untouched() {
        let registry = PlaceholderRegistry::new();
        let raw = Node::from(json!({"n": 1, "f": 1.5, "b": true, "z": null}));
        let expanded = Expander::new(&registry, None).expand(raw.clone()).unwrap();
        assert_eq!(expanded, raw);
    }

    #[test]
    fn test_module_path_resolver_requires_module() {
        let registry = PlaceholderRegistry::new()
            .with("version", Resolver::module_path(|_| Ok("1.0".to_string())));
        let err = Expander::new(&registry, None)
            .expand_str("{{version}}")
            .unwrap_err();
        assert!(matches!(err, EnvError::Resolution(_)));
    }

    #[test]
    fn test_module_path_resolver_receives_module_dir() {
        let registry = PlaceholderRegistry::new().with(
            "where",
            Resolver::module_path(|dir| Ok(dir.to_string_lossy().into_owned())),
        );
        let dir = PathBuf::from("/some/module");
        let out = Expander::new(&registry, Some(&dir))
            .expand_str("{{where}}")
            .unwrap();
        assert_eq!(out, "/some/module");
    }

    #[test]
    fn test_version_from_version_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("VERSION"), "0.1dev\n").unwrap();
        assert_eq!(module_version(temp.path()).unwrap(), "0.1dev");
    }

    #[test]
    fn test_version_from_cargo_manifest() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("Cargo.toml"),
            "[package]\nname = \"sample\"\nversion = \"2.3.4\"\n",
        )
        .unwrap();
        assert_eq!(module_version(temp.path()).unwrap(), "2.3.4");
    }

    #[test]
    fn test_version_missing() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            module_version(temp.path()),
            Err(EnvError::Resolver { .. })
        ));
    }

    #[test]
    fn test_builtin_here() {
        let registry = PlaceholderRegistry::builtin(Path::new("/srv/project"));
        let out = Expander::new(&registry, None).expand_str("{{here}}/data").unwrap();
        assert_eq!(out, "/srv/project/data");
        assert_eq!(
            registry.names(),
            vec!["git", "here", "now", "root", "user", "version"]
        );
    }

    #[test]
    fn test_builtin_root_is_repo_root() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("src").join("pkg");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir(temp.path().join(".git")).unwrap();

        let registry = PlaceholderRegistry::builtin(&nested);
        let out = Expander::new(&registry, None).expand_str("{{root}}").unwrap();
        assert_eq!(out, temp.path().to_string_lossy());
    }

    #[test]
    fn test_builtin_root_without_repo_is_here() {
        let temp = TempDir::new().unwrap();
        let registry = PlaceholderRegistry::builtin(temp.path());
        // Only resolved when used.
        assert!(registry.contains("root"));
        let out = Expander::new(&registry, None).expand_str("{{root}}").unwrap();
        let expected = vcs::find_repo_root(temp.path()).unwrap_or(temp.path());
        assert_eq!(out, expected.to_string_lossy());
    }

    fn vars(set: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            set.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_user_from_vars_order() {

        assert_eq!(
            user_from_vars(vars(&[("USER", "bob"), ("LOGNAME", "alice")])),
            Some("alice".to_string())
        );
        assert_eq!(
            user_from_vars(vars(&[("LNAME", "carol"), ("USERNAME", "dave")])),
            Some("carol".to_string())
        );
        assert_eq!(
            user_from_vars(vars(&[("LOGNAME", ""), ("USERNAME", "dave")])),
            Some("dave".to_string())
        );
        assert_eq!(user_from_vars(vars(&[])), None);
    }

    #[test]
    fn test_placeholders_in_order() {
        assert_eq!(placeholders("{{b}} {{a}} {{b}}"), vec!["b", "a"]);
        assert!(placeholders("no tags, {single} braces").is_empty());
    }
}
