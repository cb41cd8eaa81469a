//! Env injection for plain functions.
//!
//! A function taking the env as its first parameter is wrapped so callers
//! never pass the env themselves:
//!
//! ```
//! use envdict::{Env, Kwargs, with_env};
//! use serde_json::json;
//!
//! let my_fn = with_env(json!({"a": 1}))
//!     .decorate(&["env", "b"], |env: &Env, (b,): (i64,)| {
//!         (env["a"].as_i64().unwrap_or_default(), b)
//!     })
//!     .unwrap();
//!
//! assert_eq!(my_fn.parameters(), ["b"]);
//! assert_eq!(my_fn.call((2,)).unwrap(), (1, 2));
//! assert_eq!(
//!     my_fn.call_with((2,), Kwargs::new().with("env__a", 100)).unwrap(),
//!     (100, 2)
//! );
//! ```
//!
//! - [`with_env`] builds a fresh env for every call from the defaults given at
//!   decoration time, after applying `env__a__b=value` keyword overrides.
//! - [`load_env`] injects the process-wide active env (see [`Env::start`]).
//!
//! Parameter names are declared explicitly at decoration time; the first one
//! must be `env`, and it is dropped from [`EnvFn::parameters`].

use crate::env::Env;
use crate::env_dict::{EnvDict, Override};
use crate::error::{EnvError, EnvResult};
use crate::node::Node;
use crate::source::EnvSource;
use crate::validate::DELIMITER;
use tracing::debug;

/// Name the first parameter of a decorated function must have.
pub const ENV_PARAM: &str = "env";

/// Keyword arguments passed at a call site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kwargs {
    entries: Vec<(String, Node)>,
}

impl Kwargs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a keyword argument (builder pattern).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Node>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add a keyword argument, replacing an earlier one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Node>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Separate override keywords (`env__...`) from the rest.
    pub fn split_overrides(self) -> (Vec<Override>, Kwargs) {
        let mut overrides = Vec::new();
        let mut rest = Kwargs::new();
        for (name, value) in self.entries {
            match OverridePath::parse(&name) {
                Some(path) => overrides.push(path.into_override(value)),
                None => rest.entries.push((name, value)),
            }
        }
        (overrides, rest)
    }
}

impl<K: Into<String>, V: Into<Node>> FromIterator<(K, V)> for Kwargs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut kwargs = Kwargs::new();
        for (name, value) in iter {
            kwargs.insert(name, value);
        }
        kwargs
    }
}

/// Path encoded in an override keyword: `env__a__b` addresses `a.b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverridePath {
    segments: Vec<String>,
}

impl OverridePath {
    /// Parse a keyword name. Returns `None` unless it starts with `env__`.
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(ENV_PARAM)?.strip_prefix(DELIMITER)?;
        Some(Self {
            segments: rest.split(DELIMITER).map(str::to_string).collect(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn into_override(self, value: Node) -> Override {
        Override {
            segments: self.segments,
            value,
        }
    }
}

/// Positional argument tuple of a decorated function.
pub trait ArgTuple {
    /// Number of positional arguments.
    const ARITY: usize;
}

macro_rules! impl_arg_tuple {
    ($arity:expr; $($name:ident),*) => {
        impl<$($name),*> ArgTuple for ($($name,)*) {
            const ARITY: usize = $arity;
        }
    };
}

impl_arg_tuple!(0;);
impl_arg_tuple!(1; A1);
impl_arg_tuple!(2; A1, A2);
impl_arg_tuple!(3; A1, A2, A3);
impl_arg_tuple!(4; A1, A2, A3, A4);
impl_arg_tuple!(5; A1, A2, A3, A4, A5);
impl_arg_tuple!(6; A1, A2, A3, A4, A5, A6);
impl_arg_tuple!(7; A1, A2, A3, A4, A5, A6, A7);
impl_arg_tuple!(8; A1, A2, A3, A4, A5, A6, A7, A8);

enum Mode {
    Build(EnvSource),
    Prebuilt(EnvDict),
    Active,
}

/// Turns a function taking the env first into an [`EnvFn`].
pub struct Decorator {
    mode: Mode,
    name: Option<String>,
}

/// Inject a fresh env built from `defaults` on every call.
pub fn with_env(defaults: impl Into<EnvSource>) -> Decorator {
    Decorator {
        mode: Mode::Build(defaults.into()),
        name: None,
    }
}

/// Like [`with_env`], with defaults from a discovered env file.
pub fn with_env_discovered() -> Decorator {
    with_env(EnvSource::Discover(None))
}

/// Like [`with_env`], with defaults from an already built env.
///
/// Use this to decorate with custom resolvers or path keys (see [`EnvDict::builder`]).
pub fn with_env_dict(defaults: EnvDict) -> Decorator {
    Decorator {
        mode: Mode::Prebuilt(defaults),
        name: None,
    }
}

/// Inject the process-wide active env on every call.
pub fn load_env() -> Decorator {
    Decorator {
        mode: Mode::Active,
        name: None,
    }
}

impl Decorator {
    /// Function name used in error messages.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Wrap `func`, whose declared parameters are `params`.
    ///
    /// Fails here, before any call, when `params` is empty, its first
    /// entry is not `env`, or the remaining names do not match the arity of `A`.
    pub fn decorate<A, R, F>(self, params: &[&str], func: F) -> EnvResult<EnvFn<F>>
    where
        A: ArgTuple,
        F: Fn(&Env, A) -> R,
    {
        let name = self.name.unwrap_or_else(|| "function".to_string());

        match params.first() {
            None => {
                return Err(EnvError::Decoration(format!(
                    "{} does not take arguments, decorated functions must take '{}' as their first argument",
                    name, ENV_PARAM
                )));
            }
            Some(first) if *first != ENV_PARAM => {
                return Err(EnvError::Decoration(format!(
                    "{} must take '{}' as its first argument, got '{}'",
                    name, ENV_PARAM, first
                )));
            }
            Some(_) => {}
        }

        if params.len() - 1 != A::ARITY {
            return Err(EnvError::Decoration(format!(
                "{} takes {} argument(s) after '{}' but {} parameter name(s) were declared: {:?}",
                name,
                A::ARITY,
                ENV_PARAM,
                params.len() - 1,
                &params[1..]
            )));
        }

        let defaults = match self.mode {
            Mode::Build(source) => Some(EnvDict::new(source)?),
            Mode::Prebuilt(env_dict) => Some(env_dict),
            Mode::Active => None,
        };

        debug!(function = %name, params = ?params, "Decorated function");

        Ok(EnvFn {
            name,
            params: params[1..].iter().map(|p| p.to_string()).collect(),
            defaults,
            func,
        })
    }
}

/// A function with its env parameter injected.
pub struct EnvFn<F> {
    name: String,
    params: Vec<String>,
    defaults: Option<EnvDict>,
    func: F,
}

impl<F> EnvFn<F> {
    /// Parameters callers pass, without the env.
    pub fn parameters(&self) -> &[String] {
        &self.params
    }

    /// Defaults captured at decoration time. `None` for [`load_env`] functions.
    pub fn env_dict(&self) -> Option<&EnvDict> {
        self.defaults.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call<A, R>(&self, args: A) -> EnvResult<R>
    where
        F: Fn(&Env, A) -> R,
    {
        self.call_with(args, Kwargs::new())
    }

    /// Call with keyword arguments. Only `env__...` overrides are accepted, and
    /// only by [`with_env`] functions.
    pub fn call_with<A, R>(&self, args: A, kwargs: Kwargs) -> EnvResult<R>
    where
        F: Fn(&Env, A) -> R,
    {
        let env = self.prepare(kwargs)?;
        Ok((self.func)(&env, args))
    }

    fn prepare(&self, kwargs: Kwargs) -> EnvResult<Env> {
        let (overrides, rest) = kwargs.split_overrides();

        if let Some(unexpected) = rest.names().next() {
            return Err(EnvError::Decoration(format!(
                "{} got an unexpected keyword argument '{}'",
                self.name, unexpected
            )));
        }

        match &self.defaults {
            Some(defaults) => Ok(Env::new(defaults.with_overrides(overrides)?)),
            None => {
                if !overrides.is_empty() {
                    return Err(EnvError::Decoration(format!(
                        "{} loads the active env and does not accept env overrides",
                        self.name
                    )));
                }
                Env::load()
            }
        }
    }
}

impl<F> std::fmt::Debug for EnvFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvFn")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("defaults", &self.defaults)
            .finish()
    }
}
