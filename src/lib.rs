//! Nested environment dictionaries loaded from YAML.
//!
//! An [`EnvDict`] is built from a mapping or an `env.yaml` file: keys are
//! validated, `{{tag}}` placeholders are expanded, and path-like values are
//! cast to [`std::path::PathBuf`]. [`Env`] holds the process-wide active env,
//! and [`with_env`] / [`load_env`] inject an env into plain functions.

pub mod cast;
pub mod cli;
pub mod decorators;
pub mod env;
pub mod env_dict;
pub mod error;
pub mod expand;
pub mod node;
pub mod source;
pub mod validate;
pub mod vcs;

pub use decorators::{
    ArgTuple, Decorator, EnvFn, Kwargs, OverridePath, load_env, with_env, with_env_dict,
    with_env_discovered,
};
pub use env::Env;
pub use env_dict::{EnvDict, EnvDictBuilder, Override};
pub use error::{EnvError, EnvResult, ErrorCode, ValidationError};
pub use expand::{PlaceholderRegistry, Resolver};
pub use node::{Node, NodeMap};
pub use source::{EnvSource, ModuleResolver, PathModuleResolver, SearchPaths};
