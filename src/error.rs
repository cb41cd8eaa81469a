//! Structured error types for env construction, access and injection.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Construction errors
    InvalidKeys,
    UnresolvedModule,
    UnknownPlaceholder,
    ResolverFailed,
    InvalidFileName,
    InvalidSource,

    // Access errors
    KeyNotFound,
    InvalidValue,

    // Wrapper errors
    InvalidSignature,
    NoActiveEnv,

    // I/O errors
    FileNotFound,
    ParseError,
    IoError,
}

/// Invalid key shapes found while validating a raw tree.
///
/// Every variant carries all offending keys, not just the first one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Keys cannot have double underscores, got: {}", quoted_list(.keys))]
    DoubleUnderscore { keys: Vec<String> },

    #[error(
        "Error validating env.\nTop-level keys cannot start with an underscore, except for {{'{reserved}'}}. Got: {}",
        quoted_list(.keys)
    )]
    LeadingUnderscore {
        keys: Vec<String>,
        reserved: &'static str,
    },
}

impl ValidationError {
    /// Offending keys, in document order.
    pub fn keys(&self) -> &[String] {
        match self {
            ValidationError::DoubleUnderscore { keys } => keys,
            ValidationError::LeadingUnderscore { keys, .. } => keys,
        }
    }
}

/// Errors raised by the env subsystem.
#[derive(Error, Debug)]
pub enum EnvError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Resolution(String),

    #[error("{key:?} is not a key in the env (missing segment {segment:?})")]
    Lookup { key: String, segment: String },

    #[error("Unknown placeholder \"{{{{{tag}}}}}\": no resolver is registered for {tag:?}")]
    UnknownPlaceholder { tag: String },

    #[error("Resolver for \"{{{{{tag}}}}}\" failed: {message}")]
    Resolver { tag: String, message: String },

    #[error("{0}")]
    Decoration(String),

    #[error(
        "Could not find file \"{name}\" in the current working directory nor {levels} levels up"
    )]
    Discovery { name: String, levels: usize },

    #[error("No active env. Call Env::start before using a load_env function")]
    Activation,

    #[error("Could not extract name from file \"{}\", expected env.yaml or env.{{name}}.yaml", .0.display())]
    InvalidFileName(PathBuf),

    #[error("Value at {key:?} has an unexpected shape: {message}")]
    Deserialize { key: String, message: String },

    #[error("Expected a mapping at the top level of {}", .0.display())]
    NotAMapping(PathBuf),

    #[error("An env must be built from a mapping, got {0}")]
    InvalidSource(String),

    #[error("Failed to parse {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EnvError::Validation(_) => ErrorCode::InvalidKeys,
            EnvError::Resolution(_) => ErrorCode::UnresolvedModule,
            EnvError::Lookup { .. } => ErrorCode::KeyNotFound,
            EnvError::UnknownPlaceholder { .. } => ErrorCode::UnknownPlaceholder,
            EnvError::Resolver { .. } => ErrorCode::ResolverFailed,
            EnvError::Decoration(_) => ErrorCode::InvalidSignature,
            EnvError::Discovery { .. } => ErrorCode::FileNotFound,
            EnvError::Activation => ErrorCode::NoActiveEnv,
            EnvError::InvalidFileName(_) => ErrorCode::InvalidFileName,
            EnvError::Deserialize { .. } => ErrorCode::InvalidValue,
            EnvError::InvalidSource(_) => ErrorCode::InvalidSource,
            EnvError::NotAMapping(_) | EnvError::Yaml { .. } => ErrorCode::ParseError,
            EnvError::Io(_) => ErrorCode::IoError,
        }
    }

    // Convenience constructors

    pub fn key_not_found(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::Lookup {
            segment: key.clone(),
            key,
        }
    }

    pub fn missing_segment(key: impl Into<String>, segment: impl Into<String>) -> Self {
        Self::Lookup {
            key: key.into(),
            segment: segment.into(),
        }
    }

    pub fn unresolved_module(name: &str) -> Self {
        Self::Resolution(format!(
            "Could not resolve _module \"{}\", failed to import as a module and is not a directory",
            name
        ))
    }

    pub fn resolver(tag: &str, message: impl Into<String>) -> Self {
        Self::Resolver {
            tag: tag.to_string(),
            message: message.into(),
        }
    }
}

/// Render keys as a bracketed list of quoted strings: `['a', 'b']`.
fn quoted_list(keys: &[String]) -> String {
    let quoted: Vec<String> = keys.iter().map(|k| format!("'{}'", k)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Result type for env operations.
pub type EnvResult<T> = std::result::Result<T, EnvError>;
