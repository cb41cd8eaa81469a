//! Process-wide active env.
//!
//! [`Env::start`] builds an [`EnvDict`] and makes it the active env; any
//! later code in the process can read it with [`Env::load`] until
//! [`Env::end`] clears it or another start replaces it (last writer wins).
//! The slot is an `ArcSwapOption`, so reads are lock-free and readers keep
//! their snapshot even if the slot is replaced underneath them.

use crate::env_dict::EnvDict;
use crate::error::{EnvError, EnvResult};
use crate::source::EnvSource;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

static ACTIVE: ArcSwapOption<EnvDict> = ArcSwapOption::const_empty();

/// Cheap, clonable handle to an [`EnvDict`].
#[derive(Clone)]
pub struct Env {
    inner: Arc<EnvDict>,
}

impl Env {
    /// Wrap an env without activating it.
    pub fn new(env_dict: EnvDict) -> Self {
        Self {
            inner: Arc::new(env_dict),
        }
    }

    /// Build an env from `source` and make it the active env.
    pub fn start(source: impl Into<EnvSource>) -> EnvResult<Self> {
        let env_dict = EnvDict::new(source)?;
        Ok(Self::activate(env_dict))
    }

    /// Discover an env file from the working directory and make it the active env.
    pub fn start_discovered() -> EnvResult<Self> {
        Self::start(EnvSource::Discover(None))
    }

    /// Make `env_dict` the active env, replacing any previous one.
    pub fn activate(env_dict: EnvDict) -> Self {
        let env = Self::new(env_dict);
        let previous = ACTIVE.swap(Some(Arc::clone(&env.inner)));
        debug!(replaced = previous.is_some(), "Activated env");
        env
    }

    /// The active env.
    pub fn load() -> EnvResult<Self> {
        Self::current().ok_or(EnvError::Activation)
    }

    /// The active env, if any.
    pub fn current() -> Option<Self> {
        ACTIVE.load_full().map(|inner| Self { inner })
    }

    pub fn is_active() -> bool {
        ACTIVE.load().is_some()
    }

    /// Clear the active env. Handles already taken stay valid.
    pub fn end() {
        if ACTIVE.swap(None).is_some() {
            debug!("Deactivated env");
        }
    }

    pub fn env_dict(&self) -> &EnvDict {
        &self.inner
    }
}

impl From<EnvDict> for Env {
    fn from(env_dict: EnvDict) -> Self {
        Self::new(env_dict)
    }
}

impl Deref for Env {
    type Target = EnvDict;

    fn deref(&self) -> &EnvDict {
        &self.inner
    }
}

impl PartialEq for Env {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Env({})", self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;

    #[test]
    #[serial(active_env)]
    fn test_env_repr_and_str() {
        let env = Env::start(json!({"a": 1})).unwrap();
        assert_eq!(format!("{:?}", env), "Env({'a': 1})");
        assert_eq!(env.to_string(), "{'a': 1}");
        Env::end();
    }

    #[test]
    #[serial(active_env)]
    fn test_load_without_start_fails() {
        Env::end();
        assert!(matches!(Env::load(), Err(EnvError::Activation)));
        assert!(!Env::is_active());
    }

    #[test]
    #[serial(active_env)]
    fn test_last_writer_wins() {
        let first = Env::start(json!({"a": 1})).unwrap();
        Env::start(json!({"a": 2})).unwrap();

        let current = Env::load().unwrap();
        assert_eq!(current.get("a").unwrap().as_i64(), Some(2));
        // Earlier handles keep their snapshot.
        assert_eq!(first.get("a").unwrap().as_i64(), Some(1));
        Env::end();
    }

    #[test]
    #[serial(active_env)]
    fn test_failed_start_keeps_previous() {
        Env::start(json!({"a": 1})).unwrap();
        assert!(Env::start(json!({"_a": 1})).is_err());
        assert_eq!(Env::load().unwrap().get("a").unwrap().as_i64(), Some(1));
        Env::end();
    }
}
