//! Explicit subprocess environments and scoped context application.
//!
//! Subprocesses never inherit the orchestrator's process environment
//! directly. They receive an [`Environment`] value, and toolchain contexts
//! are layered onto it through an [`EnvGuard`] that puts every touched
//! variable back the way it was when dropped.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::ops::Deref;

use serde::Serialize;

/// An ordered set of environment variables handed to subprocesses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// An environment with no variables.
    pub fn empty() -> Self {
        Environment::default()
    }

    /// Snapshot the current process environment.
    pub fn capture() -> Self {
        Self::from_os_vars(std::env::vars_os())
    }

    /// Build an environment from raw OS pairs. Pairs that are not valid
    /// UTF-8 are left out with a warning.
    pub fn from_os_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        let mut env = Environment::empty();
        for (key, value) in vars {
            match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => {
                    env.vars.insert(key, value);
                }
                (Ok(key), Err(_)) => {
                    tracing::warn!("Not passing {} to builds: value is not valid UTF-8", key)
                }
                (Err(key), _) => tracing::warn!(
                    "Not passing {} to builds: name is not valid UTF-8",
                    key.to_string_lossy()
                ),
            }
        }
        env
    }

    /// Get a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Check whether a variable is set.
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Set a variable, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.vars.insert(key.into(), value.into())
    }

    /// Remove a variable, returning the previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    /// Iterate over all variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variable is set.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Apply a set of overrides for the lifetime of the returned guard.
    pub fn scoped<'a, I, K, V>(&'a mut self, label: impl Into<String>, overrides: I) -> EnvGuard<'a>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut saved: Vec<(String, Option<String>)> = Vec::new();
        for (key, value) in overrides {
            let key = key.into();
            let previous = self.vars.insert(key.clone(), value.into());
            // Only the first save of a key holds the pre-guard value.
            if !saved.iter().any(|(k, _)| *k == key) {
                saved.push((key, previous));
            }
        }

        let label = label.into();
        tracing::debug!("Applied {} environment override(s) for {}", saved.len(), label);

        EnvGuard {
            env: self,
            saved,
            label,
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Environment {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Overrides applied to an [`Environment`]; dropping restores prior state.
pub struct EnvGuard<'a> {
    env: &'a mut Environment,
    saved: Vec<(String, Option<String>)>,
    label: String,
}

impl EnvGuard<'_> {
    /// Add a further override inside this scope.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let previous = self.env.vars.insert(key.clone(), value.into());
        if !self.saved.iter().any(|(k, _)| *k == key) {
            self.saved.push((key, previous));
        }
    }

    /// Keys overridden by this guard.
    pub fn overridden_keys(&self) -> impl Iterator<Item = &str> {
        self.saved.iter().map(|(k, _)| k.as_str())
    }
}

impl Deref for EnvGuard<'_> {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        self.env
    }
}

impl Drop for EnvGuard<'_> {
    fn drop(&mut self) {
        for (key, previous) in self.saved.drain(..).rev() {
            match previous {
                Some(value) => {
                    self.env.vars.insert(key, value);
                }
                None => {
                    self.env.vars.remove(&key);
                }
            }
        }
        tracing::debug!("Restored environment after {}", self.label);
    }
}
