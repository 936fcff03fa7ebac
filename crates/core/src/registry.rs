//! Explicit name → constructor table for child sources.
//!
//! A demux resolves its child through a registry at a single call site, so
//! an unregistered source type is a typed
//! [`SourceUnavailable`](VqeError::SourceUnavailable) error.

use std::collections::HashMap;

use crate::error::{Result, VqeError};

type Constructor<T> = Box<dyn Fn(&str) -> Result<T> + Send + Sync>;

/// Constructors of child sources of type `T`, keyed by source type name.
/// Each constructor receives the SDP document the child is configured with.
pub struct SourceRegistry<T> {
    constructors: HashMap<&'static str, Constructor<T>>,
}

impl<T> SourceRegistry<T> {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register `constructor` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &'static str, constructor: F) -> &mut Self
    where
        F: Fn(&str) -> Result<T> + Send + Sync + 'static,
    {
        if self.constructors.insert(name, Box::new(constructor)).is_some() {
            tracing::warn!(name, "replacing registered source constructor");
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.constructors.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Construct the source registered as `name`, configured with `sdp`.
    pub fn create(&self, name: &str, sdp: &str) -> Result<T> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| VqeError::SourceUnavailable(name.to_string()))?;
        constructor(sdp)
    }
}

impl<T> Default for SourceRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SourceRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_passes_document() {
        let mut registry = SourceRegistry::new();
        registry.register("echo", |sdp: &str| Ok(sdp.len()));
        assert_eq!(registry.create("echo", "v=0").unwrap(), 3);
        assert!(registry.contains("echo"));
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn unknown_name_is_unavailable() {
        let registry: SourceRegistry<()> = SourceRegistry::new();
        let err = registry.create("vqesrc", "v=0").unwrap_err();
        assert!(matches!(err, VqeError::SourceUnavailable(ref n) if n == "vqesrc"));
        assert!(err.is_fatal());
    }

    #[test]
    fn constructor_errors_propagate() {
        let mut registry: SourceRegistry<()> = SourceRegistry::new();
        registry.register("broken", |_| Err(VqeError::Host("no".into())));
        assert!(matches!(registry.create("broken", ""), Err(VqeError::Host(_))));
    }
}
