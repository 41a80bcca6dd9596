//! Trust-chain bindings.
//!
//! Each caller trusts exactly one processor and each processor exactly one
//! verifier. Bindings are set once, checked for cycles when they are made,
//! and persisted so the chain survives restarts.
//!
//! Roles never hold references to each other. A role names its downstream
//! peer by [`Identity`] and resolves it through a [`Directory`] when it
//! needs it.

use crate::error::{ConfigError, Error, Result};
use crate::identity::Identity;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File name of persisted bindings inside the state directory.
pub const BINDINGS_FILE: &str = "bindings.toml";

/// One persisted edge of the trust chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Trusting role.
    pub source: Identity,
    /// Trusted downstream role.
    pub target: Identity,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BindingsFile {
    #[serde(default, rename = "binding")]
    bindings: Vec<Binding>,
}

/// Set-once, acyclic role bindings.
#[derive(Debug, Default)]
pub struct ConfigRegistry {
    bindings: RwLock<HashMap<Identity, Identity>>,
}

impl ConfigRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `source` to `target`.
    ///
    /// Binding the same pair again is a no-op.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::CycleDetected`] if `target`'s chain reaches `source`
    /// - [`ConfigError::AlreadyBound`] if `source` trusts someone else
    pub fn bind(&self, source: &Identity, target: &Identity) -> Result<()> {
        let mut bindings = self.bindings.write();
        Self::check_cycle(&bindings, source, target)?;

        match bindings.get(source) {
            Some(existing) if existing == target => {
                debug!("{source} already bound to {target}");
                Ok(())
            }
            Some(existing) => Err(ConfigError::AlreadyBound {
                source_id: source.clone(),
                existing: existing.clone(),
                requested: target.clone(),
            }
            .into()),
            None => {
                bindings.insert(source.clone(), target.clone());
                info!("Bound {source} -> {target}");
                Ok(())
            }
        }
    }

    /// Replace `source`'s binding, returning the previous target.
    ///
    /// # Errors
    ///
    /// [`ConfigError::CycleDetected`] if the new chain would loop.
    pub fn rebind(&self, source: &Identity, target: &Identity) -> Result<Option<Identity>> {
        let mut bindings = self.bindings.write();
        Self::check_cycle(&bindings, source, target)?;
        let previous = bindings.insert(source.clone(), target.clone());
        if let Some(previous) = &previous {
            warn!("Rebound {source}: {previous} -> {target}");
        }
        Ok(previous)
    }

    /// The role `source` trusts.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Unbound`] if `source` has no binding.
    pub fn resolve(&self, source: &Identity) -> Result<Identity> {
        self.bindings
            .read()
            .get(source)
            .cloned()
            .ok_or_else(|| ConfigError::Unbound(source.clone()).into())
    }

    /// The role `source` trusts, if any.
    #[must_use]
    pub fn get(&self, source: &Identity) -> Option<Identity> {
        self.bindings.read().get(source).cloned()
    }

    /// `origin` followed by every role reachable from it.
    #[must_use]
    pub fn chain(&self, origin: &Identity) -> Vec<Identity> {
        let bindings = self.bindings.read();
        let mut chain = vec![origin.clone()];
        let mut current = origin;
        while let Some(next) = bindings.get(current) {
            // Stop at a repeat so a corrupt map cannot loop forever
            if chain.contains(next) {
                break;
            }
            chain.push(next.clone());
            current = next;
        }
        chain
    }

    /// All bindings, sorted by source.
    #[must_use]
    pub fn bindings(&self) -> Vec<Binding> {
        let mut all: Vec<Binding> = self
            .bindings
            .read()
            .iter()
            .map(|(source, target)| Binding {
                source: source.clone(),
                target: target.clone(),
            })
            .collect();
        all.sort_by(|a, b| a.source.cmp(&b.source));
        all
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Whether no bindings exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Persist all bindings as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = BindingsFile {
            bindings: self.bindings(),
        };
        let content =
            toml::to_string_pretty(&file).map_err(|e| Error::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        debug!("Saved {} bindings to {}", file.bindings.len(), path.display());
        Ok(())
    }

    /// Load bindings persisted by [`save`](Self::save).
    ///
    /// A missing file yields an empty registry. Every loaded binding goes
    /// through [`bind`](Self::bind), so a file describing a cycle is refused.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or describes
    /// an invalid chain.
    pub fn load(path: &Path) -> Result<Self> {
        let registry = Self::new();
        if !path.exists() {
            debug!("No bindings at {}, starting empty", path.display());
            return Ok(registry);
        }
        let content = std::fs::read_to_string(path)?;
        let file: BindingsFile = toml::from_str(&content)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
        for binding in &file.bindings {
            registry.bind(&binding.source, &binding.target)?;
        }
        info!("Restored {} bindings from {}", registry.len(), path.display());
        Ok(registry)
    }

    fn check_cycle(
        bindings: &HashMap<Identity, Identity>,
        source: &Identity,
        target: &Identity,
    ) -> Result<()> {
        let cycle = || {
            Error::from(ConfigError::CycleDetected {
                source_id: source.clone(),
                target: target.clone(),
            })
        };
        let mut seen = HashSet::new();
        let mut current = target;
        loop {
            if current == source {
                return Err(cycle());
            }
            if !seen.insert(current) {
                return Err(cycle());
            }
            match bindings.get(current) {
                Some(next) => current = next,
                None => return Ok(()),
            }
        }
    }
}

/// Live components of one role type, keyed by identity.
#[derive(Debug)]
pub struct Directory<T> {
    entries: RwLock<HashMap<Identity, Arc<T>>>,
}

impl<T> Default for Directory<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Directory<T> {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live component, replacing any previous one.
    pub fn register(&self, identity: Identity, component: Arc<T>) {
        debug!("Registered live component {identity}");
        self.entries.write().insert(identity, component);
    }

    /// Remove a component.
    pub fn unregister(&self, identity: &Identity) -> Option<Arc<T>> {
        self.entries.write().remove(identity)
    }

    /// The live component for `identity`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotLive`] if nothing is registered under `identity`.
    pub fn lookup(&self, identity: &Identity) -> Result<Arc<T>> {
        self.entries
            .read()
            .get(identity)
            .cloned()
            .ok_or_else(|| ConfigError::NotLive(identity.clone()).into())
    }

    /// Whether `identity` is registered.
    #[must_use]
    pub fn contains(&self, identity: &Identity) -> bool {
        self.entries.read().contains_key(identity)
    }
}
