//! Capability Registry
//!
//! Built once at startup from the capability directory and never mutated
//! afterwards. Requests share it through an `Arc`; [`SharedRegistry`] lets an
//! administrator swap in a freshly bootstrapped registry while requests that
//! already hold a snapshot finish against the old one.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::{Capability, CapabilityDeclaration, CapabilityId};
use crate::error::BootstrapError;

/// Optional allow/deny lists applied after hidden entries are dropped
#[derive(Debug, Clone, Default)]
pub struct CapabilityFilter {
    pub allow: Option<Vec<String>>,
    pub deny: Vec<String>,
}

impl CapabilityFilter {
    pub fn permits(&self, name: &str) -> bool {
        if is_hidden(name) {
            return false;
        }
        if let Some(allow) = &self.allow {
            if !allow.iter().any(|a| a == name) {
                return false;
            }
        }
        !self.deny.iter().any(|d| d == name)
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// Name of a directory entry; files and unreadable entries yield `None`
fn directory_name(entry: std::io::Result<std::fs::DirEntry>) -> Option<String> {
    let entry = match entry {
        Ok(entry) => entry,
        Err(e) => {
            warn!("Skipping unreadable capability entry: {}", e);
            return None;
        }
    };

    match entry.file_type() {
        Ok(t) if t.is_dir() => Some(entry.file_name().to_string_lossy().into_owned()),
        Ok(_) => None,
        Err(e) => {
            warn!("Skipping capability entry {:?}: {}", entry.file_name(), e);
            None
        }
    }
}

/// A loaded capability
#[derive(Clone)]
pub struct RegisteredCapability {
    pub declaration: CapabilityDeclaration,
    pub handler: Arc<dyn Capability>,
}

/// Immutable name → capability mapping
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: BTreeMap<String, RegisteredCapability>,
}

impl CapabilityRegistry {
    /// Scan `root` for capability directories.
    ///
    /// Only an unreadable root is an error. Entries that cannot be loaded are
    /// logged and skipped.
    pub fn bootstrap(root: &Path, filter: &CapabilityFilter) -> Result<Self, BootstrapError> {
        let unreadable = |source| BootstrapError::Unreadable {
            path: root.to_path_buf(),
            source,
        };

        let mut names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(root).map_err(unreadable)? {
            let Some(name) = directory_name(entry) else {
                continue;
            };
            if filter.permits(&name) {
                names.push(name);
            } else {
                debug!("Skipping capability entry '{}'", name);
            }
        }
        names.sort();

        info!("Capability entries in {}: {:?}", root.display(), names);

        let mut registry = Self::default();
        for name in names {
            let id = match name.parse::<CapabilityId>() {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping '{}': {}", name, e);
                    continue;
                }
            };

            let handler = match id.instantiate() {
                Ok(handler) => handler,
                Err(e) => {
                    error!("Error loading capability '{}': {}", name, e);
                    continue;
                }
            };

            registry.insert_checked(&name, handler);
        }

        info!("Loaded {} capabilities", registry.len());
        Ok(registry)
    }

    /// Build directly from handler instances. Duplicate names keep the first.
    pub fn from_capabilities<I>(handlers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Capability>>,
    {
        let mut registry = Self::default();
        for handler in handlers {
            let name = handler.declaration().name;
            registry.insert_checked(&name, handler);
        }
        registry
    }

    /// Every built-in capability permitted by `filter`
    pub fn builtin(filter: &CapabilityFilter) -> Self {
        let handlers = CapabilityId::ALL
            .into_iter()
            .filter(|id| filter.permits(id.as_str()))
            .filter_map(|id| match id.instantiate() {
                Ok(handler) => Some(handler),
                Err(e) => {
                    error!("Error loading capability '{}': {}", id, e);
                    None
                }
            });
        Self::from_capabilities(handlers)
    }

    fn insert_checked(&mut self, name: &str, handler: Arc<dyn Capability>) {
        let declaration = handler.declaration();
        if declaration.name != name {
            warn!(
                "Skipping '{}': declaration names itself '{}'",
                name, declaration.name
            );
            return;
        }
        if self.entries.contains_key(name) {
            warn!("Duplicate capability '{}' ignored", name);
            return;
        }
        info!("Registered capability: {}", name);
        self.entries.insert(
            name.to_string(),
            RegisteredCapability {
                declaration,
                handler,
            },
        );
    }

    /// Declaration for `name`
    pub fn lookup(&self, name: &str) -> Option<&CapabilityDeclaration> {
        self.entries.get(name).map(|e| &e.declaration)
    }

    /// Handler for `name`
    pub fn handler(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.entries.get(name).map(|e| e.handler.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Declarations for `names`, in the order given. Unknown names and
    /// repeats are dropped.
    pub fn declarations_for<S: AsRef<str>>(&self, names: &[S]) -> Vec<CapabilityDeclaration> {
        let mut seen = HashSet::new();
        names
            .iter()
            .map(|n| n.as_ref())
            .filter(|n| seen.insert(*n))
            .filter_map(|n| {
                let decl = self.lookup(n).cloned();
                if decl.is_none() {
                    debug!("No capability named '{}'", n);
                }
                decl
            })
            .collect()
    }

    /// All declarations, sorted by name
    pub fn declarations(&self) -> Vec<CapabilityDeclaration> {
        self.entries.values().map(|e| e.declaration.clone()).collect()
    }

    /// All names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}

/// Swappable handle to the current registry
#[derive(Clone, Debug)]
pub struct SharedRegistry {
    inner: Arc<RwLock<Arc<CapabilityRegistry>>>,
}

impl SharedRegistry {
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// Snapshot for one request
    pub fn current(&self) -> Arc<CapabilityRegistry> {
        self.inner.read().clone()
    }

    /// Bootstrap a new registry and swap it in. On failure the current one
    /// stays in place.
    pub fn reload(&self, root: &Path, filter: &CapabilityFilter) -> Result<usize, BootstrapError> {
        let fresh = CapabilityRegistry::bootstrap(root, filter)?;
        let count = fresh.len();
        self.replace(fresh);
        Ok(count)
    }

    pub fn replace(&self, registry: CapabilityRegistry) {
        *self.inner.write() = Arc::new(registry);
        info!("Capability registry swapped");
    }
}
