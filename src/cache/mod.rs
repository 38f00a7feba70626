//! Per-session assembly cache.
//!
//! Every assembly a weave session touches is opened exactly once and shared
//! through the cache, keyed by canonical absolute path. Resolution of foreign
//! references goes through the same cache, so one assembly never exists twice
//! with diverging identity inside a session. The cache is session state; it
//! is never shared across sessions.

mod resolver;

pub use resolver::{AssemblyResolver, CONTAINER_EXTENSION};

use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use dashmap::DashMap;

use crate::{format::read_assembly, metadata::module::AssemblyDef, Error, Result};

/// Shared handle to a cached, mutable assembly definition.
pub type AssemblyHandle = Arc<RwLock<AssemblyDef>>;

/// One cached assembly. The simple name is captured at load time so name
/// lookups never have to lock the definition; the definition of the module
/// currently being woven is write-locked for the whole visit.
struct CacheEntry {
    name: String,
    handle: AssemblyHandle,
}

/// Cache of opened assembly definitions, keyed by canonical absolute path.
pub struct AssemblyCache {
    entries: DashMap<PathBuf, CacheEntry>,
}

impl AssemblyCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        AssemblyCache {
            entries: DashMap::new(),
        }
    }

    /// Loads the assembly at `path`, or returns the cached handle.
    ///
    /// At most one parse happens per path per session; repeated loads of the
    /// same canonical path return the same handle until it is invalidated
    /// with [`AssemblyCache::remove`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the path does not exist,
    /// [`Error::NotManaged`] for foreign file formats, and the reader's
    /// [`Error::Malformed`] variants for corrupted containers.
    pub fn load(&self, path: &Path) -> Result<AssemblyHandle> {
        let canonical = canonicalize(path)?;

        if let Some(existing) = self.entries.get(&canonical) {
            return Ok(Arc::clone(&existing.value().handle));
        }

        tracing::debug!(path = %canonical.display(), "loading assembly");
        let mut assembly = read_assembly(&canonical)?;
        assembly.source_path = Some(canonical.clone());
        let name = assembly.name.clone();

        let handle: AssemblyHandle = Arc::new(RwLock::new(assembly));
        self.entries.insert(
            canonical,
            CacheEntry {
                name,
                handle: Arc::clone(&handle),
            },
        );
        Ok(handle)
    }

    /// Whether an assembly loaded from `path` is cached.
    #[must_use]
    pub fn has(&self, path: &Path) -> bool {
        canonicalize(path)
            .map(|canonical| self.entries.contains_key(&canonical))
            .unwrap_or(false)
    }

    /// Evicts the assembly loaded from `path`, releasing this cache's handle.
    ///
    /// Returns `false` without failing if the path was not cached.
    pub fn remove(&self, path: &Path) -> bool {
        match canonicalize(path) {
            Ok(canonical) => self.entries.remove(&canonical).is_some(),
            Err(_) => false,
        }
    }

    /// Evicts all cached assemblies.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached assemblies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Directories of all cached assemblies, used to seed resolver search.
    #[must_use]
    pub fn loaded_directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .entries
            .iter()
            .filter_map(|entry| entry.key().parent().map(Path::to_path_buf))
            .collect();
        dirs.dedup();
        dirs
    }

    /// Finds a cached assembly by simple name, without touching its lock.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<AssemblyHandle> {
        self.entries
            .iter()
            .find(|entry| entry.value().name == name)
            .map(|entry| Arc::clone(&entry.value().handle))
    }
}

impl Default for AssemblyCache {
    fn default() -> Self {
        AssemblyCache::new()
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    Ok(path.canonicalize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_path() {
        let cache = AssemblyCache::new();
        let result = cache.load(Path::new("/nonexistent/Missing.cwa"));
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_has_and_remove_missing() {
        let cache = AssemblyCache::new();
        assert!(!cache.has(Path::new("/nonexistent/Missing.cwa")));
        // Removal of an absent entry fails silently.
        assert!(!cache.remove(Path::new("/nonexistent/Missing.cwa")));
    }

    #[test]
    fn test_by_name_on_empty_cache() {
        let cache = AssemblyCache::new();
        assert!(cache.by_name("App").is_none());
    }
}
