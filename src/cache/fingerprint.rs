use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::graph::Dependency;

/// Normalized path → dependency list of the last analysis of that file.
///
/// Entries never expire: only [`FingerprintCache::delete`] or
/// [`FingerprintCache::clear`] force a recomputation. Every mutation bumps
/// [`FingerprintCache::generation`], which keys crawl snapshots.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: RwLock<HashMap<PathBuf, Arc<Vec<Dependency>>>>,
    generation: AtomicU64,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, Arc<Vec<Dependency>>>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, Arc<Vec<Dependency>>>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn get(&self, path: &Path) -> Option<Arc<Vec<Dependency>>> {
        self.read().get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.read().contains_key(path)
    }

    pub fn set(&self, path: PathBuf, dependencies: Vec<Dependency>) -> Arc<Vec<Dependency>> {
        let deps = Arc::new(dependencies);
        self.write().insert(path, Arc::clone(&deps));
        self.bump();
        deps
    }

    /// Remove the entry for `path`; returns whether one existed.
    pub fn delete(&self, path: &Path) -> bool {
        let removed = self.write().remove(path).is_some();
        if removed {
            self.bump();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
        self.bump();
    }

    /// Monotonic mutation counter.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Paths with an entry, unordered.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.read().keys().cloned().collect()
    }
}
