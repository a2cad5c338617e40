use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rayon::prelude::*;
use serde::Serialize;

use super::reverse::{ReverseEntry, ReverseIndex};
use crate::cache::envelope::{self, IndexEnvelope};
use crate::error::PersistError;
use crate::graph::Dependency;

/// Hex-encoded xxh3-64 of `bytes`: the staleness fingerprint of a source file.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(bytes))
}

/// Outcome of re-hashing every indexed source against disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    /// Sources whose content changed since they were indexed.
    pub stale_files: Vec<PathBuf>,
    /// Sources that no longer exist (or can no longer be read).
    pub missing_files: Vec<PathBuf>,
}

enum Check {
    Fresh,
    Stale(PathBuf),
    Missing(PathBuf),
}

/// Thread-safe owner of the [`ReverseIndex`] with a runtime on/off switch.
///
/// While disabled, [`ReverseIndexManager::add_dependencies`] is a no-op; queries keep
/// answering from whatever was recorded before.
#[derive(Debug)]
pub struct ReverseIndexManager {
    index: RwLock<ReverseIndex>,
    enabled: AtomicBool,
}

impl Default for ReverseIndexManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ReverseIndexManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            index: RwLock::new(ReverseIndex::new()),
            enabled: AtomicBool::new(enabled),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ReverseIndex> {
        self.index.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ReverseIndex> {
        self.index.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::AcqRel);
        if was != enabled {
            tracing::info!(enabled, "reverse index bookkeeping toggled");
        }
    }

    /// Atomically replace the entries of `source`. Readers see either the old or the
    /// new set, never a mix.
    pub fn add_dependencies(&self, source: &Path, dependencies: &[Dependency], hash: &str) {
        if !self.is_enabled() {
            return;
        }
        self.write().add_dependencies(source, dependencies, hash);
    }

    pub fn remove_source(&self, source: &Path) -> bool {
        self.write().remove_source(source)
    }

    pub fn has_source(&self, source: &Path) -> bool {
        self.read().has_source(source)
    }

    /// Files importing `target`, sorted by source then line.
    pub fn get_referencing_files(&self, target: &Path) -> Vec<ReverseEntry> {
        self.read().referencing(target)
    }

    /// Dependencies recorded for `source` at its last indexing.
    pub fn dependencies_of(&self, source: &Path) -> Option<Vec<Dependency>> {
        self.read().source(source).map(|r| r.dependencies.clone())
    }

    pub fn source_count(&self) -> usize {
        self.read().source_count()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Re-hash every indexed source in parallel and compare with the stored hash.
    /// Never parses.
    pub fn validate(&self) -> ValidationReport {
        let recorded: Vec<(PathBuf, String)> = self
            .read()
            .sources()
            .map(|(path, record)| (path.clone(), record.hash.clone()))
            .collect();

        let checks: Vec<Check> = recorded
            .into_par_iter()
            .map(|(path, hash)| match std::fs::read(&path) {
                Ok(bytes) if content_hash(&bytes) == hash => Check::Fresh,
                Ok(_) => Check::Stale(path),
                Err(_) => Check::Missing(path),
            })
            .collect();

        let mut report = ValidationReport::default();
        for check in checks {
            match check {
                Check::Fresh => {}
                Check::Stale(path) => report.stale_files.push(path),
                Check::Missing(path) => report.missing_files.push(path),
            }
        }
        report.stale_files.sort();
        report.missing_files.sort();
        report.is_valid = report.stale_files.is_empty() && report.missing_files.is_empty();

        if !report.is_valid {
            tracing::warn!(
                stale = report.stale_files.len(),
                missing = report.missing_files.len(),
                "reverse index has outdated entries"
            );
        }
        report
    }

    /// Drop every stale or missing source named by `report`. Returns how many were removed.
    pub fn prune(&self, report: &ValidationReport) -> usize {
        let mut index = self.write();
        report
            .stale_files
            .iter()
            .chain(&report.missing_files)
            .filter(|path| index.remove_source(path))
            .count()
    }

    /// Encode the index into a versioned envelope.
    pub fn serialize(&self, root: &Path) -> Result<Vec<u8>, PersistError> {
        let mut sources: Vec<_> = self
            .read()
            .sources()
            .map(|(path, record)| (path.clone(), record.clone()))
            .collect();
        sources.sort_by(|a, b| a.0.cmp(&b.0));
        envelope::encode(&IndexEnvelope {
            root: root.to_path_buf(),
            sources,
        })
    }

    /// Replace the index content with a blob produced by [`Self::serialize`].
    /// Returns the number of restored sources. On error the index is left untouched.
    pub fn restore(&self, blob: &[u8]) -> Result<usize, PersistError> {
        let envelope = envelope::decode(blob)?;
        let mut rebuilt = ReverseIndex::new();
        for (source, record) in &envelope.sources {
            rebuilt.add_dependencies(source, &record.dependencies, &record.hash);
        }
        let count = rebuilt.source_count();
        *self.write() = rebuilt;
        Ok(count)
    }

    /// Serialize and write to `<root>/.depgraph/reverse-index.bin`.
    pub fn save(&self, root: &Path) -> Result<PathBuf, PersistError> {
        let bytes = self.serialize(root)?;
        let path = envelope::save(root, &bytes)?;
        tracing::info!(path = %path.display(), sources = self.source_count(), "reverse index saved");
        Ok(path)
    }

    /// Restore from `<root>/.depgraph/reverse-index.bin`; `Ok(None)` when no index was saved.
    pub fn load(&self, root: &Path) -> Result<Option<usize>, PersistError> {
        match envelope::load(root)? {
            Some(bytes) => self.restore(&bytes).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyKind;
    use std::fs;

    fn dep(path: &Path) -> Dependency {
        Dependency {
            path: path.to_path_buf(),
            kind: DependencyKind::StaticImport,
            line: 1,
            module: "./x".to_owned(),
            is_external: false,
            is_used: true,
            unused_names: Vec::new(),
        }
    }

    #[test]
    fn test_disabled_index_ignores_adds() {
        let manager = ReverseIndexManager::new(false);
        manager.add_dependencies(Path::new("/a.ts"), &[dep(Path::new("/b.ts"))], "h");
        assert!(manager.get_referencing_files(Path::new("/b.ts")).is_empty());

        manager.set_enabled(true);
        manager.add_dependencies(Path::new("/a.ts"), &[dep(Path::new("/b.ts"))], "h");
        assert_eq!(manager.get_referencing_files(Path::new("/b.ts")).len(), 1);
    }

    #[test]
    fn test_validate_detects_stale_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let fresh = tmp.path().join("fresh.ts");
        let stale = tmp.path().join("stale.ts");
        let gone = tmp.path().join("gone.ts");
        fs::write(&fresh, "a").unwrap();
        fs::write(&stale, "b").unwrap();
        let target = tmp.path().join("t.ts");

        let manager = ReverseIndexManager::default();
        manager.add_dependencies(&fresh, &[dep(&target)], &content_hash(b"a"));
        manager.add_dependencies(&stale, &[dep(&target)], &content_hash(b"old"));
        manager.add_dependencies(&gone, &[dep(&target)], &content_hash(b"c"));

        let report = manager.validate();
        assert!(!report.is_valid);
        assert_eq!(report.stale_files, vec![stale.clone()]);
        assert_eq!(report.missing_files, vec![gone.clone()]);

        assert_eq!(manager.prune(&report), 2);
        let refs = manager.get_referencing_files(&target);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].source, fresh);
        assert!(manager.validate().is_valid);
    }

    #[test]
    fn test_serialize_restore() {
        let manager = ReverseIndexManager::default();
        manager.add_dependencies(Path::new("/a.ts"), &[dep(Path::new("/b.ts"))], "h1");
        manager.add_dependencies(Path::new("/c.ts"), &[dep(Path::new("/b.ts"))], "h2");
        let blob = manager.serialize(Path::new("/")).unwrap();

        let restored = ReverseIndexManager::default();
        assert_eq!(restored.restore(&blob).unwrap(), 2);
        assert_eq!(
            restored.get_referencing_files(Path::new("/b.ts")),
            manager.get_referencing_files(Path::new("/b.ts"))
        );
    }

    #[test]
    fn test_restore_garbage_keeps_existing_state() {
        let manager = ReverseIndexManager::default();
        manager.add_dependencies(Path::new("/a.ts"), &[dep(Path::new("/b.ts"))], "h");
        assert!(manager.restore(&[0xff, 0xff, 0xff]).is_err());
        assert!(manager.has_source(Path::new("/a.ts")));
    }

    #[test]
    fn test_content_hash_is_hex64() {
        let h = content_hash(b"hello");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(h, content_hash(b"hello!"));
    }
}
