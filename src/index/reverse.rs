use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::graph::{Dependency, DependencyKind};

/// One file referencing a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseEntry {
    pub source: PathBuf,
    /// 1-based line of the import in `source`.
    pub line: usize,
    pub kind: DependencyKind,
    pub module: String,
    /// Whether `source` uses anything the import binds.
    pub is_used: bool,
    /// Content hash of `source` when it was indexed.
    pub source_hash: String,
}

/// What was recorded for one source: its hash and its dependency list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub hash: String,
    pub dependencies: Vec<Dependency>,
}

/// Target → referencing sources, plus the forward record of every source so a
/// re-analysis can drop exactly the entries it replaces.
#[derive(Debug, Default)]
pub struct ReverseIndex {
    by_target: HashMap<PathBuf, HashMap<PathBuf, Vec<ReverseEntry>>>,
    sources: HashMap<PathBuf, SourceRecord>,
}

impl ReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything recorded for `source` with `dependencies`.
    pub fn add_dependencies(&mut self, source: &Path, dependencies: &[Dependency], hash: &str) {
        self.remove_source(source);

        for dep in dependencies {
            self.by_target
                .entry(dep.path.clone())
                .or_default()
                .entry(source.to_path_buf())
                .or_default()
                .push(ReverseEntry {
                    source: source.to_path_buf(),
                    line: dep.line,
                    kind: dep.kind,
                    module: dep.module.clone(),
                    is_used: dep.is_used,
                    source_hash: hash.to_owned(),
                });
        }
        self.sources.insert(
            source.to_path_buf(),
            SourceRecord {
                hash: hash.to_owned(),
                dependencies: dependencies.to_vec(),
            },
        );
    }

    /// Drop `source` and all entries it contributed. Returns whether it was indexed.
    pub fn remove_source(&mut self, source: &Path) -> bool {
        let Some(record) = self.sources.remove(source) else {
            return false;
        };
        for dep in &record.dependencies {
            if let Some(referrers) = self.by_target.get_mut(&dep.path) {
                referrers.remove(source);
                if referrers.is_empty() {
                    self.by_target.remove(&dep.path);
                }
            }
        }
        true
    }

    /// Entries pointing at `target`, sorted by source then line.
    pub fn referencing(&self, target: &Path) -> Vec<ReverseEntry> {
        let mut entries: Vec<ReverseEntry> = self
            .by_target
            .get(target)
            .into_iter()
            .flat_map(|referrers| referrers.values().flatten().cloned())
            .collect();
        entries.sort_by(|a, b| a.source.cmp(&b.source).then(a.line.cmp(&b.line)));
        entries
    }

    pub fn has_source(&self, source: &Path) -> bool {
        self.sources.contains_key(source)
    }

    pub fn source(&self, source: &Path) -> Option<&SourceRecord> {
        self.sources.get(source)
    }

    pub fn sources(&self) -> impl Iterator<Item = (&PathBuf, &SourceRecord)> {
        self.sources.iter()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn target_count(&self) -> usize {
        self.by_target.len()
    }

    pub fn clear(&mut self) {
        self.by_target.clear();
        self.sources.clear();
    }
}
