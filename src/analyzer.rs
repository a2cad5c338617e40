use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::cache::FingerprintCache;
use crate::error::{AnalysisError, Result};
use crate::graph::{Dependency, DependencyKind};
use crate::index::{ReverseIndexManager, content_hash};
use crate::parser::{AnalyzerRegistry, RawImport};
use crate::paths::normalize_path;
use crate::resolver::{PathResolver, ResolvedTarget};

/// Where file text comes from. The default reads the disk; an editor integration can
/// serve unsaved buffers instead.
pub trait SourceProvider: Send + Sync {
    fn read(&self, path: &Path) -> std::io::Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsSourceProvider;

impl SourceProvider for FsSourceProvider {
    fn read(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Parsed and resolved just now.
    Analyzed,
    /// Served from the fingerprint cache.
    Cached,
    /// No analyzer is registered for the file's extension.
    Unsupported,
}

/// Result of analyzing one file.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub file: PathBuf,
    pub dependencies: Vec<Dependency>,
    pub status: AnalysisStatus,
    /// Imports that did not resolve (0 for cached results).
    pub unresolved: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalyzerStats {
    pub disk_reads: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Per-file orchestration: read → parse imports → resolve → cache → reverse index.
pub struct DependencyAnalyzer {
    registry: AnalyzerRegistry,
    resolver: Arc<PathResolver>,
    cache: Arc<FingerprintCache>,
    index: Arc<ReverseIndexManager>,
    source: Arc<dyn SourceProvider>,
    path_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    disk_reads: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl DependencyAnalyzer {
    pub fn new(
        registry: AnalyzerRegistry,
        resolver: Arc<PathResolver>,
        cache: Arc<FingerprintCache>,
        index: Arc<ReverseIndexManager>,
    ) -> Self {
        Self::with_source(registry, resolver, cache, index, Arc::new(FsSourceProvider))
    }

    pub fn with_source(
        registry: AnalyzerRegistry,
        resolver: Arc<PathResolver>,
        cache: Arc<FingerprintCache>,
        index: Arc<ReverseIndexManager>,
        source: Arc<dyn SourceProvider>,
    ) -> Self {
        Self {
            registry,
            resolver,
            cache,
            index,
            source,
            path_locks: Mutex::new(HashMap::new()),
            disk_reads: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.registry.is_supported(path)
    }

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self
            .path_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Read file text through the source provider, counting the read.
    pub fn read_source(&self, path: &Path) -> Result<String> {
        self.disk_reads.fetch_add(1, Ordering::Relaxed);
        self.source.read(path).map_err(|source| AnalysisError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Dependencies of `path`, from the cache when present.
    pub fn analyze(&self, path: &Path) -> Result<Analysis> {
        let path = normalize_path(path);
        let Some(analyzer) = self.registry.for_path(&path) else {
            return Ok(Analysis {
                file: path,
                dependencies: Vec::new(),
                status: AnalysisStatus::Unsupported,
                unresolved: 0,
            });
        };

        let lock = self.path_lock(&path);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(deps) = self.cache.get(&path) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            self.refresh_index_record(&path, &deps);
            return Ok(Analysis {
                file: path,
                dependencies: deps.to_vec(),
                status: AnalysisStatus::Cached,
                unresolved: 0,
            });
        }

        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        let text = self.read_source(&path)?;
        let raw = analyzer.parse_imports(&path, &text)?;
        let (dependencies, unresolved) = self.store(&path, &text, &raw);
        tracing::debug!(
            file = %path.display(),
            dependencies = dependencies.len(),
            unresolved,
            "analyzed"
        );
        Ok(Analysis {
            file: path,
            dependencies,
            status: AnalysisStatus::Analyzed,
            unresolved,
        })
    }

    /// Cache hit against an index that has never seen the source: after a restore that
    /// pruned it, or after bookkeeping was re-enabled.
    fn refresh_index_record(&self, path: &Path, deps: &[Dependency]) {
        if !self.index.is_enabled() || self.index.has_source(path) {
            return;
        }
        match self.read_source(path) {
            Ok(text) => self
                .index
                .add_dependencies(path, deps, &content_hash(text.as_bytes())),
            Err(err) => tracing::debug!("skipping index refresh: {err}"),
        }
    }

    /// Resolve, cache and index imports that were parsed elsewhere (the parser host).
    pub fn ingest(&self, path: &Path, text: &str, raw_imports: &[RawImport]) -> Analysis {
        let path = normalize_path(path);
        let lock = self.path_lock(&path);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (dependencies, unresolved) = self.store(&path, text, raw_imports);
        Analysis {
            file: path,
            dependencies,
            status: AnalysisStatus::Analyzed,
            unresolved,
        }
    }

    /// Targets of one raw import with the bindings each accounts for. Python
    /// `from m import a` tries `m.a` first so submodules of namespace packages
    /// resolve, then falls back to `m` itself.
    fn resolve_raw<'r>(&self, path: &Path, raw: &'r RawImport) -> Vec<(ResolvedTarget, Vec<&'r str>)> {
        let mut targets: Vec<(ResolvedTarget, Vec<&'r str>)> = Vec::new();
        for (submodule, binding) in raw.submodules.iter().zip(&raw.bindings) {
            let specifier = format!("{}.{submodule}", raw.module);
            if let Some(target) = self.resolver.resolve(path, &specifier) {
                targets.push((target, vec![binding.as_str()]));
            }
        }
        if targets.is_empty()
            && let Some(target) = self.resolver.resolve(path, &raw.module)
        {
            targets.push((target, raw.bindings.iter().map(String::as_str).collect()));
        }
        targets
    }

    /// Caller holds the path lock.
    fn store(&self, path: &Path, text: &str, raw_imports: &[RawImport]) -> (Vec<Dependency>, usize) {
        let mut positions: HashMap<PathBuf, usize> = HashMap::new();
        let mut dependencies: Vec<Dependency> = Vec::new();
        let mut unresolved = 0;

        for raw in raw_imports {
            let targets = self.resolve_raw(path, raw);
            if targets.is_empty() {
                unresolved += 1;
                continue;
            }
            for (target, bindings) in targets {
                let unused: Vec<String> = bindings
                    .iter()
                    .filter(|b| raw.unused.iter().any(|u| u == *b))
                    .map(|b| (*b).to_owned())
                    .collect();
                let is_used = raw.kind == DependencyKind::ReExport
                    || bindings.is_empty()
                    || unused.len() < bindings.len();
                let dep_path = target.dependency_path();

                // First occurrence wins; later imports of the same target only merge usage.
                if let Some(&at) = positions.get(&dep_path) {
                    let existing = &mut dependencies[at];
                    existing.is_used |= is_used;
                    for name in unused {
                        if !existing.unused_names.contains(&name) {
                            existing.unused_names.push(name);
                        }
                    }
                    continue;
                }
                positions.insert(dep_path.clone(), dependencies.len());
                dependencies.push(Dependency {
                    path: dep_path,
                    kind: raw.kind,
                    line: raw.line,
                    module: raw.module.clone(),
                    is_external: target.is_external(),
                    is_used,
                    unused_names: unused,
                });
            }
        }

        self.cache.set(path.to_path_buf(), dependencies.clone());
        self.index
            .add_dependencies(path, &dependencies, &content_hash(text.as_bytes()));
        (dependencies, unresolved)
    }

    /// Resolve one specifier without touching cache or index.
    pub fn resolve_module_specifier(&self, from: &Path, specifier: &str) -> Option<PathBuf> {
        self.resolver
            .resolve(&normalize_path(from), specifier)
            .map(|target| target.dependency_path())
    }

    /// Drop the cached entry of `path`. Reverse-index entries stay until the file is
    /// analyzed again.
    pub fn invalidate(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        let removed = self.cache.delete(&path);
        if removed {
            let mut locks = self
                .path_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Only the map holds an idle lock; a writer in flight keeps its entry.
            if locks.get(&path).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&path);
            }
        }
        removed
    }

    pub fn stats(&self) -> AnalyzerStats {
        AnalyzerStats {
            disk_reads: self.disk_reads.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for DependencyAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyAnalyzer")
            .field("registry", &self.registry)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
