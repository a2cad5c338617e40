//! Graph crawler: bounded dependency graphs around a file, node expansion, reverse
//! lookups and full-workspace indexing.

pub mod cycles;
pub mod status;

pub use cycles::{CycleReport, find_cycle_nodes};
pub use status::{IndexerState, IndexerStatusSnapshot, StatusBroadcaster};

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::analyzer::DependencyAnalyzer;
use crate::cache::FingerprintCache;
use crate::config::ConfigHandle;
use crate::error::{AnalysisError, HostError};
use crate::graph::Dependency;
use crate::host::ParserHost;
use crate::index::ReverseIndexManager;
use crate::paths::normalize_path;
use crate::resolver::{PACKAGE_PREFIX, is_package_path};

/// A file that could not be analyzed during a crawl or index run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    /// Machine-readable error kind, e.g. `FileReadError`.
    pub kind: String,
    pub message: String,
}

impl FileFailure {
    pub fn new(path: &Path, error: &AnalysisError) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: error.kind().to_owned(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GraphEdge {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Mirrors [`Dependency::is_used`] of the import behind the edge.
    pub is_used: bool,
}

impl GraphEdge {
    fn from_dependency(source: &Path, dep: &Dependency) -> Self {
        Self {
            source: source.to_path_buf(),
            target: dep.path.clone(),
            is_used: dep.is_used,
        }
    }
}

/// One page of a crawl.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    /// Nodes of this page in discovery order.
    pub nodes: Vec<PathBuf>,
    /// Edges whose endpoints are both on this page.
    pub edges: Vec<GraphEdge>,
    pub node_labels: HashMap<PathBuf, String>,
    /// Nodes in the whole traversal, across all pages.
    pub total_nodes: usize,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Expansion {
    pub new_nodes: Vec<PathBuf>,
    pub new_edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexingStats {
    pub total: usize,
    pub processed: usize,
    pub failures: Vec<FileFailure>,
    pub cancelled: bool,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Full BFS result for one `(entry, depth, generation)`.
#[derive(Debug)]
struct Traversal {
    nodes: Vec<PathBuf>,
    edges: Vec<GraphEdge>,
    labels: HashMap<PathBuf, String>,
    failures: Vec<FileFailure>,
}

type TraversalKey = (PathBuf, usize, u64);

pub struct Spider {
    analyzer: Arc<DependencyAnalyzer>,
    cache: Arc<FingerprintCache>,
    index: Arc<ReverseIndexManager>,
    host: Arc<ParserHost>,
    config: ConfigHandle,
    status: StatusBroadcaster,
    traversals: Mutex<HashMap<TraversalKey, Arc<Traversal>>>,
    /// Held for the duration of a full index run.
    indexing: tokio::sync::Mutex<()>,
}

impl Spider {
    pub fn new(
        analyzer: Arc<DependencyAnalyzer>,
        cache: Arc<FingerprintCache>,
        index: Arc<ReverseIndexManager>,
        host: Arc<ParserHost>,
        config: ConfigHandle,
    ) -> Self {
        Self {
            analyzer,
            cache,
            index,
            host,
            config,
            status: StatusBroadcaster::default(),
            traversals: Mutex::new(HashMap::new()),
            indexing: tokio::sync::Mutex::new(()),
        }
    }

    pub fn status(&self) -> &StatusBroadcaster {
        &self.status
    }

    // -----------------------------------------------------------------------
    // Crawl
    // -----------------------------------------------------------------------

    /// Bounded BFS from `entry`. `max_depth` defaults to the configured depth; `limit`
    /// and `offset` cut a page out of the memoized traversal.
    pub fn crawl(
        &self,
        entry: &Path,
        max_depth: Option<usize>,
        limit: Option<usize>,
        offset: usize,
    ) -> CrawlResult {
        let entry = normalize_path(entry);
        let depth = max_depth.unwrap_or_else(|| self.config.current().max_depth);
        let traversal = self.traversal(&entry, depth);

        let end = limit.map_or(traversal.nodes.len(), |l| {
            offset.saturating_add(l).min(traversal.nodes.len())
        });
        let page: Vec<PathBuf> = traversal
            .nodes
            .get(offset.min(end)..end)
            .map(<[PathBuf]>::to_vec)
            .unwrap_or_default();
        let on_page: HashSet<&PathBuf> = page.iter().collect();

        let edges = traversal
            .edges
            .iter()
            .filter(|e| on_page.contains(&e.source) && on_page.contains(&e.target))
            .cloned()
            .collect();
        let node_labels = page
            .iter()
            .filter_map(|n| traversal.labels.get(n).map(|l| (n.clone(), l.clone())))
            .collect();

        CrawlResult {
            nodes: page,
            edges,
            node_labels,
            total_nodes: traversal.nodes.len(),
            failures: traversal.failures.clone(),
        }
    }

    fn traversal(&self, entry: &Path, depth: usize) -> Arc<Traversal> {
        let key = (entry.to_path_buf(), depth, self.cache.generation());
        if let Some(hit) = self.lock_traversals().get(&key) {
            return Arc::clone(hit);
        }

        let traversal = Arc::new(self.traverse(entry, depth));
        // Analyzing during the traversal may itself have advanced the generation.
        let generation = self.cache.generation();
        let mut traversals = self.lock_traversals();
        traversals.retain(|(_, _, g), _| *g == generation);
        // Failed files are not cached, so a retry may succeed without any generation bump.
        if traversal.failures.is_empty() {
            traversals.insert((entry.to_path_buf(), depth, generation), Arc::clone(&traversal));
        }
        traversal
    }

    fn lock_traversals(&self) -> std::sync::MutexGuard<'_, HashMap<TraversalKey, Arc<Traversal>>> {
        self.traversals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn traverse(&self, entry: &Path, max_depth: usize) -> Traversal {
        let mut nodes = vec![entry.to_path_buf()];
        let mut visited: HashSet<PathBuf> = nodes.iter().cloned().collect();
        let mut edges = Vec::new();
        let mut failures = Vec::new();
        let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::from([(entry.to_path_buf(), 0)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_depth || is_package_path(&node) {
                continue;
            }
            let analysis = match self.analyzer.analyze(&node) {
                Ok(a) => a,
                Err(err) => {
                    tracing::debug!(file = %node.display(), "crawl failure: {err}");
                    failures.push(FileFailure::new(&node, &err));
                    continue;
                }
            };
            for dep in analysis.dependencies {
                edges.push(GraphEdge::from_dependency(&node, &dep));
                if visited.insert(dep.path.clone()) {
                    nodes.push(dep.path.clone());
                    queue.push_back((dep.path, depth + 1));
                }
            }
        }

        let labels = node_labels(&nodes);
        Traversal {
            nodes,
            edges,
            labels,
            failures,
        }
    }

    /// Expand `path` by `extra_depth` hops (at least one) for a client that already
    /// shows `known`. Known nodes get edges but are neither expanded nor reported new.
    pub fn expand_node(&self, path: &Path, known: &HashSet<PathBuf>, extra_depth: usize) -> Expansion {
        let root = normalize_path(path);
        let extra_depth = extra_depth.max(1);
        let mut expansion = Expansion::default();
        let mut visited = HashSet::from([root.clone()]);
        let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::from([(root.clone(), 0)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= extra_depth || is_package_path(&node) {
                continue;
            }
            if node != root && known.contains(&node) {
                continue;
            }
            let Ok(analysis) = self.analyzer.analyze(&node) else {
                continue;
            };
            for dep in analysis.dependencies {
                expansion.new_edges.push(GraphEdge::from_dependency(&node, &dep));
                if !known.contains(&dep.path) && visited.insert(dep.path.clone()) {
                    expansion.new_nodes.push(dep.path.clone());
                    queue.push_back((dep.path, depth + 1));
                }
            }
        }

        expansion
    }

    /// Files that import `path`, one entry per import, as dependencies whose `path` is
    /// the referencing source. Empty while the reverse index is disabled.
    pub fn find_referencing_files(&self, path: &Path) -> Vec<Dependency> {
        if !self.index.is_enabled() {
            return Vec::new();
        }
        self.index
            .get_referencing_files(&normalize_path(path))
            .into_iter()
            .map(|entry| Dependency {
                path: entry.source,
                kind: entry.kind,
                line: entry.line,
                module: entry.module,
                is_external: false,
                is_used: entry.is_used,
                unused_names: Vec::new(),
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Full index
    // -----------------------------------------------------------------------

    /// Walk the workspace and analyze every supported file through the parser host,
    /// broadcasting progress. Only one run proceeds at a time.
    pub async fn build_full_index(&self, cancel: CancellationToken) -> IndexingStats {
        let _run = self.indexing.lock().await;
        let started = Instant::now();
        if cancel.is_cancelled() {
            self.status.cancelled(0, 0);
            return IndexingStats {
                total: 0,
                processed: 0,
                failures: Vec::new(),
                cancelled: true,
                duration: started.elapsed(),
            };
        }
        self.status.counting();

        let root = self.analyzer.resolver().root().to_path_buf();
        let config = self.config.current();
        let files = match tokio::task::spawn_blocking(move || crate::walker::walk_workspace(&root, &config)).await {
            Ok(files) => files,
            Err(err) => {
                let message = format!("workspace walk failed: {err}");
                tracing::warn!("{message}");
                self.status.error(message);
                return IndexingStats {
                    total: 0,
                    processed: 0,
                    failures: Vec::new(),
                    cancelled: false,
                    duration: started.elapsed(),
                };
            }
        };

        let total = files.len();
        let mut processed = 0;
        let mut failures = Vec::new();
        let mut cancelled = false;
        let mut warned_fallback = false;

        for file in &files {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.status.progress(processed, total, Some(file.clone()));

            let text = match self.analyzer.read_source(file) {
                Ok(text) => text,
                Err(err) => {
                    failures.push(FileFailure::new(file, &err));
                    processed += 1;
                    continue;
                }
            };

            let parsed = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // The request stays with the worker; its response is discarded.
                    cancelled = true;
                    break;
                }
                result = self.host.analyze_file(file, &text, None) => result,
            };

            let imports = match parsed {
                Ok(analysis) => Ok(analysis.imports),
                Err(err @ HostError::Remote { .. }) => Err(AnalysisError::from_host(file.as_path(), err)),
                Err(host_err) => {
                    if !warned_fallback {
                        tracing::warn!("parser host unavailable ({host_err}); parsing in-process");
                        warned_fallback = true;
                    }
                    self.parse_in_process(file, &text)
                }
            };

            match imports {
                Ok(imports) => {
                    self.analyzer.ingest(file, &text, &imports);
                }
                Err(err) => failures.push(FileFailure::new(file, &err)),
            }
            processed += 1;
            tracing::debug!(file = %file.display(), processed, total, "indexed");
        }

        if cancelled {
            self.status.cancelled(processed, total);
            tracing::info!(processed, total, "indexing cancelled");
        } else {
            self.status.complete(processed, total);
            tracing::info!(
                processed,
                failures = failures.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "indexing complete"
            );
        }

        IndexingStats {
            total,
            processed,
            failures,
            cancelled,
            duration: started.elapsed(),
        }
    }

    fn parse_in_process(&self, file: &Path, text: &str) -> crate::error::Result<Vec<crate::parser::RawImport>> {
        match self.analyzer.registry().for_path(file) {
            Some(analyzer) => analyzer.parse_imports(file, text),
            None => Err(AnalysisError::UnsupportedFileType {
                path: file.to_path_buf(),
            }),
        }
    }
}

impl std::fmt::Debug for Spider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spider")
            .field("status", &self.status.current().state)
            .finish_non_exhaustive()
    }
}

/// File names, prefixed with the parent directory when two nodes share a name.
/// Package nodes are labelled with their package name.
fn node_labels(nodes: &[PathBuf]) -> HashMap<PathBuf, String> {
    fn base(path: &Path) -> String {
        if is_package_path(path) {
            let text = path.to_string_lossy();
            return text[PACKAGE_PREFIX.len()..].to_owned();
        }
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for node in nodes {
        *counts.entry(base(node)).or_default() += 1;
    }

    nodes
        .iter()
        .map(|node| {
            let name = base(node);
            let label = match node.parent().and_then(|p| p.file_name()) {
                Some(parent) if counts[&name] > 1 && !is_package_path(node) => {
                    format!("{}/{}", parent.to_string_lossy(), name)
                }
                _ => name,
            };
            (node.clone(), label)
        })
        .collect()
}
