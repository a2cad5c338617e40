//! The engine facade: owns every piece of shared state and exposes the query surface.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::analyzer::{Analysis, DependencyAnalyzer};
use crate::cache::FingerprintCache;
use crate::callgraph::{CallHierarchyProvider, IntraFileGraph, SymbolGraph, SymbolGraphService};
use crate::config::{ConfigHandle, EngineConfig};
use crate::error::{AnalysisError, HostError, PersistError, Result};
use crate::graph::Dependency;
use crate::host::ParserHost;
use crate::index::{ReverseIndexManager, ValidationReport};
use crate::language::LanguageKind;
use crate::parser::signatures::{
    InterfaceMember, Signature, SignatureDiff, diff_signature_sets, extract_interface_members,
};
use crate::parser::{AnalyzerRegistry, parse_tree};
use crate::paths::normalize_path;
use crate::resolver::PathResolver;
use crate::spider::{CrawlResult, Expansion, IndexerStatusSnapshot, IndexingStats, Spider};
use crate::walker::walk_workspace;
use crate::watcher::{WatchEvent, WatcherHandle, start_watcher};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub invalidated: Vec<PathBuf>,
    pub not_found: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub restored: usize,
    pub pruned: usize,
    pub validation: ValidationReport,
}

/// Signature changes of one file plus everyone who imports it.
#[derive(Debug, Clone, Serialize)]
pub struct BreakingChangeReport {
    pub file: PathBuf,
    pub diffs: Vec<SignatureDiff>,
    pub breaking: Vec<SignatureDiff>,
    pub referencing_files: Vec<Dependency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WatchOutcome {
    Reanalyzed { path: PathBuf, dependencies: usize },
    Removed { path: PathBuf },
    ConfigReloaded,
    Ignored,
}

pub struct Engine {
    root: PathBuf,
    config: ConfigHandle,
    cache: Arc<FingerprintCache>,
    index: Arc<ReverseIndexManager>,
    analyzer: Arc<DependencyAnalyzer>,
    host: Arc<ParserHost>,
    spider: Arc<Spider>,
    symbols: SymbolGraphService,
    indexing: Mutex<CancellationToken>,
}

impl Engine {
    /// Engine for the workspace at `root`, configured from its `depgraph.toml`.
    pub fn open(root: &Path) -> Self {
        let root = normalize_path(root);
        let config = EngineConfig::load(&root);
        Self::new(&root, config)
    }

    pub fn new(root: &Path, config: EngineConfig) -> Self {
        Self::with_host(root, config, ParserHost::default())
    }

    /// Engine whose heavy parsing goes through `host`.
    pub fn with_host(root: &Path, config: EngineConfig, host: ParserHost) -> Self {
        let root = normalize_path(root);
        let reverse_index = config.reverse_index;
        let config = ConfigHandle::new(config);
        let cache = Arc::new(FingerprintCache::new());
        let index = Arc::new(ReverseIndexManager::new(reverse_index));
        let resolver = Arc::new(PathResolver::new(&root, config.clone()));
        let analyzer = Arc::new(DependencyAnalyzer::new(
            AnalyzerRegistry::with_defaults(),
            resolver,
            Arc::clone(&cache),
            Arc::clone(&index),
        ));
        let host = Arc::new(host);
        let spider = Arc::new(Spider::new(
            Arc::clone(&analyzer),
            Arc::clone(&cache),
            Arc::clone(&index),
            Arc::clone(&host),
            config.clone(),
        ));
        let symbols = SymbolGraphService::new(Arc::clone(&analyzer), Arc::clone(&host));

        Self {
            root,
            config,
            cache,
            index,
            analyzer,
            host,
            spider,
            symbols,
            indexing: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn analyzer(&self) -> &DependencyAnalyzer {
        &self.analyzer
    }

    // -----------------------------------------------------------------------
    // Dependency queries
    // -----------------------------------------------------------------------

    pub fn analyze_dependencies(&self, path: &Path) -> Result<Analysis> {
        self.analyzer.analyze(path)
    }

    pub fn crawl_dependency_graph(
        &self,
        entry: &Path,
        max_depth: Option<usize>,
        limit: Option<usize>,
        offset: usize,
    ) -> CrawlResult {
        self.spider.crawl(entry, max_depth, limit, offset)
    }

    pub fn find_referencing_files(&self, path: &Path) -> Vec<Dependency> {
        self.spider.find_referencing_files(path)
    }

    pub fn expand_node(&self, path: &Path, known: &HashSet<PathBuf>, extra_depth: usize) -> Expansion {
        self.spider.expand_node(path, known, extra_depth)
    }

    // -----------------------------------------------------------------------
    // Symbol graphs
    // -----------------------------------------------------------------------

    pub async fn get_symbol_graph(&self, path: &Path) -> Result<SymbolGraph> {
        self.symbols.symbol_graph(path).await
    }

    pub async fn build_intra_file_graph(
        &self,
        path: &Path,
        provider: &dyn CallHierarchyProvider,
        timeout: Duration,
        include_incoming: bool,
    ) -> Result<IntraFileGraph> {
        self.symbols
            .intra_file_graph(path, provider, timeout, include_incoming)
            .await
    }

    // -----------------------------------------------------------------------
    // Indexing
    // -----------------------------------------------------------------------

    pub fn get_index_status(&self) -> IndexerStatusSnapshot {
        self.spider.status().current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<IndexerStatusSnapshot> {
        self.spider.status().subscribe()
    }

    /// Drop cached analyses for `paths`. Files that no longer exist also leave the
    /// reverse index.
    pub fn invalidate_files<P: AsRef<Path>>(&self, paths: &[P]) -> InvalidationReport {
        let mut report = InvalidationReport::default();
        for path in paths {
            let path = normalize_path(path.as_ref());
            let mut known = self.analyzer.invalidate(&path);
            if !path.exists() {
                known |= self.index.remove_source(&path);
            } else {
                known |= self.index.has_source(&path);
            }
            if known {
                report.invalidated.push(path);
            } else {
                report.not_found.push(path);
            }
        }
        tracing::debug!(
            invalidated = report.invalidated.len(),
            not_found = report.not_found.len(),
            "cache invalidated"
        );
        report
    }

    /// Replace the current cancellation token, cancelling any run that holds it.
    fn fresh_token(&self) -> CancellationToken {
        let mut slot = self
            .indexing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.cancel();
        *slot = CancellationToken::new();
        slot.clone()
    }

    /// Full workspace index run; the index is saved afterwards when persistence is on.
    pub async fn rebuild_index(&self) -> IndexingStats {
        let token = self.fresh_token();
        let stats = self.spider.build_full_index(token).await;
        if !stats.cancelled
            && let Err(err) = self.persist_index()
        {
            tracing::warn!("failed to persist reverse index: {err}");
        }
        stats
    }

    /// Schedule a full index run after the configured delay. `None` when background
    /// indexing is disabled.
    pub fn start_background_indexing(self: &Arc<Self>) -> Option<JoinHandle<IndexingStats>> {
        let config = self.config.current();
        if !config.enable_background_indexing {
            tracing::info!("background indexing disabled");
            return None;
        }
        let token = self.fresh_token();
        let delay = config.indexing_start_delay();
        let engine = Arc::clone(self);

        Some(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
            // A token cancelled during the delay makes the run return immediately.
            let stats = engine.spider.build_full_index(token).await;
            if !stats.cancelled
                && let Err(err) = engine.persist_index()
            {
                tracing::warn!("failed to persist reverse index: {err}");
            }
            stats
        }))
    }

    /// Ask the current index run to stop after the file in progress.
    pub fn cancel_indexing(&self) {
        self.indexing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .cancel();
    }

    // -----------------------------------------------------------------------
    // Signatures
    // -----------------------------------------------------------------------

    pub async fn extract_signatures(&self, path: &Path) -> Result<Vec<Signature>> {
        let path = normalize_path(path);
        let text = self.analyzer.read_source(&path)?;
        self.signatures_of(&path, &text).await
    }

    pub async fn extract_interface_members(&self, path: &Path) -> Result<Vec<InterfaceMember>> {
        let path = normalize_path(path);
        let text = self.analyzer.read_source(&path)?;
        match self.host.extract_interface_members(&path, &text, None).await {
            Ok(members) => Ok(members),
            Err(err @ HostError::Remote { .. }) => Err(AnalysisError::from_host(&path, err)),
            Err(err) => {
                tracing::warn!("parser host unavailable ({err}); parsing in-process");
                let kind = language_of(&path)?;
                let tree = parse_tree(kind, &path, text.as_bytes())?;
                Ok(extract_interface_members(&tree, text.as_bytes(), kind))
            }
        }
    }

    async fn signatures_of(&self, path: &Path, text: &str) -> Result<Vec<Signature>> {
        match self.host.extract_signatures(path, text, None).await {
            Ok(signatures) => Ok(signatures),
            Err(err @ HostError::Remote { .. }) => Err(AnalysisError::from_host(path, err)),
            Err(err) => {
                tracing::warn!("parser host unavailable ({err}); parsing in-process");
                let kind = language_of(path)?;
                let tree = parse_tree(kind, path, text.as_bytes())?;
                Ok(crate::parser::signatures::extract_signatures(
                    &tree,
                    text.as_bytes(),
                    kind,
                ))
            }
        }
    }

    pub async fn compare_signatures(&self, old: Vec<Signature>, new: Vec<Signature>) -> Vec<SignatureDiff> {
        match self.host.compare_signatures(old.clone(), new.clone()).await {
            Ok(diffs) => diffs,
            Err(err) => {
                tracing::debug!("comparing signatures in-process: {err}");
                diff_signature_sets(&old, &new)
            }
        }
    }

    /// Diff the signatures of two versions of `path` and list the files that import it.
    pub async fn breaking_changes(
        &self,
        path: &Path,
        old_text: &str,
        new_text: &str,
    ) -> Result<BreakingChangeReport> {
        let path = normalize_path(path);
        let old = self.signatures_of(&path, old_text).await?;
        let new = self.signatures_of(&path, new_text).await?;
        let diffs = self.compare_signatures(old, new).await;
        let breaking = diffs.iter().filter(|d| d.is_breaking()).cloned().collect();
        let referencing_files = self.find_referencing_files(&path);
        Ok(BreakingChangeReport {
            file: path,
            diffs,
            breaking,
            referencing_files,
        })
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Save the reverse index. `Ok(None)` when persistence is disabled.
    pub fn persist_index(&self) -> std::result::Result<Option<PathBuf>, PersistError> {
        if !self.config.current().persist_index {
            return Ok(None);
        }
        self.index.save(&self.root).map(Some)
    }

    /// Load the saved reverse index, then drop every source whose file changed or
    /// disappeared since it was saved. `Ok(None)` when nothing was saved.
    pub fn restore_persisted_index(&self) -> std::result::Result<Option<RestoreReport>, PersistError> {
        if !self.config.current().persist_index {
            return Ok(None);
        }
        let Some(restored) = self.index.load(&self.root)? else {
            return Ok(None);
        };
        let validation = self.index.validate();
        let pruned = self.index.prune(&validation);
        tracing::info!(restored, pruned, "reverse index restored");
        Ok(Some(RestoreReport {
            restored,
            pruned,
            validation,
        }))
    }

    /// Bring the reverse index up to date without a full run: restore the saved
    /// index, then analyze every workspace file it does not cover. Returns the number
    /// of files analyzed.
    pub fn warm_index(&self) -> usize {
        if let Err(err) = self.restore_persisted_index() {
            tracing::warn!("ignoring unreadable saved index: {err}");
        }
        let config = self.config.current();
        let mut analyzed = 0;
        for file in walk_workspace(&self.root, &config) {
            if self.index.has_source(&file) {
                continue;
            }
            analyzed += 1;
            if let Err(err) = self.analyzer.analyze(&file) {
                tracing::debug!("skipping {}: {err}", file.display());
            }
        }
        if analyzed > 0
            && let Err(err) = self.persist_index()
        {
            tracing::warn!("failed to persist reverse index: {err}");
        }
        tracing::info!(analyzed, indexed = self.index.source_count(), "index warmed");
        analyzed
    }

    // -----------------------------------------------------------------------
    // Configuration and file events
    // -----------------------------------------------------------------------

    /// Mutate the configuration. Index bookkeeping toggles immediately; resolution
    /// settings drop the resolver and fingerprint caches.
    pub fn apply_config(&self, update: impl FnOnce(&mut EngineConfig)) {
        let before = self.config.current();
        self.config.update(update);
        let after = self.config.current();

        if before.reverse_index != after.reverse_index {
            self.index.set_enabled(after.reverse_index);
        }
        let resolution_changed = before.aliases != after.aliases
            || before.exclude_node_modules != after.exclude_node_modules
            || before.external_packages != after.external_packages;
        if resolution_changed {
            self.analyzer.resolver().clear_cache();
            self.cache.clear();
            tracing::info!("resolution settings changed; dependency cache cleared");
        }
    }

    pub fn handle_watch_event(&self, event: &WatchEvent) -> WatchOutcome {
        match event {
            WatchEvent::Modified(path) => {
                self.invalidate_files(&[path]);
                match self.analyzer.analyze(path) {
                    Ok(analysis) => WatchOutcome::Reanalyzed {
                        path: analysis.file,
                        dependencies: analysis.dependencies.len(),
                    },
                    Err(err) => {
                        tracing::debug!("re-analysis after change failed: {err}");
                        WatchOutcome::Ignored
                    }
                }
            }
            WatchEvent::Deleted(path) => {
                let report = self.invalidate_files(&[path]);
                match report.invalidated.into_iter().next() {
                    Some(path) => WatchOutcome::Removed { path },
                    None => WatchOutcome::Ignored,
                }
            }
            WatchEvent::ConfigChanged(path) => {
                tracing::info!(file = %path.display(), "configuration changed; reloading");
                let reloaded = EngineConfig::load(&self.root);
                self.apply_config(|cfg| *cfg = reloaded);
                // Manifests and tsconfig are read by the resolver, not the config.
                self.analyzer.resolver().clear_cache();
                self.cache.clear();
                WatchOutcome::ConfigReloaded
            }
        }
    }

    /// [`Engine::handle_watch_event`] on the blocking pool, off the async workers.
    pub async fn apply_watch_event(self: &Arc<Self>, event: WatchEvent) -> WatchOutcome {
        let engine = Arc::clone(self);
        match tokio::task::spawn_blocking(move || engine.handle_watch_event(&event)).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!("watch event handler failed: {err}");
                WatchOutcome::Ignored
            }
        }
    }

    /// Watch the workspace and apply every change until the returned handle is dropped.
    pub fn watch(self: &Arc<Self>) -> anyhow::Result<WatcherHandle> {
        let (handle, mut events) = start_watcher(&self.root, &self.config.current())?;
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let outcome = engine.apply_watch_event(event).await;
                tracing::debug!(?outcome, "watch event applied");
            }
        });
        Ok(handle)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.root)
            .field("cached_files", &self.cache.len())
            .field("indexed_sources", &self.index.source_count())
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

fn language_of(path: &Path) -> Result<LanguageKind> {
    LanguageKind::from_path(path).ok_or_else(|| AnalysisError::UnsupportedFileType {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spider::IndexerState;
    use std::fs;

    fn quiet() -> EngineConfig {
        EngineConfig {
            enable_background_indexing: false,
            ..EngineConfig::default()
        }
    }

    fn workspace() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("main.ts"), "import { add } from './math';\nadd(1, 2);\n").unwrap();
        fs::write(
            root.join("math.ts"),
            "export function add(a: number, b: number): number { return a + b; }\n",
        )
        .unwrap();
        tmp
    }

    #[test]
    fn test_invalidate_reports_unknown_paths() {
        let tmp = workspace();
        let engine = Engine::new(tmp.path(), quiet());
        engine.analyze_dependencies(&tmp.path().join("main.ts")).unwrap();

        let report = engine.invalidate_files(&[tmp.path().join("main.ts"), tmp.path().join("nope.ts")]);
        assert_eq!(report.invalidated, vec![normalize_path(&tmp.path().join("main.ts"))]);
        assert_eq!(report.not_found, vec![normalize_path(&tmp.path().join("nope.ts"))]);
    }

    #[test]
    fn test_reverse_index_toggle_is_immediate() {
        let tmp = workspace();
        let engine = Engine::new(tmp.path(), quiet());
        engine.analyze_dependencies(&tmp.path().join("main.ts")).unwrap();
        assert_eq!(engine.find_referencing_files(&tmp.path().join("math.ts")).len(), 1);

        engine.apply_config(|cfg| cfg.reverse_index = false);
        assert!(engine.find_referencing_files(&tmp.path().join("math.ts")).is_empty());
    }

    #[tokio::test]
    async fn test_persist_and_restore_prunes_changed_files() {
        let tmp = workspace();
        let root = tmp.path();
        {
            let engine = Engine::new(root, quiet());
            let stats = engine.rebuild_index().await;
            assert_eq!(stats.processed, 2);
            assert!(root.join(".depgraph/reverse-index.bin").exists());
        }

        fs::write(root.join("main.ts"), "// rewritten\n").unwrap();
        let engine = Engine::new(root, quiet());
        let report = engine.restore_persisted_index().unwrap().unwrap();
        assert_eq!(report.restored, 2);
        assert_eq!(report.pruned, 1);
        assert_eq!(report.validation.stale_files, vec![normalize_path(&root.join("main.ts"))]);
        assert!(engine.find_referencing_files(&root.join("math.ts")).is_empty());
    }

    #[tokio::test]
    async fn test_warm_index_only_analyzes_uncovered_files() {
        let tmp = workspace();
        let root = tmp.path();
        Engine::new(root, quiet()).rebuild_index().await;

        fs::write(root.join("extra.ts"), "import './math';\n").unwrap();
        let engine = Engine::new(root, quiet());
        assert_eq!(engine.warm_index(), 1);
        assert_eq!(engine.find_referencing_files(&root.join("math.ts")).len(), 2);
        assert_eq!(engine.analyzer().stats().cache_misses, 1);
    }

    #[tokio::test]
    async fn test_background_indexing_honors_flag_and_cancel() {
        let tmp = workspace();
        let disabled = Arc::new(Engine::new(tmp.path(), quiet()));
        assert!(disabled.start_background_indexing().is_none());

        let config = EngineConfig {
            indexing_start_delay_ms: 10_000,
            persist_index: false,
            ..EngineConfig::default()
        };
        let engine = Arc::new(Engine::new(tmp.path(), config));
        let handle = engine.start_background_indexing().unwrap();
        engine.cancel_indexing();
        let stats = handle.await.unwrap();
        assert!(stats.cancelled);
        assert_eq!(engine.get_index_status().state, IndexerState::Idle);
    }

    #[tokio::test]
    async fn test_breaking_changes_lists_importers() {
        let tmp = workspace();
        let engine = Engine::new(tmp.path(), quiet());
        engine.analyze_dependencies(&tmp.path().join("main.ts")).unwrap();

        let old = "export function add(a: number, b: number): number { return a + b; }\n";
        let new = "export function add(a: number, b: number, c: number): number { return a + b + c; }\n";
        let report = engine
            .breaking_changes(&tmp.path().join("math.ts"), old, new)
            .await
            .unwrap();
        assert_eq!(report.breaking.len(), 1);
        assert_eq!(report.referencing_files.len(), 1);
        assert!(report.referencing_files[0].path.ends_with("main.ts"));
    }

    #[tokio::test]
    async fn test_watch_events_update_index() {
        let tmp = workspace();
        let root = tmp.path();
        let engine = Engine::new(root, quiet());
        engine.analyze_dependencies(&root.join("main.ts")).unwrap();

        fs::write(root.join("main.ts"), "export const nothing = 1;\n").unwrap();
        let outcome = engine.handle_watch_event(&WatchEvent::Modified(root.join("main.ts")));
        assert!(matches!(outcome, WatchOutcome::Reanalyzed { dependencies: 0, .. }));
        assert!(engine.find_referencing_files(&root.join("math.ts")).is_empty());

        fs::remove_file(root.join("math.ts")).unwrap();
        engine.analyze_dependencies(&root.join("main.ts")).unwrap();
        let outcome = engine.handle_watch_event(&WatchEvent::Deleted(root.join("math.ts")));
        assert_eq!(outcome, WatchOutcome::Ignored);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watch_event_applied_on_blocking_pool() {
        let tmp = workspace();
        let root = tmp.path();
        let engine = Arc::new(Engine::new(root, quiet()));
        engine.analyze_dependencies(&root.join("main.ts")).unwrap();

        fs::write(root.join("main.ts"), "export const nothing = 1;\n").unwrap();
        let outcome = engine
            .apply_watch_event(WatchEvent::Modified(root.join("main.ts")))
            .await;
        assert!(matches!(outcome, WatchOutcome::Reanalyzed { dependencies: 0, .. }));
        assert!(engine.find_referencing_files(&root.join("math.ts")).is_empty());
    }
}
