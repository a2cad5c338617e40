use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::provider::{CallHierarchyProvider, ProviderError};
use super::{IntraFileGraph, build_intra_file_graph};
use crate::analyzer::DependencyAnalyzer;
use crate::error::{AnalysisError, HostError, Result};
use crate::graph::{CallEdge, SymbolInfo, SymbolKind};
use crate::host::ParserHost;
use crate::parser::{CallSite, FileAnalysis, SiteKind};
use crate::paths::normalize_path;

const HOST_PROVIDER: &str = "tree-sitter";
const IN_PROCESS_PROVIDER: &str = "tree-sitter (in-process)";

/// Symbols of a file and the edges between them.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolGraph {
    pub symbols: Vec<SymbolInfo>,
    pub dependencies: Vec<CallEdge>,
}

/// Produces intra-file graphs from a call-hierarchy provider or the engine's own parser.
pub struct SymbolGraphService {
    analyzer: Arc<DependencyAnalyzer>,
    host: Arc<ParserHost>,
}

impl SymbolGraphService {
    pub fn new(analyzer: Arc<DependencyAnalyzer>, host: Arc<ParserHost>) -> Self {
        Self { analyzer, host }
    }

    /// Graph for `path`. Provider data is used when it arrives within `timeout`;
    /// otherwise the result is structural only and marked partial.
    pub async fn intra_file_graph(
        &self,
        path: &Path,
        provider: &dyn CallHierarchyProvider,
        timeout: Duration,
        include_incoming: bool,
    ) -> Result<IntraFileGraph> {
        let path = normalize_path(path);
        if !self.analyzer.is_supported(&path) {
            return Err(AnalysisError::UnsupportedFileType { path });
        }

        if !provider.is_available() {
            let (data, used, partial) = self.engine_data(&path, Some(timeout)).await?;
            return Ok(build_intra_file_graph(&path, &data, include_incoming, used, partial));
        }

        match tokio::time::timeout(timeout, provider_data(provider, &path)).await {
            Ok(Ok(data)) => {
                return Ok(build_intra_file_graph(
                    &path,
                    &data,
                    include_incoming,
                    provider.name(),
                    false,
                ));
            }
            Ok(Err(err)) => {
                tracing::warn!(provider = provider.name(), file = %path.display(), "call hierarchy failed: {err}");
            }
            Err(_) => {
                tracing::warn!(
                    provider = provider.name(),
                    file = %path.display(),
                    timeout_ms = timeout.as_millis() as u64,
                    "call hierarchy timed out"
                );
            }
        }

        let (mut data, used, _) = self.engine_data(&path, Some(timeout)).await?;
        data.call_sites.retain(|site| site.kind == SiteKind::Inherit);
        Ok(build_intra_file_graph(&path, &data, include_incoming, used, true))
    }

    /// Symbols and symbol dependencies of `path` from the engine's own analysis.
    pub async fn symbol_graph(&self, path: &Path) -> Result<SymbolGraph> {
        let path = normalize_path(path);
        let (data, used, partial) = self.engine_data(&path, None).await?;
        let graph = build_intra_file_graph(&path, &data, false, used, partial);
        Ok(SymbolGraph {
            symbols: graph.nodes,
            dependencies: graph.edges,
        })
    }

    /// Analysis through the parser host, or in-process when the host is down.
    async fn engine_data(
        &self,
        path: &Path,
        timeout: Option<Duration>,
    ) -> Result<(FileAnalysis, &'static str, bool)> {
        let text = self.analyzer.read_source(path)?;
        match self.host.analyze_file(path, &text, timeout).await {
            Ok(data) => Ok((data, HOST_PROVIDER, false)),
            Err(err @ HostError::Remote { .. }) => Err(AnalysisError::from_host(path, err)),
            Err(err) => {
                tracing::warn!(file = %path.display(), "parser host unavailable ({err}); parsing in-process");
                let analyzer = self
                    .analyzer
                    .registry()
                    .for_path(path)
                    .ok_or_else(|| AnalysisError::UnsupportedFileType {
                        path: path.to_path_buf(),
                    })?;
                let data = analyzer.analyze(path, &text)?;
                Ok((data, IN_PROCESS_PROVIDER, true))
            }
        }
    }
}

impl std::fmt::Debug for SymbolGraphService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolGraphService")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Collect symbols and outgoing calls of every callable symbol from `provider`.
/// Calls into other files keep the foreign id so they surface as external edges.
async fn provider_data(
    provider: &dyn CallHierarchyProvider,
    path: &Path,
) -> std::result::Result<FileAnalysis, ProviderError> {
    let symbols = provider.document_symbols(path).await?;
    let mut call_sites = Vec::new();

    for symbol in symbols
        .iter()
        .filter(|s| matches!(s.kind, SymbolKind::Function | SymbolKind::Method))
    {
        for item in provider.prepare_call_hierarchy(path, symbol.range.start).await? {
            for call in provider.outgoing_calls(&item).await? {
                let callee = if normalize_path(&call.to.file) == path {
                    call.to.name.clone()
                } else {
                    format!("{}#{}", call.to.file.display(), call.to.name)
                };
                let lines = if call.from_lines.is_empty() {
                    vec![symbol.range.start]
                } else {
                    call.from_lines.clone()
                };
                for line in lines {
                    call_sites.push(CallSite {
                        caller: Some(symbol.qualified_name.clone()),
                        callee: callee.clone(),
                        kind: SiteKind::Call,
                        line,
                    });
                }
            }
        }
    }

    Ok(FileAnalysis {
        imports: Vec::new(),
        symbols,
        call_sites,
    })
}
