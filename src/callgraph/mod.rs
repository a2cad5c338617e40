//! Symbol and call graphs scoped to one file.

pub mod provider;
pub mod service;

pub use provider::{CallHierarchyProvider, HierarchyItem, NoCallHierarchy, OutgoingCall, ProviderError};
pub use service::{SymbolGraph, SymbolGraphService};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::graph::{CallEdge, RelationType, SymbolInfo};
use crate::parser::{FileAnalysis, SiteKind};
use crate::spider::find_cycle_nodes;

/// Prefix of target ids for symbols that are not declared in the analyzed file.
pub const EXTERNAL_PREFIX: &str = "external:";

#[derive(Debug, Clone, Serialize)]
pub struct IntraFileGraph {
    pub file_path: PathBuf,
    pub nodes: Vec<SymbolInfo>,
    pub edges: Vec<CallEdge>,
    /// Milliseconds since the Unix epoch.
    pub generated_at: u64,
    pub provider_used: String,
    pub is_partial: bool,
}

/// Resolves names as reported at a call site to the file's own symbols.
struct SymbolIndex<'a> {
    file: &'a Path,
    by_id: HashMap<&'a str, &'a SymbolInfo>,
    by_qualified: HashMap<&'a str, &'a SymbolInfo>,
    by_name: HashMap<&'a str, &'a SymbolInfo>,
    symbols: &'a [SymbolInfo],
}

impl<'a> SymbolIndex<'a> {
    fn new(file: &'a Path, symbols: &'a [SymbolInfo]) -> Self {
        let mut by_id = HashMap::new();
        let mut by_qualified = HashMap::new();
        let mut by_name = HashMap::new();
        for symbol in symbols {
            by_id.entry(symbol.id.as_str()).or_insert(symbol);
            by_qualified
                .entry(symbol.qualified_name.as_str())
                .or_insert(symbol);
            by_name.entry(symbol.name.as_str()).or_insert(symbol);
        }
        Self {
            file,
            by_id,
            by_qualified,
            by_name,
            symbols,
        }
    }

    /// Exact id first. A `file#name` id owned by another file never matches a local
    /// symbol; one owned by this file is resolved by its qualified name.
    fn resolve(&self, name: &str) -> Option<&'a SymbolInfo> {
        if let Some(&s) = self.by_id.get(name) {
            return Some(s);
        }
        match name.rsplit_once('#') {
            Some((owner, qualified)) if Path::new(owner) == self.file => {
                self.by_qualified.get(qualified).copied()
            }
            Some(_) => None,
            None => self.resolve_bare(name),
        }
    }

    /// Exact qualified name, exact name, then a `.`-suffix match on qualified
    /// names (the first one when several classes share the member name).
    fn resolve_bare(&self, name: &str) -> Option<&'a SymbolInfo> {
        if let Some(&s) = self.by_qualified.get(name) {
            return Some(s);
        }
        if let Some(&s) = self.by_name.get(name) {
            return Some(s);
        }
        let short = name.rsplit(['.', ':']).next().unwrap_or(name);
        let suffix = format!(".{short}");
        self.symbols
            .iter()
            .find(|s| s.qualified_name.ends_with(&suffix))
    }
}

fn external_id(name: &str) -> String {
    format!("{EXTERNAL_PREFIX}{name}")
}

/// Build the symbol graph of `file` from analyzer or provider data.
///
/// Call sites whose caller is not declared in the file only contribute edges when
/// `include_incoming` is set. Unknown targets are kept as external edges.
pub fn build_intra_file_graph(
    file: &Path,
    data: &FileAnalysis,
    include_incoming: bool,
    provider_used: &str,
    is_partial: bool,
) -> IntraFileGraph {
    let index = SymbolIndex::new(file, &data.symbols);
    let mut edges: BTreeMap<(String, String, RelationType), CallEdge> = BTreeMap::new();

    let mut add = |source: String, target: String, relation: RelationType, line: Option<usize>, external: bool| {
        let edge = edges
            .entry((source.clone(), target.clone(), relation))
            .or_insert_with(|| CallEdge::new(source, target, relation));
        edge.is_external |= external;
        if let Some(line) = line
            && !edge.call_sites.contains(&line)
        {
            edge.call_sites.push(line);
        }
    };

    for symbol in &data.symbols {
        if let Some(parent) = &symbol.parent_id
            && index.by_id.contains_key(parent.as_str())
        {
            add(parent.clone(), symbol.id.clone(), RelationType::Structural, None, false);
        }
    }

    for site in &data.call_sites {
        let Some(caller) = &site.caller else {
            continue;
        };
        let (source, incoming) = match index.resolve(caller) {
            Some(s) => (s.id.clone(), false),
            None if include_incoming => (external_id(caller), true),
            None => continue,
        };
        let (target, outgoing) = match index.resolve(&site.callee) {
            Some(t) => (t.id.clone(), false),
            None => (external_id(&site.callee), true),
        };
        let relation = match site.kind {
            SiteKind::Call => RelationType::Call,
            SiteKind::Reference => RelationType::Reference,
            SiteKind::Inherit => RelationType::Dependency,
        };
        add(source, target, relation, Some(site.line), incoming || outgoing);
    }

    let mut edges: Vec<CallEdge> = edges.into_values().collect();
    for edge in &mut edges {
        edge.call_sites.sort_unstable();
    }
    mark_cycles(&mut edges);

    let generated_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    IntraFileGraph {
        file_path: file.to_path_buf(),
        nodes: data.symbols.clone(),
        edges,
        generated_at,
        provider_used: provider_used.to_owned(),
        is_partial,
    }
}

fn is_flow(relation: RelationType) -> bool {
    matches!(relation, RelationType::Call | RelationType::Reference)
}

fn mark_cycles(edges: &mut [CallEdge]) {
    let flow: Vec<(String, String)> = edges
        .iter()
        .filter(|e| is_flow(e.relation))
        .map(|e| (e.source.clone(), e.target.clone()))
        .collect();
    let report = find_cycle_nodes(&flow);
    if report.is_empty() {
        return;
    }
    for edge in edges.iter_mut().filter(|e| is_flow(e.relation)) {
        edge.is_cycle = report.same_component(&edge.source, &edge.target);
    }
}
