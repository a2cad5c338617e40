use std::path::{Path, PathBuf};

use serde::Serialize;

use depgraph::analyzer::Analysis;
use depgraph::callgraph::SymbolGraph;
use depgraph::graph::{Dependency, RelationType};
use depgraph::spider::{CrawlResult, CycleReport, IndexingStats};

/// Pretty-printed JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Path relative to `root` when it lies inside it.
fn rel(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

pub fn print_deps(root: &Path, analysis: &Analysis) {
    println!(
        "{} ({} dependencies, {} unresolved)",
        rel(root, &analysis.file),
        analysis.dependencies.len(),
        analysis.unresolved
    );
    for dep in &analysis.dependencies {
        let unused = if !dep.is_used {
            "  [unused]".to_owned()
        } else if !dep.unused_names.is_empty() {
            format!("  [unused: {}]", dep.unused_names.join(", "))
        } else {
            String::new()
        };
        println!("  {:>4}  {}  ({}){unused}", dep.line, rel(root, &dep.path), dep.module);
    }
}

pub fn print_refs(root: &Path, file: &Path, refs: &[Dependency]) {
    println!("{} is imported by {} file(s)", rel(root, file), refs.len());
    for r in refs {
        println!("  {}:{}  {}", rel(root, &r.path), r.line, r.module);
    }
}

pub fn print_crawl(root: &Path, result: &CrawlResult) {
    println!(
        "{} of {} node(s), {} edge(s)",
        result.nodes.len(),
        result.total_nodes,
        result.edges.len()
    );
    for node in &result.nodes {
        let label = result
            .node_labels
            .get(node)
            .cloned()
            .unwrap_or_else(|| rel(root, node));
        println!("  {label:<32} {}", rel(root, node));
    }
    for edge in &result.edges {
        let unused = if edge.is_used { "" } else { "  [unused]" };
        println!("  {} -> {}{unused}", rel(root, &edge.source), rel(root, &edge.target));
    }
    print_failures(root, result.failures.iter().map(|f| (&f.path, &f.message)));
}

pub fn print_symbols(graph: &SymbolGraph) {
    println!("{} symbol(s)", graph.symbols.len());
    for symbol in &graph.symbols {
        let exported = if symbol.is_exported { " (exported)" } else { "" };
        println!(
            "  {:>4}-{:<4} {:?} {}{exported}",
            symbol.range.start, symbol.range.end, symbol.kind, symbol.qualified_name
        );
    }
    for edge in graph
        .dependencies
        .iter()
        .filter(|e| e.relation != RelationType::Structural)
    {
        let short = |id: &str| id.rsplit('#').next().unwrap_or(id).to_owned();
        let cycle = if edge.is_cycle { " [cycle]" } else { "" };
        println!(
            "  {} -{:?}-> {}{cycle}",
            short(&edge.source),
            edge.relation,
            short(&edge.target)
        );
    }
}

pub fn print_index(stats: &IndexingStats) {
    println!(
        "Indexed {}/{} files in {:.2}s",
        stats.processed,
        stats.total,
        stats.duration.as_secs_f64()
    );
    if stats.cancelled {
        println!("  cancelled");
    }
    if !stats.failures.is_empty() {
        eprintln!("  {} file(s) failed", stats.failures.len());
    }
}

pub fn print_cycles(root: &Path, report: &CycleReport<PathBuf>) {
    if report.is_empty() {
        println!("No import cycles");
        return;
    }
    println!("{} cycle(s)", report.components.len());
    for (i, members) in report.components.iter().enumerate() {
        println!("  [{}] {} file(s)", i + 1, members.len());
        for member in members {
            println!("      {}", rel(root, member));
        }
    }
}

fn print_failures<'a>(root: &Path, failures: impl Iterator<Item = (&'a PathBuf, &'a String)>) {
    for (path, message) in failures {
        eprintln!("  failed {}: {message}", rel(root, path));
    }
}
