mod cli;
mod output;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use cli::{Cli, Commands};
use depgraph::Engine;
use depgraph::config::EngineConfig;
use depgraph::spider::find_cycle_nodes;

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("invalid path {}", path.display()))
}

/// Serialized form of a cycle report.
#[derive(Serialize)]
struct CyclesJson<'a> {
    components: &'a [Vec<PathBuf>],
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "depgraph=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let root = match &cli.root {
        Some(root) => absolute(root)?,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };

    match cli.command {
        Commands::Deps { file, json } => {
            let engine = quiet_engine(&root);
            let file = absolute(&file)?;
            let analysis = engine
                .analyze_dependencies(&file)
                .with_context(|| format!("failed to analyze {}", file.display()))?;
            if json {
                output::print_json(&analysis)?;
            } else {
                output::print_deps(engine.root(), &analysis);
            }
        }
        Commands::Refs { file, json } => {
            let engine = quiet_engine(&root);
            let file = absolute(&file)?;
            engine.warm_index();
            let refs = engine.find_referencing_files(&file);
            if json {
                output::print_json(&refs)?;
            } else {
                output::print_refs(engine.root(), &file, &refs);
            }
        }
        Commands::Crawl {
            file,
            depth,
            limit,
            offset,
            json,
        } => {
            let engine = quiet_engine(&root);
            let file = absolute(&file)?;
            let result = engine.crawl_dependency_graph(&file, depth, limit, offset);
            if json {
                output::print_json(&result)?;
            } else {
                output::print_crawl(engine.root(), &result);
            }
        }
        Commands::Symbols { file, json } => {
            let engine = quiet_engine(&root);
            let file = absolute(&file)?;
            let graph = engine
                .get_symbol_graph(&file)
                .await
                .with_context(|| format!("failed to build symbol graph for {}", file.display()))?;
            if json {
                output::print_json(&graph)?;
            } else {
                output::print_symbols(&graph);
            }
        }
        Commands::Index { path, json } => {
            let target = match path {
                Some(p) => absolute(&p)?,
                None => root,
            };
            let engine = quiet_engine(&target);
            let stats = engine.rebuild_index().await;
            if json {
                output::print_json(&stats)?;
            } else {
                output::print_index(&stats);
            }
        }
        Commands::Cycles { file, depth, json } => {
            let engine = quiet_engine(&root);
            let file = absolute(&file)?;
            let crawl = engine.crawl_dependency_graph(&file, depth, None, 0);
            let edges: Vec<(PathBuf, PathBuf)> = crawl
                .edges
                .into_iter()
                .map(|e| (e.source, e.target))
                .collect();
            let report = find_cycle_nodes(&edges);
            if json {
                output::print_json(&CyclesJson {
                    components: &report.components,
                })?;
            } else {
                output::print_cycles(engine.root(), &report);
            }
        }
    }

    Ok(())
}

/// One-shot commands never schedule background indexing.
fn quiet_engine(root: &Path) -> Engine {
    let mut config = EngineConfig::load(root);
    config.enable_background_indexing = false;
    Engine::new(root, config)
}
