use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Dependency and symbol graph engine for TypeScript, JavaScript, Python and Rust.
///
/// depgraph answers who imports a file, what a file depends on, and how the symbols
/// inside a file call each other, without a build step.
#[derive(Parser, Debug)]
#[command(
    name = "depgraph",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    /// Workspace root. Defaults to the current directory.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the resolved dependencies of a file.
    Deps {
        file: PathBuf,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the files that import a file.
    ///
    /// Indexes the workspace first unless a saved index can be restored.
    Refs {
        file: PathBuf,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Walk the dependency graph breadth-first from a file.
    Crawl {
        file: PathBuf,

        /// Maximum depth in hops (defaults to `max_depth` from depgraph.toml).
        #[arg(long)]
        depth: Option<usize>,

        /// Maximum number of nodes on the page.
        #[arg(long)]
        limit: Option<usize>,

        /// Index of the first node on the page.
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the symbols of a file and the call/reference edges between them.
    Symbols {
        file: PathBuf,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Index every supported file under a directory and save the reverse index.
    Index {
        /// Directory to index (defaults to --root or the current directory).
        path: Option<PathBuf>,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Report import cycles reachable from a file.
    Cycles {
        file: PathBuf,

        /// Maximum depth in hops.
        #[arg(long)]
        depth: Option<usize>,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_crawl_paging() {
        let cli = Cli::try_parse_from([
            "depgraph", "--root", "/ws", "crawl", "src/a.ts", "--depth", "2", "--limit", "10",
            "--offset", "20", "--json",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/ws")));
        match cli.command {
            Commands::Crawl {
                file,
                depth,
                limit,
                offset,
                json,
            } => {
                assert_eq!(file, PathBuf::from("src/a.ts"));
                assert_eq!(depth, Some(2));
                assert_eq!(limit, Some(10));
                assert_eq!(offset, 20);
                assert!(json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
