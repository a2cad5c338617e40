//! Multi-language dependency and symbol graph engine.
//!
//! The [`Engine`] answers which files a file imports, which files import it, and how
//! the symbols inside one file call and reference each other. TypeScript, JavaScript,
//! Python and Rust are analyzed with tree-sitter. Heavy parsing runs on an isolated
//! worker thread reached over typed messages.

pub mod analyzer;
pub mod cache;
pub mod callgraph;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod host;
pub mod index;
pub mod language;
pub mod parser;
pub mod paths;
pub mod resolver;
pub mod spider;
pub mod walker;
pub mod watcher;

pub use config::{ConfigHandle, EngineConfig};
pub use engine::Engine;
pub use error::{AnalysisError, HostError, PersistError};
