use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Name of the per-workspace configuration file.
pub const CONFIG_FILE: &str = "depgraph.toml";

/// How bare package specifiers (`react`, `numpy`, `serde::Deserialize`) are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalPackages {
    /// Drop them: they produce no dependency edge.
    #[default]
    Exclude,
    /// Keep them as opaque `pkg:<name>` dependencies that are never expanded.
    Passthrough,
}

/// Configuration loaded from `depgraph.toml` at the workspace root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default crawl depth when the caller does not pass one.
    pub max_depth: usize,
    /// Skip `node_modules` directories when walking and resolving.
    pub exclude_node_modules: bool,
    /// Save the reverse index under `.depgraph/` and restore it at startup.
    pub persist_index: bool,
    /// Start a full-workspace index run in the background after startup.
    pub enable_background_indexing: bool,
    /// Delay before the background index run starts, in milliseconds.
    pub indexing_start_delay_ms: u64,
    /// Maintain the reverse (who-imports-me) index.
    pub reverse_index: bool,
    /// Additional path patterns to exclude from workspace indexing.
    pub exclude: Vec<String>,
    /// Import alias table: prefix → directory (relative to the workspace root).
    pub aliases: BTreeMap<String, String>,
    pub external_packages: ExternalPackages,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            exclude_node_modules: true,
            persist_index: true,
            enable_background_indexing: true,
            indexing_start_delay_ms: 1000,
            reverse_index: true,
            exclude: Vec::new(),
            aliases: BTreeMap::new(),
            external_packages: ExternalPackages::Exclude,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `depgraph.toml` in the given root directory.
    ///
    /// Returns the default configuration if the file does not exist or cannot be parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!("failed to parse {CONFIG_FILE}: {err}. Using defaults.");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!("failed to read {CONFIG_FILE}: {err}. Using defaults.");
                Self::default()
            }
        }
    }

    pub fn indexing_start_delay(&self) -> Duration {
        Duration::from_millis(self.indexing_start_delay_ms)
    }
}

/// Shared, runtime-mutable configuration.
///
/// Cloning the handle shares the same underlying value; `update` notifies every
/// subscriber.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: std::sync::Arc<watch::Sender<EngineConfig>>,
}

impl ConfigHandle {
    pub fn new(config: EngineConfig) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    /// Snapshot of the current configuration.
    pub fn current(&self) -> EngineConfig {
        self.tx.borrow().clone()
    }

    /// Mutate the configuration in place. Subscribers are notified only when the
    /// value actually changed.
    pub fn update(&self, f: impl FnOnce(&mut EngineConfig)) {
        self.tx.send_if_modified(|cfg| {
            let before = cfg.clone();
            f(cfg);
            *cfg != before
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineConfig> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig::load(dir.path());
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.max_depth, 3);
        assert!(cfg.exclude_node_modules);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
max_depth = 5
persist_index = false
external_packages = "passthrough"

[aliases]
"@app" = "src"
"#,
        )
        .unwrap();
        let cfg = EngineConfig::load(dir.path());
        assert_eq!(cfg.max_depth, 5);
        assert!(!cfg.persist_index);
        assert!(cfg.enable_background_indexing, "unset keys keep defaults");
        assert_eq!(cfg.external_packages, ExternalPackages::Passthrough);
        assert_eq!(cfg.aliases.get("@app").map(String::as_str), Some("src"));
    }

    #[test]
    fn test_load_invalid_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "max_depth = \"deep\"").unwrap();
        assert_eq!(EngineConfig::load(dir.path()), EngineConfig::default());
    }

    #[test]
    fn test_update_notifies_subscribers() {
        let handle = ConfigHandle::new(EngineConfig::default());
        let mut rx = handle.subscribe();
        handle.update(|c| c.max_depth = 7);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().max_depth, 7);
        assert_eq!(handle.current().max_depth, 7);

        handle.update(|c| c.max_depth = 7);
        assert!(!rx.has_changed().unwrap(), "no-op update must not notify");
    }
}
