use std::path::PathBuf;

/// A filesystem change after filtering and classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A supported source file was created or changed.
    Modified(PathBuf),
    /// A supported source file disappeared.
    Deleted(PathBuf),
    /// A file that affects resolution changed (`depgraph.toml`, `tsconfig.json`,
    /// manifests); caches are dropped and the configuration reloaded.
    ConfigChanged(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &PathBuf {
        match self {
            WatchEvent::Modified(p) | WatchEvent::Deleted(p) | WatchEvent::ConfigChanged(p) => p,
        }
    }
}
