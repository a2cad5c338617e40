//! Debounced filesystem watching that feeds invalidations to the engine.

pub mod event;

pub use event::WatchEvent;

use std::path::{Component, Path};
use std::time::Duration;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;

use crate::cache::envelope::INDEX_DIR;
use crate::config::{CONFIG_FILE, EngineConfig};
use crate::language::LanguageKind;
use crate::walker::is_excluded;

/// Keeps the OS watcher alive; dropping it stops watching.
pub struct WatcherHandle {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    _bridge_task: JoinHandle<()>,
}

const DEBOUNCE: Duration = Duration::from_millis(75);

/// Files whose change can alter how specifiers resolve.
const RESOLUTION_FILES: &[&str] = &[
    CONFIG_FILE,
    "tsconfig.json",
    "jsconfig.json",
    "package.json",
];

const MANIFEST_FILES: &[&str] = &["pnpm-workspace.yaml", "Cargo.toml", "pyproject.toml"];

fn build_gitignore_matcher(root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    let gitignore = root.join(".gitignore");
    if gitignore.exists()
        && let Some(err) = builder.add(&gitignore)
    {
        tracing::warn!("ignoring unreadable .gitignore: {err}");
    }
    builder.build().unwrap_or_else(|_| Gitignore::empty())
}

fn is_gitignored(gitignore: &Gitignore, path: &Path) -> bool {
    path.starts_with(gitignore.path())
        && gitignore
            .matched_path_or_any_parents(path, path.is_dir())
            .is_ignore()
}

/// Watch `root` recursively. Events are debounced, filtered with the same rules as
/// the workspace walk, and delivered classified on the returned channel.
pub fn start_watcher(
    root: &Path,
    config: &EngineConfig,
) -> anyhow::Result<(WatcherHandle, tokio_mpsc::Receiver<WatchEvent>)> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<DebounceEventResult>();
    let mut debouncer = new_debouncer(DEBOUNCE, move |res| {
        let _ = std_tx.send(res);
    })?;
    debouncer.watcher().watch(root, RecursiveMode::Recursive)?;

    let gitignore = build_gitignore_matcher(root);
    let config = config.clone();
    let (tokio_tx, tokio_rx) = tokio_mpsc::channel::<WatchEvent>(256);

    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            match result {
                Ok(events) => {
                    for debounced in events {
                        let Some(event) = classify_event(&debounced.path, &gitignore, &config) else {
                            continue;
                        };
                        if tokio_tx.blocking_send(event).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => tracing::warn!("watch error: {err:?}"),
            }
        }
    });

    tracing::info!(root = %root.display(), "watching for changes");
    Ok((
        WatcherHandle {
            _debouncer: debouncer,
            _bridge_task: bridge_task,
        },
        tokio_rx,
    ))
}

/// Classify one changed path, or `None` when it should be ignored.
pub fn classify_event(path: &Path, gitignore: &Gitignore, config: &EngineConfig) -> Option<WatchEvent> {
    // Our own persisted state.
    if path
        .components()
        .any(|c| matches!(c, Component::Normal(name) if name == INDEX_DIR))
    {
        return None;
    }
    if is_excluded(path, config) || is_gitignored(gitignore, path) {
        return None;
    }

    if let Some(name) = path.file_name().and_then(|n| n.to_str())
        && (RESOLUTION_FILES.contains(&name) || MANIFEST_FILES.contains(&name))
    {
        return Some(WatchEvent::ConfigChanged(path.to_path_buf()));
    }

    LanguageKind::from_path(path)?;
    if path.exists() {
        Some(WatchEvent::Modified(path.to_path_buf()))
    } else {
        Some(WatchEvent::Deleted(path.to_path_buf()))
    }
}
