use std::path::{Component, Path, PathBuf};

use crate::config::EngineConfig;
use crate::language::LanguageKind;
use crate::paths::normalize_path;

/// Walk a workspace and collect every file with a registered language.
///
/// Respects `.gitignore` rules (even outside a git repository), skips hidden
/// directories such as `.depgraph/`, skips `node_modules` unless
/// `exclude_node_modules` is off, and applies the `exclude` patterns of the config.
/// Paths come back normalized and sorted.
pub fn walk_workspace(root: &Path, config: &EngineConfig) -> Vec<PathBuf> {
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(true)
        .require_git(false)
        .build();

    let mut files = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!("walk error: {err}");
                continue;
            }
        };

        if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
            continue;
        }

        let path = entry.path();
        if LanguageKind::from_path(path).is_none() || is_excluded(path, config) {
            continue;
        }

        files.push(normalize_path(path));
    }

    files.sort();
    tracing::debug!(root = %root.display(), files = files.len(), "workspace walked");
    files
}

/// Whether `path` is filtered out by configuration: `node_modules` (when excluded) or
/// any `exclude` glob matching the full path or one of its components.
pub fn is_excluded(path: &Path, config: &EngineConfig) -> bool {
    if config.exclude_node_modules && path_contains_node_modules(path) {
        return true;
    }

    let path_str = path.to_string_lossy();
    config.exclude.iter().any(|pattern| {
        let Ok(matcher) = glob::Pattern::new(pattern) else {
            return false;
        };
        matcher.matches(&path_str)
            || path
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .any(|s| matcher.matches(s))
    })
}

fn path_contains_node_modules(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == "node_modules"))
}
