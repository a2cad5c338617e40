use std::path::{Component, Path, PathBuf};

/// Normalize a path into the canonical cache/index key.
///
/// Relative paths are anchored at the current directory, `.` and `..` are folded
/// lexically (symlinks are not followed so keys stay stable for paths that do not
/// exist yet). On Windows the path is lowercased and carries `/` separators.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }

    if cfg!(windows) {
        PathBuf::from(out.to_string_lossy().replace('\\', "/").to_lowercase())
    } else {
        out
    }
}

/// Relative module specifier from `from_file`'s directory to `target`, without
/// extension, in `./x` / `../x` form.
pub fn relative_specifier(from_file: &Path, target: &Path) -> Option<String> {
    let from_dir = from_file.parent()?;
    let target = target.with_extension("");

    let from_parts: Vec<_> = from_dir.components().collect();
    let target_parts: Vec<_> = target.components().collect();
    let common = from_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let ups = from_parts.len() - common;
    let mut segments: Vec<String> = Vec::new();
    if ups == 0 {
        segments.push(".".to_owned());
    } else {
        segments.extend(std::iter::repeat_n("..".to_owned(), ups));
    }
    for part in &target_parts[common..] {
        segments.push(part.as_os_str().to_string_lossy().into_owned());
    }
    Some(segments.join("/"))
}
