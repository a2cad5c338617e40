//! Python module specifier resolution.
//!
//! Specifiers arrive exactly as the import extractor produced them: `a.b.c` for
//! absolute imports, `.x` / `..a.b` for relative ones, bare dots for `from . import *`.

use std::path::{Path, PathBuf};

use super::Outcome;

/// Resolve a dotted Python module specifier imported from `from_file`.
///
/// Relative specifiers climb one package per extra leading dot. Absolute ones are tried
/// from the importing file's directory, then the workspace root and `<root>/src`.
/// Trailing segments that name a symbol rather than a module (`from a.b import C` is
/// expressed as `a.b`, but `import a.b.C` may still appear) are stripped until a module
/// file matches.
pub(crate) fn resolve(root: &Path, from_file: &Path, specifier: &str) -> Outcome {
    let Some(from_dir) = from_file.parent() else {
        return Outcome::NotFound;
    };

    let dots = specifier.chars().take_while(|c| *c == '.').count();
    let rest = &specifier[dots..];
    let segments: Vec<&str> = rest.split('.').filter(|s| !s.is_empty()).collect();

    if dots > 0 {
        let mut base = from_dir.to_path_buf();
        for _ in 1..dots {
            if !base.pop() {
                return Outcome::NotFound;
            }
        }
        return match find_module(&base, &segments) {
            Some(path) => Outcome::File(path),
            None => Outcome::NotFound,
        };
    }

    let Some(first) = segments.first() else {
        return Outcome::NotFound;
    };

    let bases = [from_dir.to_path_buf(), root.to_path_buf(), root.join("src")];
    for base in &bases {
        if let Some(path) = find_module(base, &segments) {
            return Outcome::File(path);
        }
    }

    Outcome::External((*first).to_owned())
}

/// Longest prefix of `segments` that names `x.py` or `x/__init__.py` under `base`.
/// No segments means the package at `base` itself.
fn find_module(base: &Path, segments: &[&str]) -> Option<PathBuf> {
    if segments.is_empty() {
        let init = base.join("__init__.py");
        return init.is_file().then_some(init);
    }

    (1..=segments.len()).rev().find_map(|take| {
        let mut module = base.to_path_buf();
        module.extend(&segments[..take]);
        let file = module.with_extension("py");
        if file.is_file() {
            return Some(file);
        }
        let init = module.join("__init__.py");
        init.is_file().then_some(init)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("pkg/sub")).unwrap();
        fs::write(root.join("pkg/__init__.py"), "").unwrap();
        fs::write(root.join("pkg/models.py"), "").unwrap();
        fs::write(root.join("pkg/sub/__init__.py"), "").unwrap();
        fs::write(root.join("pkg/sub/views.py"), "").unwrap();
        fs::write(root.join("main.py"), "").unwrap();
        tmp
    }

    #[test]
    fn test_absolute_module_from_root() {
        let tmp = project();
        let root = tmp.path();
        let from = root.join("pkg/sub/views.py");
        assert_eq!(
            resolve(root, &from, "pkg.models"),
            Outcome::File(root.join("pkg/models.py"))
        );
        assert_eq!(
            resolve(root, &from, "pkg.sub"),
            Outcome::File(root.join("pkg/sub/__init__.py"))
        );
    }

    #[test]
    fn test_trailing_symbol_is_stripped() {
        let tmp = project();
        let root = tmp.path();
        assert_eq!(
            resolve(root, &root.join("main.py"), "pkg.models.User"),
            Outcome::File(root.join("pkg/models.py"))
        );
    }

    #[test]
    fn test_relative_dots_climb_packages() {
        let tmp = project();
        let root = tmp.path();
        let from = root.join("pkg/sub/views.py");
        assert_eq!(resolve(root, &from, "."), Outcome::File(root.join("pkg/sub/__init__.py")));
        assert_eq!(resolve(root, &from, "..models"), Outcome::File(root.join("pkg/models.py")));
        assert_eq!(resolve(root, &from, "..missing"), Outcome::NotFound);
    }

    #[test]
    fn test_unknown_absolute_module_is_external() {
        let tmp = project();
        let root = tmp.path();
        assert_eq!(
            resolve(root, &root.join("main.py"), "numpy.linalg"),
            Outcome::External("numpy".to_owned())
        );
    }
}
