use std::path::{Path, PathBuf};

use oxc_resolver::{ResolveOptions, Resolver};

/// Extension probe order for extensionless script specifiers.
pub const SCRIPT_EXTENSIONS: [&str; 8] = [".ts", ".tsx", ".mts", ".cts", ".js", ".jsx", ".mjs", ".cjs"];

/// Build the `oxc_resolver::Resolver` used for relative and absolute script specifiers.
///
/// - Exact path first, then `SCRIPT_EXTENSIONS` in order, then `index.*` under a directory.
/// - `.js` specifiers in TypeScript sources (`import './foo.js'`) map back to `.ts`/`.tsx`.
/// - Symlinks are not followed so results share the engine's lexical path keys.
/// - Bare package specifiers never reach this resolver; aliases and externals are
///   classified before it is called, so tsconfig and node_modules lookups stay off.
pub fn build_script_resolver() -> Resolver {
    Resolver::new(ResolveOptions {
        extensions: SCRIPT_EXTENSIONS.iter().map(|e| (*e).to_owned()).collect(),
        extension_alias: vec![
            (
                ".js".into(),
                vec![".ts".into(), ".tsx".into(), ".js".into()],
            ),
            (".mjs".into(), vec![".mts".into(), ".mjs".into()]),
            (".cjs".into(), vec![".cts".into(), ".cjs".into()]),
        ],
        main_files: vec!["index".into()],
        builtin_modules: false,
        symlinks: false,
        ..ResolveOptions::default()
    })
}

/// Resolve a path-like specifier (`./x`, `../x`, `/abs/x`) from `from_file`'s directory.
pub fn resolve_script_path(resolver: &Resolver, from_file: &Path, specifier: &str) -> Option<PathBuf> {
    let dir = from_file.parent()?;
    match resolver.resolve(dir, specifier) {
        Ok(resolution) => Some(resolution.into_path_buf()),
        Err(err) => {
            tracing::debug!(
                from = %from_file.display(),
                specifier,
                error = %err,
                "script specifier did not resolve"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("src/lib")).unwrap();
        fs::write(root.join("src/app.ts"), "").unwrap();
        fs::write(root.join("src/util.ts"), "").unwrap();
        fs::write(root.join("src/view.tsx"), "").unwrap();
        fs::write(root.join("src/lib/index.ts"), "").unwrap();
        fs::write(root.join("src/legacy.js"), "").unwrap();
        tmp
    }

    #[test]
    fn test_extension_inference() {
        let tmp = project();
        let resolver = build_script_resolver();
        let from = tmp.path().join("src/app.ts");
        assert_eq!(
            resolve_script_path(&resolver, &from, "./util"),
            Some(tmp.path().join("src/util.ts"))
        );
        assert_eq!(
            resolve_script_path(&resolver, &from, "./view"),
            Some(tmp.path().join("src/view.tsx"))
        );
        assert_eq!(
            resolve_script_path(&resolver, &from, "./legacy"),
            Some(tmp.path().join("src/legacy.js"))
        );
    }

    #[test]
    fn test_directory_index() {
        let tmp = project();
        let resolver = build_script_resolver();
        let from = tmp.path().join("src/app.ts");
        assert_eq!(
            resolve_script_path(&resolver, &from, "./lib"),
            Some(tmp.path().join("src/lib/index.ts"))
        );
    }

    #[test]
    fn test_js_extension_maps_to_ts_source() {
        let tmp = project();
        let resolver = build_script_resolver();
        let from = tmp.path().join("src/app.ts");
        assert_eq!(
            resolve_script_path(&resolver, &from, "./util.js"),
            Some(tmp.path().join("src/util.ts"))
        );
    }

    #[test]
    fn test_missing_file_is_none() {
        let tmp = project();
        let resolver = build_script_resolver();
        let from = tmp.path().join("src/app.ts");
        assert_eq!(resolve_script_path(&resolver, &from, "./nope"), None);
    }
}
