use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// npm / yarn / pnpm workspaces
// ---------------------------------------------------------------------------

/// Discover local packages of an npm/yarn/pnpm monorepo.
///
/// Maps each package name (`@org/utils`) to the directory imports of it should land in:
/// `<pkg>/src` when present, otherwise the package root. Empty when the root declares
/// no workspaces.
pub fn discover_script_packages(root: &Path) -> BTreeMap<String, PathBuf> {
    let mut packages = BTreeMap::new();

    for pattern in workspace_globs(root) {
        let full = format!("{}/{}/package.json", root.display(), pattern);
        let Ok(entries) = glob::glob(&full) else {
            continue;
        };
        for manifest in entries.flatten() {
            let Some(pkg_dir) = manifest.parent() else {
                continue;
            };
            let Some(name) = read_json(&manifest)
                .as_ref()
                .and_then(|json| json["name"].as_str())
                .map(str::to_owned)
            else {
                continue;
            };
            let src = pkg_dir.join("src");
            let target = if src.is_dir() { src } else { pkg_dir.to_path_buf() };
            packages.insert(name, target);
        }
    }

    packages
}

fn read_json(path: &Path) -> Option<serde_json::Value> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Workspace glob patterns: `pnpm-workspace.yaml` wins over `package.json#workspaces`.
fn workspace_globs(root: &Path) -> Vec<String> {
    if let Ok(content) = std::fs::read_to_string(root.join("pnpm-workspace.yaml")) {
        return parse_pnpm_workspace_yaml(&content);
    }

    let Some(json) = read_json(&root.join("package.json")) else {
        return Vec::new();
    };
    // Yarn also accepts `{ "workspaces": { "packages": [...] } }`.
    let list = json["workspaces"]
        .as_array()
        .or_else(|| json["workspaces"]["packages"].as_array());
    list.map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect()
    })
    .unwrap_or_default()
}

/// Line parser for the `packages:` list of `pnpm-workspace.yaml`.
///
/// ```yaml
/// packages:
///   - 'packages/*'
///   - "apps/*"
///   - tools/*
/// ```
pub(crate) fn parse_pnpm_workspace_yaml(content: &str) -> Vec<String> {
    let mut globs = Vec::new();
    let mut in_packages = false;

    for line in content.lines() {
        let line = line.trim_end();
        if line.trim() == "packages:" {
            in_packages = true;
            continue;
        }
        if !in_packages {
            continue;
        }
        // Any other top-level key closes the list.
        if !line.is_empty() && !line.starts_with(' ') && !line.starts_with('-') {
            break;
        }
        let Some(item) = line.trim_start().strip_prefix("- ") else {
            continue;
        };
        let item = item.trim();
        let unquoted = item
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .or_else(|| item.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
            .unwrap_or(item);
        if !unquoted.is_empty() {
            globs.push(unquoted.to_owned());
        }
    }

    globs
}

// ---------------------------------------------------------------------------
// Cargo crates
// ---------------------------------------------------------------------------

/// Read the crate name (hyphens normalized to underscores) and root source file of the
/// crate described by `cargo_toml`.
///
/// Root file order: explicit `[lib] path`, `src/lib.rs`, `src/main.rs`.
pub fn find_crate_root(cargo_toml: &Path) -> Option<(String, PathBuf)> {
    let content = std::fs::read_to_string(cargo_toml).ok()?;
    let manifest: toml::Value = toml::from_str(&content).ok()?;
    let name = manifest.get("package")?.get("name")?.as_str()?.replace('-', "_");
    let crate_dir = cargo_toml.parent()?;

    let explicit = manifest
        .get("lib")
        .and_then(|lib| lib.get("path"))
        .and_then(|p| p.as_str())
        .map(|p| crate_dir.join(p));
    let root = explicit
        .into_iter()
        .chain([crate_dir.join("src/lib.rs"), crate_dir.join("src/main.rs")])
        .find(|p| p.is_file())?;

    Some((name, root))
}

/// Map every crate of a Cargo workspace (or the single crate at `root`) to its root file.
pub fn discover_rust_crates(root: &Path) -> HashMap<String, PathBuf> {
    let root_toml = root.join("Cargo.toml");
    let mut crates = HashMap::new();

    let Some(manifest) = std::fs::read_to_string(&root_toml)
        .ok()
        .and_then(|c| toml::from_str::<toml::Value>(&c).ok())
    else {
        return crates;
    };

    let members = manifest
        .get("workspace")
        .and_then(|ws| ws.get("members"))
        .and_then(|m| m.as_array());
    for member in members.into_iter().flatten().filter_map(|m| m.as_str()) {
        let pattern = format!("{}/{}/Cargo.toml", root.display(), member);
        let Ok(entries) = glob::glob(&pattern) else {
            continue;
        };
        for entry in entries.flatten() {
            if let Some((name, file)) = find_crate_root(&entry) {
                crates.insert(name, file);
            }
        }
    }

    // A root manifest with `[package]` is a crate too, workspace or not.
    if manifest.get("package").is_some()
        && let Some((name, file)) = find_crate_root(&root_toml)
    {
        crates.entry(name).or_insert(file);
    }

    crates
}

/// Root source file of the crate that owns `file`: the nearest ancestor directory with
/// a `Cargo.toml`.
pub fn owning_crate_root(file: &Path) -> Option<PathBuf> {
    file.ancestors()
        .skip(1)
        .map(|dir| dir.join("Cargo.toml"))
        .find(|toml| toml.is_file())
        .and_then(|toml| find_crate_root(&toml))
        .map(|(_, root)| root)
}
