//! Rust use-path resolver.
//!
//! Classifies every `use` / `mod` path and maps it onto the module file it names.
//!
//! # Classification
//! - **Builtin**: `std`, `core`, `alloc` → external package of the same name
//! - **IntraCrate**: `crate::`, `self::`, `super::` → a file of the importing crate
//! - **CrossWorkspace**: first segment matches a workspace crate name → a file of that crate
//! - **Relative**: everything else is tried as a child module of the importing file's
//!   module (`mod foo;`, 2018-style `use foo::…` from the crate root); when no such
//!   module exists it is an external crate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::Outcome;
use super::workspace::owning_crate_root;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UsePathKind {
    Builtin,
    IntraCrate,
    CrossWorkspace,
    Relative,
}

fn classify(first: &str, workspace_crates: &HashMap<String, PathBuf>) -> UsePathKind {
    match first {
        "std" | "core" | "alloc" => UsePathKind::Builtin,
        "crate" | "self" | "super" => UsePathKind::IntraCrate,
        name if workspace_crates.contains_key(name) => UsePathKind::CrossWorkspace,
        _ => UsePathKind::Relative,
    }
}

/// Directory holding the child modules of the module defined by `file`.
///
/// `src/lib.rs`, `src/main.rs` and `x/mod.rs` own their directory; `src/walker.rs`
/// owns `src/walker/`.
fn module_dir(file: &Path) -> Option<PathBuf> {
    let parent = file.parent()?;
    let stem = file.file_stem()?.to_str()?;
    Some(match stem {
        "mod" | "lib" | "main" => parent.to_path_buf(),
        _ => parent.join(stem),
    })
}

/// File defining the module whose children live in `dir`.
fn module_file_for_dir(dir: &Path) -> Option<PathBuf> {
    [
        dir.join("mod.rs"),
        dir.with_extension("rs"),
        dir.join("lib.rs"),
        dir.join("main.rs"),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

/// Longest prefix of `segments` naming `x.rs` or `x/mod.rs` under `base`. The remaining
/// segments are items inside that module.
fn find_module(base: &Path, segments: &[&str]) -> Option<PathBuf> {
    (1..=segments.len()).rev().find_map(|take| {
        let mut module = base.to_path_buf();
        module.extend(&segments[..take]);
        let file = module.with_extension("rs");
        if file.is_file() {
            return Some(file);
        }
        let mod_rs = module.join("mod.rs");
        mod_rs.is_file().then_some(mod_rs)
    })
}

/// Resolve a `::`-separated use path imported by `from_file`.
pub(crate) fn resolve(
    from_file: &Path,
    specifier: &str,
    workspace_crates: &HashMap<String, PathBuf>,
) -> Outcome {
    let segments: Vec<&str> = specifier.split("::").filter(|s| !s.is_empty()).collect();
    let Some(&first) = segments.first() else {
        return Outcome::NotFound;
    };

    let kind = classify(first, workspace_crates);
    let (base, rest) = match kind {
        UsePathKind::Builtin => return Outcome::External(first.to_owned()),
        UsePathKind::IntraCrate => match intra_crate_base(from_file, &segments) {
            Some(found) => found,
            None => return Outcome::NotFound,
        },
        UsePathKind::CrossWorkspace => {
            let Some(dir) = workspace_crates.get(first).and_then(|root| root.parent()) else {
                return Outcome::NotFound;
            };
            (dir.to_path_buf(), &segments[1..])
        }
        UsePathKind::Relative => match module_dir(from_file) {
            Some(dir) => (dir, &segments[..]),
            None => return Outcome::NotFound,
        },
    };

    if let Some(file) = find_module(&base, rest) {
        return Outcome::File(file);
    }

    match kind {
        // Items of the anchor module itself (`use crate::Config`, `use super::*`).
        UsePathKind::IntraCrate | UsePathKind::CrossWorkspace => match module_file_for_dir(&base) {
            Some(file) => Outcome::File(file),
            None => Outcome::NotFound,
        },
        _ => Outcome::External(first.to_owned()),
    }
}

/// Anchor directory and remaining segments of a `crate::` / `self::` / `super::` path.
fn intra_crate_base<'a, 's>(
    from_file: &Path,
    segments: &'a [&'s str],
) -> Option<(PathBuf, &'a [&'s str])> {
    match segments[0] {
        "crate" => {
            let root = owning_crate_root(from_file)?;
            Some((root.parent()?.to_path_buf(), &segments[1..]))
        }
        "self" => Some((module_dir(from_file)?, &segments[1..])),
        _ => {
            let supers = segments.iter().take_while(|s| **s == "super").count();
            let mut dir = module_dir(from_file)?;
            for _ in 0..supers {
                if !dir.pop() {
                    return None;
                }
            }
            Some((dir, &segments[supers..]))
        }
    }
}
