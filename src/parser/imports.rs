use std::sync::OnceLock;

use tree_sitter::{Node, Query, QueryCursor, StreamingIterator, Tree};

use super::languages::{language_for, script_slot};
use super::{has_child_kind, node_text, start_line, usage, walk_tree, RawImport};
use crate::graph::DependencyKind;
use crate::language::LanguageKind;

// ---------------------------------------------------------------------------
// Query strings (script family)
// ---------------------------------------------------------------------------

/// `import { X } from 'm'`, `import X from 'm'`, `import * as X from 'm'`, `import 'm'`.
const IMPORT_QUERY: &str = r#"
    (import_statement
      source: (string (string_fragment) @module_path)) @import
"#;

/// `export { X } from 'm'`, `export * from 'm'`, `export * as ns from 'm'`.
const EXPORT_FROM_QUERY: &str = r#"
    (export_statement
      source: (string (string_fragment) @module_path)) @export
"#;

/// Identifier calls with a single string argument.
/// tree-sitter 0.26 StreamingIterator does not auto-filter `#eq?` predicates,
/// so `require` is filtered in code.
const REQUIRE_QUERY: &str = r#"
    (call_expression
      function: (identifier) @fn
      arguments: (arguments (string (string_fragment) @module_path)))
"#;

/// `import('m')`.
const DYNAMIC_IMPORT_QUERY: &str = r#"
    (call_expression
      function: (import)
      arguments: (arguments (string (string_fragment) @module_path))) @dynamic_import
"#;

// ---------------------------------------------------------------------------
// Query cache: one slot per script grammar (see `script_slot`)
// ---------------------------------------------------------------------------

type QuerySlots = [OnceLock<Option<Query>>; 3];

static IMPORT_QUERIES: QuerySlots = [const { OnceLock::new() }; 3];
static EXPORT_FROM_QUERIES: QuerySlots = [const { OnceLock::new() }; 3];
static REQUIRE_QUERIES: QuerySlots = [const { OnceLock::new() }; 3];
static DYNAMIC_IMPORT_QUERIES: QuerySlots = [const { OnceLock::new() }; 3];

/// Compile `text` for `kind`'s grammar once and hand out the cached query.
pub(crate) fn cached_query(
    slots: &'static QuerySlots,
    kind: LanguageKind,
    text: &str,
) -> Option<&'static Query> {
    let slot = script_slot(kind)?;
    slots[slot]
        .get_or_init(|| match Query::new(&language_for(kind), text) {
            Ok(q) => Some(q),
            Err(e) => {
                tracing::warn!(language = kind.display_name(), error = %e, "query failed to compile");
                None
            }
        })
        .as_ref()
}

/// One `@module_path` match: specifier text, line, the optional `@fn` gate and the
/// string fragment node itself.
struct ModuleMatch<'t> {
    module: String,
    line: usize,
    gate: Option<String>,
    node: Node<'t>,
}

fn collect_module_paths<'t>(query: &Query, tree: &'t Tree, source: &[u8]) -> Vec<ModuleMatch<'t>> {
    let Some(module_path_idx) = query.capture_index_for_name("module_path") else {
        return Vec::new();
    };
    let fn_idx = query.capture_index_for_name("fn");

    let mut out = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source);
    while let Some(m) = matches.next() {
        let mut module_node: Option<Node<'t>> = None;
        let mut gate: Option<String> = None;
        for capture in m.captures {
            if capture.index == module_path_idx {
                module_node = Some(capture.node);
            } else if fn_idx == Some(capture.index) {
                gate = Some(node_text(capture.node, source).to_owned());
            }
        }
        if let Some(node) = module_node {
            out.push(ModuleMatch {
                module: node_text(node, source).to_owned(),
                line: start_line(node),
                gate,
                node,
            });
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Import extraction
// ---------------------------------------------------------------------------

/// Extract every raw import from a parsed tree, sorted by line, with the bindings
/// nothing else in the file uses marked.
pub fn extract_imports(tree: &Tree, source: &[u8], kind: LanguageKind) -> Vec<RawImport> {
    let mut imports = match kind {
        LanguageKind::TypeScript | LanguageKind::Tsx | LanguageKind::JavaScript => {
            extract_script_imports(tree, source, kind)
        }
        LanguageKind::Python => extract_python_imports(tree, source),
        LanguageKind::Rust => extract_rust_imports(tree, source),
    };
    imports.sort_by_key(|i| i.line);
    usage::mark_unused(&mut imports, tree, source, kind);
    imports
}

fn extract_script_imports(tree: &Tree, source: &[u8], kind: LanguageKind) -> Vec<RawImport> {
    let mut imports = Vec::new();

    let passes: [(&'static QuerySlots, &str, DependencyKind); 4] = [
        (&IMPORT_QUERIES, IMPORT_QUERY, DependencyKind::StaticImport),
        (&EXPORT_FROM_QUERIES, EXPORT_FROM_QUERY, DependencyKind::ReExport),
        (&REQUIRE_QUERIES, REQUIRE_QUERY, DependencyKind::Require),
        (&DYNAMIC_IMPORT_QUERIES, DYNAMIC_IMPORT_QUERY, DependencyKind::DynamicImport),
    ];

    for (slots, text, dep_kind) in passes {
        let Some(query) = cached_query(slots, kind, text) else {
            continue;
        };
        for found in collect_module_paths(query, tree, source) {
            // Only calls to `require(...)`, not arbitrary identifier calls.
            if dep_kind == DependencyKind::Require && found.gate.as_deref() != Some("require") {
                continue;
            }
            let bindings = match dep_kind {
                DependencyKind::StaticImport | DependencyKind::Require => {
                    script_bindings(found.node, source)
                }
                DependencyKind::ReExport | DependencyKind::DynamicImport => Vec::new(),
            };
            imports.push(RawImport::new(found.module, dep_kind, found.line).with_bindings(bindings));
        }
    }

    imports
}

/// Names bound by the statement owning the specifier `fragment`: the clause of an
/// `import`, or the declarator pattern of `const x = require('m')`.
fn script_bindings(fragment: Node, source: &[u8]) -> Vec<String> {
    let Some(owner) = fragment.parent().and_then(|string| string.parent()) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    match owner.kind() {
        "import_statement" => {
            let mut cursor = owner.walk();
            for clause in owner
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "import_clause")
            {
                import_clause_bindings(clause, source, &mut out);
            }
        }
        "arguments" => {
            let declarator = owner
                .parent()
                .and_then(|call| call.parent())
                .filter(|d| d.kind() == "variable_declarator");
            if let Some(pattern) = declarator.and_then(|d| d.child_by_field_name("name")) {
                pattern_bindings(pattern, source, &mut out);
            }
        }
        _ => {}
    }
    out
}

fn import_clause_bindings(clause: Node, source: &[u8], out: &mut Vec<String>) {
    let mut cursor = clause.walk();
    for child in clause.named_children(&mut cursor) {
        match child.kind() {
            "identifier" => out.push(node_text(child, source).to_owned()),
            "namespace_import" => {
                if let Some(name) = child.named_child(0) {
                    out.push(node_text(name, source).to_owned());
                }
            }
            "named_imports" => {
                let mut inner = child.walk();
                for specifier in child
                    .named_children(&mut inner)
                    .filter(|n| n.kind() == "import_specifier")
                {
                    if let Some(local) = specifier
                        .child_by_field_name("alias")
                        .or_else(|| specifier.child_by_field_name("name"))
                    {
                        out.push(node_text(local, source).to_owned());
                    }
                }
            }
            _ => {}
        }
    }
}

/// `x`, `{ a, b: c }` and `[a, b]` declarator patterns.
fn pattern_bindings(pattern: Node, source: &[u8], out: &mut Vec<String>) {
    match pattern.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            out.push(node_text(pattern, source).to_owned());
        }
        "pair_pattern" => {
            if let Some(value) = pattern.child_by_field_name("value") {
                pattern_bindings(value, source, out);
            }
        }
        "object_pattern" | "array_pattern" => {
            let mut cursor = pattern.walk();
            for child in pattern.named_children(&mut cursor) {
                pattern_bindings(child, source, out);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Python
// ---------------------------------------------------------------------------

/// Dotted module text of an import target: `a.b` or the `name` of `a.b as c`.
fn python_module_name(node: Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "dotted_name" => Some(node_text(node, source).to_owned()),
        "aliased_import" => node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_owned()),
        _ => None,
    }
}

/// The local name an import target binds: the alias, else the given fallback.
fn python_binding(node: Node, source: &[u8], fallback: &str) -> String {
    node.child_by_field_name("alias")
        .map(|a| node_text(a, source).to_owned())
        .unwrap_or_else(|| fallback.to_owned())
}

fn extract_python_imports(tree: &Tree, source: &[u8]) -> Vec<RawImport> {
    let mut imports = Vec::new();

    walk_tree(tree.root_node(), |node| match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                if let Some(module) = python_module_name(name, source) {
                    // `import a.b` binds `a`.
                    let top = module.split('.').next().unwrap_or(&module).to_owned();
                    let binding = python_binding(name, source, &top);
                    imports.push(
                        RawImport::new(module, DependencyKind::StaticImport, start_line(node))
                            .with_bindings(vec![binding]),
                    );
                }
            }
        }
        "import_from_statement" => {
            let Some(module_node) = node.child_by_field_name("module_name") else {
                return;
            };
            let module: String = node_text(module_node, source)
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            let line = start_line(node);

            let mut cursor = node.walk();
            let names: Vec<(String, String)> = node
                .children_by_field_name("name", &mut cursor)
                .filter_map(|n| {
                    let imported = python_module_name(n, source)?;
                    let binding = python_binding(n, source, &imported);
                    Some((imported, binding))
                })
                .collect();
            let wildcard = has_child_kind(node, "wildcard_import");

            // `from . import a, b` names sibling modules of the package.
            if !module.is_empty() && module.chars().all(|c| c == '.') {
                if names.is_empty() || wildcard {
                    imports.push(RawImport::new(module.clone(), DependencyKind::StaticImport, line));
                }
                for (imported, binding) in names {
                    imports.push(
                        RawImport::new(format!("{module}{imported}"), DependencyKind::StaticImport, line)
                            .with_bindings(vec![binding]),
                    );
                }
            } else {
                let mut raw = RawImport::new(module, DependencyKind::StaticImport, line);
                if !wildcard {
                    let (submodules, bindings): (Vec<String>, Vec<String>) = names.into_iter().unzip();
                    raw.submodules = submodules;
                    raw.bindings = bindings;
                }
                imports.push(raw);
            }
        }
        _ => {}
    });

    imports
}

// ---------------------------------------------------------------------------
// Rust
// ---------------------------------------------------------------------------

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_owned()
    } else {
        format!("{prefix}::{segment}")
    }
}

fn strip_ws(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn last_segment(path: &str) -> Option<String> {
    let last = path.rsplit("::").next().unwrap_or(path);
    (!matches!(last, "" | "crate" | "super" | "self" | "*")).then(|| last.to_owned())
}

/// Flatten a `use` tree into fully-qualified paths with the name each one binds.
///
/// `use a::{b, c::{self, d}, e as f, g::*}` yields `a::b`, `a::c`, `a::c::d`, `a::e`
/// (bound as `f`) and `a::g` (binds nothing).
fn flatten_use_tree(node: Node, source: &[u8], prefix: &str, out: &mut Vec<(String, Option<String>)>) {
    match node.kind() {
        "identifier" | "crate" | "super" | "self" | "scoped_identifier" | "metavariable" => {
            let text = strip_ws(node_text(node, source));
            if text == "self" && !prefix.is_empty() {
                out.push((prefix.to_owned(), last_segment(prefix)));
            } else {
                let path = join_path(prefix, &text);
                let binding = last_segment(&path);
                out.push((path, binding));
            }
        }
        "use_as_clause" => {
            let Some(path) = node.child_by_field_name("path") else {
                return;
            };
            let mut inner = Vec::new();
            flatten_use_tree(path, source, prefix, &mut inner);
            let alias = node
                .child_by_field_name("alias")
                .map(|a| node_text(a, source).to_owned())
                .filter(|a| a != "_");
            out.extend(inner.into_iter().map(|(path, _)| (path, alias.clone())));
        }
        "use_wildcard" => match node.named_child(0) {
            Some(path) => out.push((join_path(prefix, &strip_ws(node_text(path, source))), None)),
            None if !prefix.is_empty() => out.push((prefix.to_owned(), None)),
            None => {}
        },
        "scoped_use_list" => {
            let base = match node.child_by_field_name("path") {
                Some(path) => join_path(prefix, &strip_ws(node_text(path, source))),
                None => prefix.to_owned(),
            };
            if let Some(list) = node.child_by_field_name("list") {
                flatten_use_tree(list, source, &base, out);
            }
        }
        "use_list" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                flatten_use_tree(child, source, prefix, out);
            }
        }
        _ => {}
    }
}

fn extract_rust_imports(tree: &Tree, source: &[u8]) -> Vec<RawImport> {
    let mut imports = Vec::new();

    walk_tree(tree.root_node(), |node| match node.kind() {
        "use_declaration" => {
            let Some(argument) = node.child_by_field_name("argument") else {
                return;
            };
            let kind = if has_child_kind(node, "visibility_modifier") {
                DependencyKind::ReExport
            } else {
                DependencyKind::StaticImport
            };
            let mut paths = Vec::new();
            flatten_use_tree(argument, source, "", &mut paths);
            for (module, binding) in paths {
                imports.push(
                    RawImport::new(module, kind, start_line(node))
                        .with_bindings(binding.into_iter().collect()),
                );
            }
        }
        // `mod foo;` pulls in a file; `mod foo { … }` does not.
        "mod_item" if node.child_by_field_name("body").is_none() => {
            if let Some(name) = node.child_by_field_name("name") {
                let name = node_text(name, source).to_owned();
                // A `pub mod` is part of the crate's surface and always counts as used.
                let bindings = if has_child_kind(node, "visibility_modifier") {
                    Vec::new()
                } else {
                    vec![name.clone()]
                };
                imports.push(
                    RawImport::new(name, DependencyKind::StaticImport, start_line(node)).with_bindings(bindings),
                );
            }
        }
        _ => {}
    });

    imports
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::parser::parse_tree;

    fn imports_of(kind: LanguageKind, src: &str) -> Vec<RawImport> {
        let tree = parse_tree(kind, Path::new("/t"), src.as_bytes()).unwrap();
        extract_imports(&tree, src.as_bytes(), kind)
    }

    fn modules(imports: &[RawImport]) -> Vec<&str> {
        imports.iter().map(|i| i.module.as_str()).collect()
    }

    #[test]
    fn test_esm_named_import() {
        let imports = imports_of(
            LanguageKind::TypeScript,
            "import { useState, useEffect } from 'react';",
        );
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].module, "react");
        assert_eq!(imports[0].kind, DependencyKind::StaticImport);
        assert_eq!(imports[0].line, 1);
    }

    #[test]
    fn test_side_effect_and_type_imports() {
        let src = "import './polyfill';\nimport type { A } from './types';\n";
        let imports = imports_of(LanguageKind::TypeScript, src);
        assert_eq!(modules(&imports), vec!["./polyfill", "./types"]);
        assert_eq!(imports[1].line, 2);
    }

    #[test]
    fn test_cjs_require() {
        let src = "const fs = require('fs');\nconst x = load('./not-a-require');\n";
        let imports = imports_of(LanguageKind::JavaScript, src);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].kind, DependencyKind::Require);
        assert_eq!(imports[0].module, "fs");
    }

    #[test]
    fn test_dynamic_import() {
        let imports = imports_of(
            LanguageKind::TypeScript,
            "async function f() {\n  const m = await import('./lazy');\n}\n",
        );
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].kind, DependencyKind::DynamicImport);
        assert_eq!(imports[0].module, "./lazy");
        assert_eq!(imports[0].line, 2);
    }

    #[test]
    fn test_reexports() {
        let src = "export { helper } from './utils';\nexport * from './types';\nexport const x = 1;\n";
        let imports = imports_of(LanguageKind::TypeScript, src);
        assert_eq!(modules(&imports), vec!["./utils", "./types"]);
        assert!(imports.iter().all(|i| i.kind == DependencyKind::ReExport));
    }

    #[test]
    fn test_tsx_and_js_grammars_use_their_own_queries() {
        let tsx = imports_of(
            LanguageKind::Tsx,
            "import React from 'react';\nexport const A = () => <div/>;\n",
        );
        assert_eq!(modules(&tsx), vec!["react"]);
        let js = imports_of(LanguageKind::JavaScript, "import { a } from './a.js';\n");
        assert_eq!(modules(&js), vec!["./a.js"]);
    }

    #[test]
    fn test_imports_sorted_by_line() {
        let src = "const a = require('./a');\nimport b from './b';\nexport * from './c';\n";
        let imports = imports_of(LanguageKind::TypeScript, src);
        let lines: Vec<_> = imports.iter().map(|i| i.line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn test_python_imports() {
        let src = "import os, pkg.sub as s\nfrom utils.helpers import build\nfrom . import models, views\nfrom ..core import engine\nfrom . import *\n";
        let imports = imports_of(LanguageKind::Python, src);
        assert_eq!(
            modules(&imports),
            vec!["os", "pkg.sub", "utils.helpers", ".models", ".views", "..core", "."]
        );
        assert_eq!(imports[2].line, 2);
        assert!(imports.iter().all(|i| i.kind == DependencyKind::StaticImport));
    }

    #[test]
    fn test_python_nested_import() {
        let src = "def f():\n    import json\n    return json\n";
        let imports = imports_of(LanguageKind::Python, src);
        assert_eq!(modules(&imports), vec!["json"]);
        assert_eq!(imports[0].line, 2);
    }

    #[test]
    fn test_rust_use_trees() {
        let src = "use std::collections::HashMap;\nuse crate::parser::{self, imports::extract as ex, symbols::*};\npub use super::graph::Node;\nmod walker;\nmod inline { }\n";
        let imports = imports_of(LanguageKind::Rust, src);
        assert_eq!(
            modules(&imports),
            vec![
                "std::collections::HashMap",
                "crate::parser",
                "crate::parser::imports::extract",
                "crate::parser::symbols",
                "super::graph::Node",
                "walker",
            ]
        );
        assert_eq!(imports[4].kind, DependencyKind::ReExport);
        assert_eq!(imports[5].line, 4);
    }
}
