//! Which imported bindings a file actually uses.
//!
//! A binding counts as used when an identifier with its text appears anywhere outside
//! the import declarations themselves. Member names after a `.` (`obj.name` in
//! scripts, `x.field` in Rust) do not count; Python attributes do, since the grammar
//! does not tell them apart from plain identifiers.

use std::collections::HashSet;

use tree_sitter::{Node, Tree};

use super::{node_text, RawImport};
use crate::graph::DependencyKind;
use crate::language::LanguageKind;

fn counts_as_use(kind: LanguageKind, node_kind: &str) -> bool {
    match kind {
        LanguageKind::TypeScript | LanguageKind::Tsx | LanguageKind::JavaScript => matches!(
            node_kind,
            "identifier" | "type_identifier" | "shorthand_property_identifier"
        ),
        LanguageKind::Python => node_kind == "identifier",
        LanguageKind::Rust => matches!(node_kind, "identifier" | "type_identifier"),
    }
}

/// Declarations whose identifiers are bindings, not uses.
fn is_import_declaration(kind: LanguageKind, node: Node, source: &[u8]) -> bool {
    match kind {
        LanguageKind::TypeScript | LanguageKind::Tsx | LanguageKind::JavaScript => match node.kind() {
            "import_statement" => true,
            "export_statement" => node.child_by_field_name("source").is_some(),
            "variable_declarator" => node
                .child_by_field_name("value")
                .filter(|v| v.kind() == "call_expression")
                .and_then(|call| call.child_by_field_name("function"))
                .is_some_and(|f| node_text(f, source) == "require"),
            _ => false,
        },
        LanguageKind::Python => matches!(
            node.kind(),
            "import_statement" | "import_from_statement" | "future_import_statement"
        ),
        LanguageKind::Rust => match node.kind() {
            "use_declaration" => true,
            "mod_item" => node.child_by_field_name("body").is_none(),
            _ => false,
        },
    }
}

/// Identifier texts used outside import declarations.
pub fn used_identifiers<'a>(tree: &'a Tree, source: &'a [u8], kind: LanguageKind) -> HashSet<&'a str> {
    let mut used = HashSet::new();
    let mut cursor = tree.root_node().walk();
    loop {
        let node = cursor.node();
        let descend = !is_import_declaration(kind, node, source);
        if descend && counts_as_use(kind, node.kind()) {
            used.insert(node_text(node, source));
        }
        if descend && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return used;
            }
        }
    }
}

/// Fill `unused` on every import that binds names. Re-exports are left alone.
pub fn mark_unused(imports: &mut [RawImport], tree: &Tree, source: &[u8], kind: LanguageKind) {
    if imports.iter().all(|i| i.bindings.is_empty()) {
        return;
    }
    let used = used_identifiers(tree, source, kind);
    for import in imports
        .iter_mut()
        .filter(|i| i.kind != DependencyKind::ReExport)
    {
        import.unused = import
            .bindings
            .iter()
            .filter(|b| !used.contains(b.as_str()))
            .cloned()
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::parser::imports::extract_imports;
    use crate::parser::{parse_tree, RawImport};
    use crate::language::LanguageKind;

    fn imports_of(kind: LanguageKind, src: &str) -> Vec<RawImport> {
        let tree = parse_tree(kind, Path::new("/t"), src.as_bytes()).unwrap();
        extract_imports(&tree, src.as_bytes(), kind)
    }

    fn find<'a>(imports: &'a [RawImport], module: &str) -> &'a RawImport {
        imports.iter().find(|i| i.module == module).unwrap()
    }

    #[test]
    fn test_rust_unused_use_and_mod() {
        let src = "use utils::helpers::format_data;\nuse utils::helpers::process_data;\nuse utils::database::{connect_db, disconnect_db};\nmod helper;\nmod unused;\n\npub fn main() {\n    let connection = connect_db();\n    let data = format_data(\"Hello\");\n    let x = helper::wrap(data);\n    println!(\"{}\", x);\n}\n";
        let imports = imports_of(LanguageKind::Rust, src);

        assert!(find(&imports, "utils::helpers::format_data").is_used());
        let process = find(&imports, "utils::helpers::process_data");
        assert!(!process.is_used());
        assert_eq!(process.unused, vec!["process_data"]);
        assert!(find(&imports, "utils::database::connect_db").is_used());
        assert!(!find(&imports, "utils::database::disconnect_db").is_used());
        assert!(find(&imports, "helper").is_used());
        assert!(!find(&imports, "unused").is_used());
    }

    #[test]
    fn test_script_bindings_and_usage() {
        let src = "import React from 'react';\nimport { a, b as bee } from './ab';\nimport * as ns from './ns';\nimport './side-effect';\nimport type { Shape } from './shape';\nconst { readFile } = require('fs');\nexport { helper } from './helper';\n\nexport function run(s: Shape) {\n  return ns.go(a);\n}\n";
        let imports = imports_of(LanguageKind::TypeScript, src);

        assert!(!find(&imports, "react").is_used());
        let ab = find(&imports, "./ab");
        assert_eq!(ab.bindings, vec!["a", "bee"]);
        assert_eq!(ab.unused, vec!["bee"]);
        assert!(ab.is_used());
        assert!(find(&imports, "./ns").is_used());
        assert!(find(&imports, "./side-effect").is_used());
        assert!(find(&imports, "./shape").is_used());
        assert_eq!(find(&imports, "fs").bindings, vec!["readFile"]);
        assert!(!find(&imports, "fs").is_used());
        assert!(find(&imports, "./helper").is_used());
    }

    #[test]
    fn test_member_name_is_not_a_use() {
        let src = "import { norm } from './math';\nexport const x = vec.norm();\n";
        let imports = imports_of(LanguageKind::TypeScript, src);
        assert!(!find(&imports, "./math").is_used());
    }

    #[test]
    fn test_python_bindings() {
        let src = "import os.path\nimport json as j\nfrom .utils import helpers as h\nfrom pkg import *\n\ndef f():\n    return h.run(os.sep)\n";
        let imports = imports_of(LanguageKind::Python, src);

        assert_eq!(find(&imports, "os.path").bindings, vec!["os"]);
        assert!(find(&imports, "os.path").is_used());
        assert!(!find(&imports, "json").is_used());
        let utils = find(&imports, ".utils");
        assert_eq!(utils.submodules, vec!["helpers"]);
        assert_eq!(utils.bindings, vec!["h"]);
        assert!(utils.is_used());
        assert!(find(&imports, "pkg").is_used());
    }
}
