use std::collections::HashSet;
use std::sync::OnceLock;

use tree_sitter::{Node, Query, QueryCursor, StreamingIterator, Tree};

use super::imports::cached_query;
use super::{node_text, start_line, walk_tree, CallSite, SiteKind};
use crate::graph::{SymbolInfo, SymbolKind};
use crate::language::LanguageKind;

// ---------------------------------------------------------------------------
// Query strings (script family)
// ---------------------------------------------------------------------------

/// Direct calls `foo(...)`, method calls `obj.method(...)` and `new Foo(...)`.
const CALLS_QUERY: &str = r#"
    (call_expression
      function: (identifier) @callee)

    (call_expression
      function: (member_expression
        property: (property_identifier) @callee))

    (new_expression
      constructor: (identifier) @callee)
"#;

/// Type identifiers used in annotations: `x: Foo`, `(): Promise<Bar>`.
/// JavaScript has no type annotations, so this query only runs on TS/TSX trees.
const TYPE_REF_QUERY: &str = r#"
    (type_annotation
      (type_identifier) @callee)

    (type_annotation
      (generic_type
        name: (type_identifier) @callee))
"#;

type QuerySlots = [OnceLock<Option<Query>>; 3];

static CALLS_QUERIES: QuerySlots = [const { OnceLock::new() }; 3];
static TYPE_REF_QUERIES: QuerySlots = [const { OnceLock::new() }; 3];

// ---------------------------------------------------------------------------
// Site collection
// ---------------------------------------------------------------------------

struct Sites<'a> {
    symbols: &'a [SymbolInfo],
    /// Names declared in this file; identifiers passed as values only count when
    /// they name one of these.
    declared: HashSet<&'a str>,
    out: Vec<CallSite>,
}

impl<'a> Sites<'a> {
    fn new(symbols: &'a [SymbolInfo]) -> Self {
        Self {
            symbols,
            declared: symbols.iter().map(|s| s.name.as_str()).collect(),
            out: Vec::new(),
        }
    }

    /// Qualified name of the innermost symbol whose range contains `line`.
    fn enclosing(&self, line: usize) -> Option<String> {
        self.symbols
            .iter()
            .filter(|s| s.range.contains(line))
            .min_by_key(|s| (s.range.line_count(), std::cmp::Reverse(s.range.start)))
            .map(|s| s.qualified_name.clone())
    }

    /// Qualified name of the type declared as `name` on `line`, or `name` itself.
    fn declared_type(&self, name: &str, line: usize) -> String {
        self.symbols
            .iter()
            .filter(|s| {
                s.name == name
                    && matches!(s.kind, SymbolKind::Class | SymbolKind::Interface | SymbolKind::Other)
            })
            .min_by_key(|s| s.range.start.abs_diff(line))
            .map(|s| s.qualified_name.clone())
            .unwrap_or_else(|| name.to_owned())
    }

    fn push(&mut self, callee: &str, kind: SiteKind, line: usize) {
        if callee.is_empty() {
            return;
        }
        let caller = self.enclosing(line);
        self.push_from(caller, callee, kind, line);
    }

    fn push_from(&mut self, caller: Option<String>, callee: &str, kind: SiteKind, line: usize) {
        if callee.is_empty() {
            return;
        }
        self.out.push(CallSite {
            caller,
            callee: callee.to_owned(),
            kind,
            line,
        });
    }

    fn push_value_reference(&mut self, callee: &str, line: usize) {
        if self.declared.contains(callee) {
            self.push(callee, SiteKind::Reference, line);
        }
    }
}

/// Extract call, reference and inheritance sites, attributed to the enclosing
/// symbol from `symbols`, sorted by line.
pub fn extract_call_sites(
    tree: &Tree,
    source: &[u8],
    kind: LanguageKind,
    symbols: &[SymbolInfo],
) -> Vec<CallSite> {
    let mut sites = Sites::new(symbols);
    match kind {
        LanguageKind::TypeScript | LanguageKind::Tsx | LanguageKind::JavaScript => {
            script_sites(&mut sites, tree, source, kind)
        }
        LanguageKind::Python => python_sites(&mut sites, tree, source),
        LanguageKind::Rust => rust_sites(&mut sites, tree, source),
    }
    let mut out = sites.out;
    out.sort_by_key(|s| s.line);
    out
}

// ---------------------------------------------------------------------------
// TypeScript / TSX / JavaScript
// ---------------------------------------------------------------------------

fn run_callee_query(
    sites: &mut Sites,
    query: &Query,
    tree: &Tree,
    source: &[u8],
    kind: SiteKind,
) {
    let Some(callee_idx) = query.capture_index_for_name("callee") else {
        return;
    };
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source);
    while let Some(m) = matches.next() {
        for capture in m.captures {
            if capture.index != callee_idx {
                continue;
            }
            let name = node_text(capture.node, source);
            // `require('x')` is an import, not a call edge.
            if name == "require" {
                continue;
            }
            sites.push(name, kind, start_line(capture.node));
        }
    }
}

/// Name of a heritage target: `Base`, `ns.Base` → `Base`, `Base<T>` → `Base`.
fn script_type_name<'a>(node: Node<'a>, source: &'a [u8]) -> Option<&'a str> {
    match node.kind() {
        "identifier" | "type_identifier" => Some(node_text(node, source)),
        "member_expression" => node
            .child_by_field_name("property")
            .map(|p| node_text(p, source)),
        "nested_type_identifier" => node
            .child_by_field_name("name")
            .map(|n| node_text(n, source)),
        "generic_type" => node
            .child_by_field_name("name")
            .and_then(|n| script_type_name(n, source)),
        _ => None,
    }
}

fn script_heritage(sites: &mut Sites, node: Node, source: &[u8]) {
    let Some(name) = node.child_by_field_name("name") else {
        return;
    };
    let line = start_line(node);
    let owner = sites.declared_type(node_text(name, source), line);

    let mut targets: Vec<(String, usize)> = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class_heritage" => {
                let mut hc = child.walk();
                for clause in child.named_children(&mut hc) {
                    match clause.kind() {
                        "extends_clause" | "implements_clause" => {
                            let mut cc = clause.walk();
                            for target in clause.named_children(&mut cc) {
                                if let Some(t) = script_type_name(target, source) {
                                    targets.push((t.to_owned(), start_line(target)));
                                }
                            }
                        }
                        // JavaScript: `class A extends B` puts the expression directly
                        // under `class_heritage`.
                        _ => {
                            if let Some(t) = script_type_name(clause, source) {
                                targets.push((t.to_owned(), start_line(clause)));
                            }
                        }
                    }
                }
            }
            "extends_type_clause" => {
                let mut cc = child.walk();
                for target in child.named_children(&mut cc) {
                    if let Some(t) = script_type_name(target, source) {
                        targets.push((t.to_owned(), start_line(target)));
                    }
                }
            }
            _ => {}
        }
    }

    for (target, at) in targets {
        sites.push_from(Some(owner.clone()), &target, SiteKind::Inherit, at);
    }
}

fn script_sites(sites: &mut Sites, tree: &Tree, source: &[u8], kind: LanguageKind) {
    if let Some(query) = cached_query(&CALLS_QUERIES, kind, CALLS_QUERY) {
        run_callee_query(sites, query, tree, source, SiteKind::Call);
    }
    if kind != LanguageKind::JavaScript
        && let Some(query) = cached_query(&TYPE_REF_QUERIES, kind, TYPE_REF_QUERY)
    {
        run_callee_query(sites, query, tree, source, SiteKind::Reference);
    }

    walk_tree(tree.root_node(), |node| match node.kind() {
        "class_declaration" | "abstract_class_declaration" | "interface_declaration" => {
            script_heritage(sites, node, source)
        }
        "arguments" => {
            let mut cursor = node.walk();
            for arg in node.named_children(&mut cursor) {
                if arg.kind() == "identifier" {
                    sites.push_value_reference(node_text(arg, source), start_line(arg));
                }
            }
        }
        _ => {}
    });
}

// ---------------------------------------------------------------------------
// Python
// ---------------------------------------------------------------------------

fn python_name<'a>(node: Node<'a>, source: &'a [u8]) -> Option<&'a str> {
    match node.kind() {
        "identifier" => Some(node_text(node, source)),
        "attribute" => node
            .child_by_field_name("attribute")
            .map(|a| node_text(a, source)),
        _ => None,
    }
}

fn python_sites(sites: &mut Sites, tree: &Tree, source: &[u8]) {
    walk_tree(tree.root_node(), |node| match node.kind() {
        "call" => {
            if let Some(name) = node
                .child_by_field_name("function")
                .and_then(|f| python_name(f, source))
            {
                sites.push(name, SiteKind::Call, start_line(node));
            }
            if let Some(args) = node.child_by_field_name("arguments") {
                let mut cursor = args.walk();
                for arg in args.named_children(&mut cursor) {
                    if arg.kind() == "identifier" {
                        sites.push_value_reference(node_text(arg, source), start_line(arg));
                    }
                }
            }
        }
        "class_definition" => {
            let (Some(name), Some(bases)) = (
                node.child_by_field_name("name"),
                node.child_by_field_name("superclasses"),
            ) else {
                return;
            };
            let owner = sites.declared_type(node_text(name, source), start_line(node));
            let mut cursor = bases.walk();
            for base in bases.named_children(&mut cursor) {
                if let Some(base_name) = python_name(base, source) {
                    sites.push_from(
                        Some(owner.clone()),
                        base_name,
                        SiteKind::Inherit,
                        start_line(base),
                    );
                }
            }
        }
        // Annotations: `def f(x: Foo) -> Bar`.
        "type" => {
            if let Some(name) = node.named_child(0).and_then(|t| python_name(t, source)) {
                sites.push(name, SiteKind::Reference, start_line(node));
            }
        }
        _ => {}
    });
}

// ---------------------------------------------------------------------------
// Rust
// ---------------------------------------------------------------------------

/// User-defined type name behind a type node; primitives yield `None`.
fn rust_named_type<'a>(node: Node<'a>, source: &'a [u8]) -> Option<&'a str> {
    match node.kind() {
        "type_identifier" => Some(node_text(node, source)),
        "scoped_type_identifier" => node
            .child_by_field_name("name")
            .map(|n| node_text(n, source)),
        "generic_type" | "reference_type" | "pointer_type" => node
            .child_by_field_name("type")
            .and_then(|t| rust_named_type(t, source)),
        _ => None,
    }
}

fn rust_callee<'a>(node: Node<'a>, source: &'a [u8]) -> Option<&'a str> {
    match node.kind() {
        "identifier" => Some(node_text(node, source)),
        "scoped_identifier" => node
            .child_by_field_name("name")
            .map(|n| node_text(n, source)),
        "field_expression" => node
            .child_by_field_name("field")
            .map(|f| node_text(f, source)),
        "generic_function" => node
            .child_by_field_name("function")
            .and_then(|f| rust_callee(f, source)),
        _ => None,
    }
}

fn rust_sites(sites: &mut Sites, tree: &Tree, source: &[u8]) {
    walk_tree(tree.root_node(), |node| match node.kind() {
        "call_expression" => {
            if let Some(name) = node
                .child_by_field_name("function")
                .and_then(|f| rust_callee(f, source))
            {
                sites.push(name, SiteKind::Call, start_line(node));
            }
        }
        "arguments" => {
            let mut cursor = node.walk();
            for arg in node.named_children(&mut cursor) {
                if arg.kind() == "identifier" {
                    sites.push_value_reference(node_text(arg, source), start_line(arg));
                }
            }
        }
        "parameter" => {
            if let Some(name) = node
                .child_by_field_name("type")
                .and_then(|t| rust_named_type(t, source))
            {
                sites.push(name, SiteKind::Reference, start_line(node));
            }
        }
        "function_item" | "function_signature_item" => {
            if let Some(ret) = node
                .child_by_field_name("return_type")
                .and_then(|t| rust_named_type(t, source))
            {
                sites.push(ret, SiteKind::Reference, start_line(node));
            }
        }
        "impl_item" => {
            let (Some(trait_node), Some(type_node)) = (
                node.child_by_field_name("trait"),
                node.child_by_field_name("type"),
            ) else {
                return;
            };
            let (Some(trait_name), Some(type_name)) = (
                rust_named_type(trait_node, source),
                rust_named_type(type_node, source),
            ) else {
                return;
            };
            let owner = sites.declared_type(type_name, start_line(node));
            sites.push_from(Some(owner), trait_name, SiteKind::Inherit, start_line(node));
        }
        _ => {}
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::parser::{parse_tree, symbols::extract_symbols};

    fn sites_of(kind: LanguageKind, src: &str) -> Vec<CallSite> {
        let path = Path::new("/p/file");
        let tree = parse_tree(kind, path, src.as_bytes()).unwrap();
        let symbols = extract_symbols(&tree, src.as_bytes(), kind, path);
        extract_call_sites(&tree, src.as_bytes(), kind, &symbols)
    }

    fn has(sites: &[CallSite], caller: Option<&str>, callee: &str, kind: SiteKind) -> bool {
        sites
            .iter()
            .any(|s| s.caller.as_deref() == caller && s.callee == callee && s.kind == kind)
    }

    #[test]
    fn test_typescript_calls_and_references() {
        let src = r#"import { load } from './load';
const cfg = require('./cfg');

class Point {
  distance(other: Point): number {
    return Math.sqrt(this.square(other));
  }
  square(p: Point) { return 0; }
}

function main() {
  const p = new Point();
  p.distance(p);
  load(main);
}

main();
"#;
        let sites = sites_of(LanguageKind::TypeScript, src);
        assert!(has(&sites, Some("Point.distance"), "sqrt", SiteKind::Call));
        assert!(has(&sites, Some("Point.distance"), "square", SiteKind::Call));
        assert!(has(&sites, Some("Point.distance"), "Point", SiteKind::Reference));
        assert!(has(&sites, Some("main"), "Point", SiteKind::Call));
        assert!(has(&sites, Some("main"), "distance", SiteKind::Call));
        assert!(has(&sites, Some("main"), "load", SiteKind::Call));
        assert!(has(&sites, Some("main"), "main", SiteKind::Reference));
        assert!(has(&sites, None, "main", SiteKind::Call));
        assert!(sites.iter().all(|s| s.callee != "require"));
        // Local variables passed as values are not references.
        assert!(sites.iter().all(|s| s.callee != "p" && s.callee != "other"));
    }

    #[test]
    fn test_typescript_heritage() {
        let src = "class Base {}\ninterface Shape {}\ninterface Solid extends Shape {}\nclass Cube extends Base implements Solid {}\n";
        let sites = sites_of(LanguageKind::TypeScript, src);
        assert!(has(&sites, Some("Cube"), "Base", SiteKind::Inherit));
        assert!(has(&sites, Some("Cube"), "Solid", SiteKind::Inherit));
        assert!(has(&sites, Some("Solid"), "Shape", SiteKind::Inherit));
    }

    #[test]
    fn test_javascript_extends() {
        let src = "class Base {}\nclass Child extends Base {\n  run() { this.go(); }\n}\n";
        let sites = sites_of(LanguageKind::JavaScript, src);
        assert!(has(&sites, Some("Child"), "Base", SiteKind::Inherit));
        assert!(has(&sites, Some("Child.run"), "go", SiteKind::Call));
    }

    #[test]
    fn test_python_sites() {
        let src = "class Base:\n    pass\n\nclass Repo(Base):\n    def save(self, item: Item):\n        self.flush()\n        validate(item)\n\ndef validate(x):\n    pass\n";
        let sites = sites_of(LanguageKind::Python, src);
        assert!(has(&sites, Some("Repo"), "Base", SiteKind::Inherit));
        assert!(has(&sites, Some("Repo.save"), "flush", SiteKind::Call));
        assert!(has(&sites, Some("Repo.save"), "validate", SiteKind::Call));
        assert!(has(&sites, Some("Repo.save"), "Item", SiteKind::Reference));
    }

    #[test]
    fn test_rust_sites() {
        let src = r#"struct Point;
trait Shape { fn area(&self) -> f64; }

impl Shape for Point {
    fn area(&self) -> f64 { helper() }
}

fn helper() -> f64 { 0.0 }

fn main() {
    let p = Point;
    p.area();
    std::mem::drop(p);
    render(&p, helper);
}

fn render(p: &Point, f: fn() -> f64) {}
"#;
        let sites = sites_of(LanguageKind::Rust, src);
        assert!(has(&sites, Some("Point"), "Shape", SiteKind::Inherit));
        assert!(has(&sites, Some("Point.area"), "helper", SiteKind::Call));
        assert!(has(&sites, Some("main"), "area", SiteKind::Call));
        assert!(has(&sites, Some("main"), "drop", SiteKind::Call));
        assert!(has(&sites, Some("main"), "helper", SiteKind::Reference));
        assert!(has(&sites, Some("render"), "Point", SiteKind::Reference));
    }

    #[test]
    fn test_sites_sorted_by_line() {
        let sites = sites_of(LanguageKind::TypeScript, "b();\na();\nc();\n");
        let lines: Vec<_> = sites.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }
}
