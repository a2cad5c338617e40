use std::collections::HashSet;
use std::path::Path;

use tree_sitter::{Node, Tree};

use super::{end_line, has_child_kind, node_text, start_line};
use crate::graph::{symbol_id, LineRange, SymbolInfo, SymbolKind};
use crate::language::LanguageKind;

/// Identity of an enclosing declaration while walking its members.
#[derive(Debug, Clone)]
struct Owner {
    qualified: String,
    id: String,
}

/// Accumulates symbols for one file and keeps their ids unique.
struct Collector<'a> {
    file: &'a Path,
    source: &'a [u8],
    symbols: Vec<SymbolInfo>,
    ids: HashSet<String>,
}

impl<'a> Collector<'a> {
    fn new(file: &'a Path, source: &'a [u8]) -> Self {
        Self {
            file,
            source,
            symbols: Vec::new(),
            ids: HashSet::new(),
        }
    }

    fn text(&self, node: Node<'a>) -> &'a str {
        node_text(node, self.source)
    }

    /// Record a symbol spanning `node`. A qualified name already taken in this file
    /// gets its start line appended to the id.
    fn push(
        &mut self,
        name: &str,
        kind: SymbolKind,
        node: Node,
        is_exported: bool,
        owner: Option<&Owner>,
    ) -> Owner {
        let qualified = match owner {
            Some(o) => format!("{}.{}", o.qualified, name),
            None => name.to_owned(),
        };
        let mut id = symbol_id(self.file, &qualified);
        if !self.ids.insert(id.clone()) {
            id = format!("{id}@{}", start_line(node));
            self.ids.insert(id.clone());
        }
        self.symbols.push(SymbolInfo {
            id: id.clone(),
            name: name.to_owned(),
            qualified_name: qualified.clone(),
            kind,
            range: LineRange::new(start_line(node), end_line(node)),
            is_exported,
            parent_id: owner.map(|o| o.id.clone()),
        });
        Owner { qualified, id }
    }

    fn finish(mut self) -> Vec<SymbolInfo> {
        self.symbols.sort_by_key(|s| s.range.start);
        self.symbols
    }
}

/// Extract declared symbols from a parsed tree, ordered by start line.
pub fn extract_symbols(
    tree: &Tree,
    source: &[u8],
    kind: LanguageKind,
    file: &Path,
) -> Vec<SymbolInfo> {
    let mut collector = Collector::new(file, source);
    let root = tree.root_node();
    match kind {
        LanguageKind::TypeScript | LanguageKind::Tsx | LanguageKind::JavaScript => {
            let mut cursor = root.walk();
            for stmt in root.named_children(&mut cursor) {
                visit_script_statement(&mut collector, stmt, false);
            }
        }
        LanguageKind::Python => visit_python_block(&mut collector, root, None),
        LanguageKind::Rust => visit_rust_items(&mut collector, root, None),
    }
    collector.finish()
}

// ---------------------------------------------------------------------------
// TypeScript / TSX / JavaScript
// ---------------------------------------------------------------------------

/// Return true if `node` is an `arrow_function` or a `function` expression.
fn is_arrow_or_function_value(node: Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function" | "function_expression" | "generator_function"
    )
}

fn visit_script_statement<'a>(c: &mut Collector<'a>, node: Node<'a>, exported: bool) {
    match node.kind() {
        "export_statement" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                visit_script_statement(c, child, true);
            }
        }
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name) = node.child_by_field_name("name") {
                c.push(c.text(name), SymbolKind::Function, node, exported, None);
            }
        }
        "class_declaration" | "abstract_class_declaration" | "class" => {
            let Some(name) = node.child_by_field_name("name") else {
                return;
            };
            let owner = c.push(c.text(name), SymbolKind::Class, node, exported, None);
            if let Some(body) = node.child_by_field_name("body") {
                visit_class_body(c, body, &owner);
            }
        }
        "interface_declaration" => {
            let Some(name) = node.child_by_field_name("name") else {
                return;
            };
            let owner = c.push(c.text(name), SymbolKind::Interface, node, exported, None);
            if let Some(body) = node.child_by_field_name("body") {
                visit_interface_body(c, body, &owner);
            }
        }
        "type_alias_declaration" => {
            if let Some(name) = node.child_by_field_name("name") {
                c.push(c.text(name), SymbolKind::Type, node, exported, None);
            }
        }
        "enum_declaration" => {
            if let Some(name) = node.child_by_field_name("name") {
                c.push(c.text(name), SymbolKind::Other, node, exported, None);
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            for declarator in node.named_children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(name) = declarator.child_by_field_name("name") else {
                    continue;
                };
                // Destructuring patterns declare no single named symbol.
                if name.kind() != "identifier" {
                    continue;
                }
                let is_function = declarator
                    .child_by_field_name("value")
                    .is_some_and(is_arrow_or_function_value);
                if is_function {
                    c.push(c.text(name), SymbolKind::Function, declarator, exported, None);
                } else if exported {
                    c.push(c.text(name), SymbolKind::Variable, declarator, exported, None);
                }
            }
        }
        _ => {}
    }
}

fn visit_class_body<'a>(c: &mut Collector<'a>, body: Node<'a>, owner: &Owner) {
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        match member.kind() {
            "method_definition" | "abstract_method_signature" | "method_signature" => {
                if let Some(name) = member.child_by_field_name("name") {
                    c.push(c.text(name), SymbolKind::Method, member, false, Some(owner));
                }
            }
            "public_field_definition" | "field_definition" => {
                let name = member
                    .child_by_field_name("name")
                    .or_else(|| member.child_by_field_name("property"));
                let Some(name) = name else {
                    continue;
                };
                let kind = if member
                    .child_by_field_name("value")
                    .is_some_and(is_arrow_or_function_value)
                {
                    SymbolKind::Method
                } else {
                    SymbolKind::Variable
                };
                c.push(c.text(name), kind, member, false, Some(owner));
            }
            _ => {}
        }
    }
}

fn visit_interface_body<'a>(c: &mut Collector<'a>, body: Node<'a>, owner: &Owner) {
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        let kind = match member.kind() {
            "property_signature" => SymbolKind::Variable,
            "method_signature" => SymbolKind::Method,
            _ => continue,
        };
        if let Some(name) = member.child_by_field_name("name") {
            c.push(c.text(name), kind, member, false, Some(owner));
        }
    }
}

// ---------------------------------------------------------------------------
// Python
// ---------------------------------------------------------------------------

/// Walk a module or class block. `decorated_definition` spans its decorators.
fn visit_python_block<'a>(c: &mut Collector<'a>, block: Node<'a>, owner: Option<&Owner>) {
    let mut cursor = block.walk();
    for stmt in block.named_children(&mut cursor) {
        let (definition, span) = if stmt.kind() == "decorated_definition" {
            match stmt.child_by_field_name("definition") {
                Some(def) => (def, stmt),
                None => continue,
            }
        } else {
            (stmt, stmt)
        };
        visit_python_definition(c, definition, span, owner);
    }
}

fn visit_python_definition<'a>(
    c: &mut Collector<'a>,
    node: Node<'a>,
    span: Node<'a>,
    owner: Option<&Owner>,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = c.text(name_node);
    let exported = !name.starts_with('_');
    match node.kind() {
        "function_definition" => {
            let kind = if owner.is_some() {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            c.push(name, kind, span, exported, owner);
        }
        "class_definition" => {
            let class = c.push(name, SymbolKind::Class, span, exported, owner);
            if let Some(body) = node.child_by_field_name("body") {
                visit_python_block(c, body, Some(&class));
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Rust
// ---------------------------------------------------------------------------

/// Bare type name of an `impl` target: `Foo`, `Foo<T>` and `a::Foo` all yield `Foo`.
fn rust_type_name<'a>(node: Node<'a>, source: &'a [u8]) -> Option<&'a str> {
    match node.kind() {
        "type_identifier" | "primitive_type" => Some(node_text(node, source)),
        "generic_type" => node
            .child_by_field_name("type")
            .and_then(|t| rust_type_name(t, source)),
        "scoped_type_identifier" => node
            .child_by_field_name("name")
            .map(|n| node_text(n, source)),
        "reference_type" => node
            .child_by_field_name("type")
            .and_then(|t| rust_type_name(t, source)),
        _ => None,
    }
}

fn visit_rust_items<'a>(c: &mut Collector<'a>, container: Node<'a>, owner: Option<&Owner>) {
    let mut impls = Vec::new();
    let mut cursor = container.walk();
    for item in container.named_children(&mut cursor) {
        let exported = has_child_kind(item, "visibility_modifier");
        let kind = match item.kind() {
            "function_item" => SymbolKind::Function,
            "struct_item" | "union_item" => SymbolKind::Class,
            "enum_item" => SymbolKind::Other,
            "type_item" => SymbolKind::Type,
            "const_item" | "static_item" => SymbolKind::Variable,
            "trait_item" => {
                let Some(name) = item.child_by_field_name("name") else {
                    continue;
                };
                let trait_owner = c.push(c.text(name), SymbolKind::Interface, item, exported, owner);
                if let Some(body) = item.child_by_field_name("body") {
                    visit_rust_methods(c, body, &trait_owner, true);
                }
                continue;
            }
            "mod_item" => {
                let (Some(name), Some(body)) =
                    (item.child_by_field_name("name"), item.child_by_field_name("body"))
                else {
                    continue;
                };
                let module = c.push(c.text(name), SymbolKind::Other, item, exported, owner);
                visit_rust_items(c, body, Some(&module));
                continue;
            }
            "impl_item" => {
                impls.push(item);
                continue;
            }
            _ => continue,
        };
        if let Some(name) = item.child_by_field_name("name") {
            c.push(c.text(name), kind, item, exported, owner);
        }
    }

    // Impl blocks run after every item in the container so the parent type is known
    // regardless of declaration order.
    for item in impls {
        let Some(type_name) = item
            .child_by_field_name("type")
            .and_then(|t| rust_type_name(t, c.source))
        else {
            continue;
        };
        let qualified = match owner {
            Some(o) => format!("{}.{}", o.qualified, type_name),
            None => type_name.to_owned(),
        };
        let parent_id = c
            .symbols
            .iter()
            .find(|s| s.qualified_name == qualified)
            .map(|s| s.id.clone());
        let impl_owner = Owner {
            id: parent_id.clone().unwrap_or_default(),
            qualified,
        };
        // Trait impls expose the trait's methods; inherent impls need `pub`.
        let is_trait_impl = item.child_by_field_name("trait").is_some();
        if let Some(body) = item.child_by_field_name("body") {
            let start = c.symbols.len();
            visit_rust_methods(c, body, &impl_owner, is_trait_impl);
            if parent_id.is_none() {
                for sym in &mut c.symbols[start..] {
                    sym.parent_id = None;
                }
            }
        }
    }
}

fn visit_rust_methods<'a>(
    c: &mut Collector<'a>,
    body: Node<'a>,
    owner: &Owner,
    exported_by_default: bool,
) {
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        if !matches!(member.kind(), "function_item" | "function_signature_item") {
            continue;
        }
        if let Some(name) = member.child_by_field_name("name") {
            let exported = exported_by_default || has_child_kind(member, "visibility_modifier");
            c.push(c.text(name), SymbolKind::Method, member, exported, Some(owner));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
