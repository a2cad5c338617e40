use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Tree};

use super::{has_child_kind, node_text, start_line};
use crate::language::LanguageKind;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Annotated type with whitespace collapsed; `None` when unannotated.
    pub type_text: Option<String>,
    /// `x?: T` or a default value. Rust parameters are never optional.
    pub optional: bool,
}

/// A function or method signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Qualified name: `distance` or `Point.distance`.
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
    pub is_async: bool,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Property,
    Method,
}

/// A member of a TypeScript interface or Rust trait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceMember {
    pub owner: String,
    pub name: String,
    pub member_kind: MemberKind,
    pub type_text: Option<String>,
    pub optional: bool,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    ParameterAdded,
    ParameterRemoved,
    ParameterTypeChanged,
    ParameterBecameRequired,
    ReturnTypeChanged,
    AsyncChanged,
    Renamed,
}

/// One structural difference between two versions of a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureChange {
    pub kind: ChangeKind,
    pub detail: String,
    /// Existing call sites stop compiling (or change behavior) under the new signature.
    pub breaking: bool,
}

/// How a named signature moved between two versions of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Added,
    Removed,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDiff {
    pub name: String,
    pub status: DiffStatus,
    pub changes: Vec<SignatureChange>,
}

impl SignatureDiff {
    pub fn is_breaking(&self) -> bool {
        self.status == DiffStatus::Removed || self.changes.iter().any(|c| c.breaking)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();

/// Collapse runs of whitespace so formatting-only edits compare equal.
fn normalize_type(text: &str) -> String {
    let text = text.trim().trim_start_matches(':').trim_start_matches("->").trim();
    match WHITESPACE
        .get_or_init(|| Regex::new(r"\s+").ok())
        .as_ref()
    {
        Some(re) => re.replace_all(text, " ").into_owned(),
        None => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

fn type_of(node: Option<Node>, source: &[u8]) -> Option<String> {
    node.map(|n| normalize_type(node_text(n, source)))
        .filter(|t| !t.is_empty())
}

fn qualify(owner: Option<&str>, name: &str) -> String {
    match owner {
        Some(o) => format!("{o}.{name}"),
        None => name.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Signature extraction
// ---------------------------------------------------------------------------

/// Extract every function and method signature in document order.
pub fn extract_signatures(tree: &Tree, source: &[u8], kind: LanguageKind) -> Vec<Signature> {
    let mut out = Vec::new();
    let root = tree.root_node();
    match kind {
        LanguageKind::TypeScript | LanguageKind::Tsx | LanguageKind::JavaScript => {
            script_signatures(root, source, None, &mut out)
        }
        LanguageKind::Python => python_signatures(root, source, None, &mut out),
        LanguageKind::Rust => rust_signatures(root, source, None, &mut out),
    }
    out.sort_by_key(|s| s.line);
    out
}

fn script_parameters(params: Option<Node>, source: &[u8]) -> Vec<Parameter> {
    let Some(params) = params else {
        return Vec::new();
    };
    // `x => x` stores a bare identifier in `parameter`.
    if params.kind() == "identifier" {
        return vec![Parameter {
            name: node_text(params, source).to_owned(),
            type_text: None,
            optional: false,
        }];
    }
    let mut out = Vec::new();
    let mut cursor = params.walk();
    for p in params.named_children(&mut cursor) {
        let (name, type_text, optional) = match p.kind() {
            "required_parameter" | "optional_parameter" => {
                let name = p
                    .child_by_field_name("pattern")
                    .map(|n| node_text(n, source).to_owned())
                    .unwrap_or_default();
                let optional =
                    p.kind() == "optional_parameter" || p.child_by_field_name("value").is_some();
                (name, type_of(p.child_by_field_name("type"), source), optional)
            }
            "identifier" | "object_pattern" | "array_pattern" | "rest_pattern" => {
                (node_text(p, source).to_owned(), None, p.kind() == "rest_pattern")
            }
            "assignment_pattern" => {
                let name = p
                    .child_by_field_name("left")
                    .map(|n| node_text(n, source).to_owned())
                    .unwrap_or_default();
                (name, None, true)
            }
            _ => continue,
        };
        out.push(Parameter {
            name,
            type_text,
            optional,
        });
    }
    out
}

fn script_function(node: Node, name: &str, source: &[u8], owner: Option<&str>) -> Signature {
    let params = node
        .child_by_field_name("parameters")
        .or_else(|| node.child_by_field_name("parameter"));
    Signature {
        name: qualify(owner, name),
        parameters: script_parameters(params, source),
        return_type: type_of(node.child_by_field_name("return_type"), source),
        is_async: has_child_kind(node, "async"),
        line: start_line(node),
    }
}

fn script_signatures(node: Node, source: &[u8], owner: Option<&str>, out: &mut Vec<Signature>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "export_statement" => script_signatures(child, source, owner, out),
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = child.child_by_field_name("name") {
                    out.push(script_function(child, node_text(name, source), source, owner));
                }
            }
            "class_declaration" | "abstract_class_declaration" => {
                let (Some(name), Some(body)) =
                    (child.child_by_field_name("name"), child.child_by_field_name("body"))
                else {
                    continue;
                };
                let class_name = node_text(name, source);
                let mut bc = body.walk();
                for member in body.named_children(&mut bc) {
                    if matches!(member.kind(), "method_definition" | "abstract_method_signature")
                        && let Some(m) = member.child_by_field_name("name")
                    {
                        out.push(script_function(
                            member,
                            node_text(m, source),
                            source,
                            Some(class_name),
                        ));
                    }
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                let mut dc = child.walk();
                for declarator in child.named_children(&mut dc) {
                    let (Some(name), Some(value)) = (
                        declarator.child_by_field_name("name"),
                        declarator.child_by_field_name("value"),
                    ) else {
                        continue;
                    };
                    if matches!(
                        value.kind(),
                        "arrow_function" | "function" | "function_expression"
                    ) {
                        out.push(script_function(value, node_text(name, source), source, owner));
                    }
                }
            }
            _ => {}
        }
    }
}

fn python_parameters(params: Option<Node>, source: &[u8]) -> Vec<Parameter> {
    let Some(params) = params else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut cursor = params.walk();
    for p in params.named_children(&mut cursor) {
        let (name, type_text, optional) = match p.kind() {
            "identifier" => (node_text(p, source).to_owned(), None, false),
            "typed_parameter" => {
                let name = p
                    .named_child(0)
                    .map(|n| node_text(n, source).to_owned())
                    .unwrap_or_default();
                (name, type_of(p.child_by_field_name("type"), source), false)
            }
            "default_parameter" | "typed_default_parameter" => {
                let name = p
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_owned())
                    .unwrap_or_default();
                (name, type_of(p.child_by_field_name("type"), source), true)
            }
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                (node_text(p, source).to_owned(), None, true)
            }
            _ => continue,
        };
        if name == "self" || name == "cls" {
            continue;
        }
        out.push(Parameter {
            name,
            type_text,
            optional,
        });
    }
    out
}

fn python_signatures(node: Node, source: &[u8], owner: Option<&str>, out: &mut Vec<Signature>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let def = if child.kind() == "decorated_definition" {
            match child.child_by_field_name("definition") {
                Some(d) => d,
                None => continue,
            }
        } else {
            child
        };
        let Some(name) = def.child_by_field_name("name") else {
            continue;
        };
        let name = node_text(name, source);
        match def.kind() {
            "function_definition" => out.push(Signature {
                name: qualify(owner, name),
                parameters: python_parameters(def.child_by_field_name("parameters"), source),
                return_type: type_of(def.child_by_field_name("return_type"), source),
                is_async: has_child_kind(def, "async"),
                line: start_line(child),
            }),
            "class_definition" => {
                if let Some(body) = def.child_by_field_name("body") {
                    let qualified = qualify(owner, name);
                    python_signatures(body, source, Some(&qualified), out);
                }
            }
            _ => {}
        }
    }
}

fn rust_parameters(params: Option<Node>, source: &[u8]) -> Vec<Parameter> {
    let Some(params) = params else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut cursor = params.walk();
    for p in params.named_children(&mut cursor) {
        if p.kind() != "parameter" {
            continue;
        }
        out.push(Parameter {
            name: p
                .child_by_field_name("pattern")
                .map(|n| node_text(n, source).to_owned())
                .unwrap_or_default(),
            type_text: type_of(p.child_by_field_name("type"), source),
            optional: false,
        });
    }
    out
}

fn rust_function(node: Node, source: &[u8], owner: Option<&str>) -> Option<Signature> {
    let name = node.child_by_field_name("name")?;
    let is_async = node
        .named_children(&mut node.walk())
        .any(|c| c.kind() == "function_modifiers" && node_text(c, source).contains("async"));
    Some(Signature {
        name: qualify(owner, node_text(name, source)),
        parameters: rust_parameters(node.child_by_field_name("parameters"), source),
        return_type: type_of(node.child_by_field_name("return_type"), source),
        is_async,
        line: start_line(node),
    })
}

fn rust_signatures(node: Node, source: &[u8], owner: Option<&str>, out: &mut Vec<Signature>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "function_item" | "function_signature_item" => {
                out.extend(rust_function(child, source, owner));
            }
            "impl_item" | "trait_item" => {
                let type_field = if child.kind() == "impl_item" { "type" } else { "name" };
                let (Some(target), Some(body)) = (
                    child.child_by_field_name(type_field),
                    child.child_by_field_name("body"),
                ) else {
                    continue;
                };
                let base = match target.kind() {
                    "generic_type" => target.child_by_field_name("type").unwrap_or(target),
                    _ => target,
                };
                let qualified = qualify(owner, node_text(base, source));
                rust_signatures(body, source, Some(&qualified), out);
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Interface members
// ---------------------------------------------------------------------------

/// Members of TypeScript interfaces and Rust traits.
pub fn extract_interface_members(
    tree: &Tree,
    source: &[u8],
    kind: LanguageKind,
) -> Vec<InterfaceMember> {
    let mut out = Vec::new();
    let root = tree.root_node();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match (kind, node.kind()) {
            (LanguageKind::TypeScript | LanguageKind::Tsx, "interface_declaration") => {
                let (Some(name), Some(body)) =
                    (node.child_by_field_name("name"), node.child_by_field_name("body"))
                else {
                    continue;
                };
                let owner = node_text(name, source);
                let mut cursor = body.walk();
                for member in body.named_children(&mut cursor) {
                    let member_kind = match member.kind() {
                        "property_signature" => MemberKind::Property,
                        "method_signature" => MemberKind::Method,
                        _ => continue,
                    };
                    let Some(member_name) = member.child_by_field_name("name") else {
                        continue;
                    };
                    let type_text = match member_kind {
                        MemberKind::Property => type_of(member.child_by_field_name("type"), source),
                        // Everything after the name: `(by: number): void`.
                        MemberKind::Method => {
                            let text = node_text(member, source);
                            let offset = member_name.end_byte() - member.start_byte();
                            let rest = normalize_type(text.get(offset..).unwrap_or(""));
                            (!rest.is_empty()).then_some(rest)
                        }
                    };
                    out.push(InterfaceMember {
                        owner: owner.to_owned(),
                        name: node_text(member_name, source).to_owned(),
                        member_kind,
                        type_text,
                        optional: has_child_kind(member, "?"),
                        line: start_line(member),
                    });
                }
            }
            (LanguageKind::Rust, "trait_item") => {
                let (Some(name), Some(body)) =
                    (node.child_by_field_name("name"), node.child_by_field_name("body"))
                else {
                    continue;
                };
                let owner = node_text(name, source);
                let mut cursor = body.walk();
                for member in body.named_children(&mut cursor) {
                    let (member_kind, optional) = match member.kind() {
                        "function_signature_item" => (MemberKind::Method, false),
                        // Provided methods have a default body.
                        "function_item" => (MemberKind::Method, true),
                        "associated_type" => (MemberKind::Property, false),
                        _ => continue,
                    };
                    let Some(member_name) = member.child_by_field_name("name") else {
                        continue;
                    };
                    let signature = match member_kind {
                        MemberKind::Method => rust_function(member, source, None),
                        MemberKind::Property => None,
                    };
                    let type_text = signature.map(|sig| {
                        let params: Vec<_> = sig
                            .parameters
                            .iter()
                            .map(|p| p.type_text.clone().unwrap_or_default())
                            .collect();
                        match sig.return_type {
                            Some(ret) => format!("fn({}) -> {ret}", params.join(", ")),
                            None => format!("fn({})", params.join(", ")),
                        }
                    });
                    out.push(InterfaceMember {
                        owner: owner.to_owned(),
                        name: node_text(member_name, source).to_owned(),
                        member_kind,
                        type_text,
                        optional,
                        line: start_line(member),
                    });
                }
            }
            _ => {
                let mut cursor = node.walk();
                stack.extend(node.named_children(&mut cursor));
            }
        }
    }
    out.sort_by_key(|m| m.line);
    out
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Structural diff of two versions of one signature. Parameters are compared by position.
pub fn compare_signatures(old: &Signature, new: &Signature) -> Vec<SignatureChange> {
    let mut changes = Vec::new();

    if old.name != new.name {
        changes.push(SignatureChange {
            kind: ChangeKind::Renamed,
            detail: format!("renamed from '{}' to '{}'", old.name, new.name),
            breaking: true,
        });
    }

    for (i, (before, after)) in old.parameters.iter().zip(&new.parameters).enumerate() {
        if before.type_text != after.type_text {
            changes.push(SignatureChange {
                kind: ChangeKind::ParameterTypeChanged,
                detail: format!(
                    "parameter {} '{}' changed type from '{}' to '{}'",
                    i + 1,
                    after.name,
                    before.type_text.as_deref().unwrap_or("untyped"),
                    after.type_text.as_deref().unwrap_or("untyped"),
                ),
                breaking: true,
            });
        }
        if before.optional && !after.optional {
            changes.push(SignatureChange {
                kind: ChangeKind::ParameterBecameRequired,
                detail: format!("parameter {} '{}' is now required", i + 1, after.name),
                breaking: true,
            });
        }
    }

    for added in new.parameters.iter().skip(old.parameters.len()) {
        changes.push(SignatureChange {
            kind: ChangeKind::ParameterAdded,
            detail: format!(
                "added {} parameter '{}'",
                if added.optional { "optional" } else { "required" },
                added.name
            ),
            breaking: !added.optional,
        });
    }

    for removed in old.parameters.iter().skip(new.parameters.len()) {
        changes.push(SignatureChange {
            kind: ChangeKind::ParameterRemoved,
            detail: format!("removed parameter '{}'", removed.name),
            breaking: true,
        });
    }

    if old.return_type != new.return_type {
        changes.push(SignatureChange {
            kind: ChangeKind::ReturnTypeChanged,
            detail: format!(
                "return type changed from '{}' to '{}'",
                old.return_type.as_deref().unwrap_or("unspecified"),
                new.return_type.as_deref().unwrap_or("unspecified"),
            ),
            // Adding an annotation where there was none does not break callers.
            breaking: old.return_type.is_some(),
        });
    }

    if old.is_async != new.is_async {
        changes.push(SignatureChange {
            kind: ChangeKind::AsyncChanged,
            detail: if new.is_async {
                "function became async".to_owned()
            } else {
                "function is no longer async".to_owned()
            },
            breaking: true,
        });
    }

    changes
}

/// Pair signatures by qualified name and diff each pair.
///
/// Only names that were added, removed or changed are reported, in the order they
/// appear in `old` followed by additions in `new`.
pub fn diff_signature_sets(old: &[Signature], new: &[Signature]) -> Vec<SignatureDiff> {
    let new_by_name: HashMap<&str, &Signature> =
        new.iter().map(|s| (s.name.as_str(), s)).collect();
    let old_names: HashSet<&str> = old.iter().map(|s| s.name.as_str()).collect();

    let mut out = Vec::new();
    for before in old {
        match new_by_name.get(before.name.as_str()) {
            Some(after) => {
                let changes = compare_signatures(before, after);
                if !changes.is_empty() {
                    out.push(SignatureDiff {
                        name: before.name.clone(),
                        status: DiffStatus::Changed,
                        changes,
                    });
                }
            }
            None => out.push(SignatureDiff {
                name: before.name.clone(),
                status: DiffStatus::Removed,
                changes: Vec::new(),
            }),
        }
    }
    for after in new {
        if !old_names.contains(after.name.as_str()) {
            out.push(SignatureDiff {
                name: after.name.clone(),
                status: DiffStatus::Added,
                changes: Vec::new(),
            });
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::parser::parse_tree;

    fn sigs(kind: LanguageKind, src: &str) -> Vec<Signature> {
        let tree = parse_tree(kind, Path::new("/t"), src.as_bytes()).unwrap();
        extract_signatures(&tree, src.as_bytes(), kind)
    }

    fn sig(name: &str, params: &[(&str, Option<&str>, bool)], ret: Option<&str>) -> Signature {
        Signature {
            name: name.to_owned(),
            parameters: params
                .iter()
                .map(|(n, t, o)| Parameter {
                    name: (*n).to_owned(),
                    type_text: t.map(str::to_owned),
                    optional: *o,
                })
                .collect(),
            return_type: ret.map(str::to_owned),
            is_async: false,
            line: 1,
        }
    }

    #[test]
    fn test_typescript_signatures() {
        let src = "export async function load(id: string, opts?: Options): Promise<User> {}\nclass Repo {\n  save(item: Item, force = false) {}\n}\nconst fmt = (v: number):   string => '';\n";
        let s = sigs(LanguageKind::TypeScript, src);
        assert_eq!(s.len(), 3);
        assert_eq!(s[0].name, "load");
        assert!(s[0].is_async);
        assert_eq!(s[0].return_type.as_deref(), Some("Promise<User>"));
        assert_eq!(s[0].parameters[0].type_text.as_deref(), Some("string"));
        assert!(s[0].parameters[1].optional);
        assert_eq!(s[1].name, "Repo.save");
        assert!(s[1].parameters[1].optional);
        assert_eq!(s[2].name, "fmt");
        assert_eq!(s[2].return_type.as_deref(), Some("string"));
    }

    #[test]
    fn test_python_signatures_skip_self() {
        let src = "class Svc:\n    async def run(self, job: Job, retries: int = 3) -> bool:\n        pass\n";
        let s = sigs(LanguageKind::Python, src);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].name, "Svc.run");
        assert!(s[0].is_async);
        assert_eq!(s[0].parameters.len(), 2);
        assert_eq!(s[0].parameters[0].type_text.as_deref(), Some("Job"));
        assert!(s[0].parameters[1].optional);
        assert_eq!(s[0].return_type.as_deref(), Some("bool"));
    }

    #[test]
    fn test_rust_signatures() {
        let src = "pub async fn fetch(url: &str) -> Result<String, Error> { todo!() }\nimpl<T> Cache<T> {\n    pub fn get(&self, key: &K) -> Option<&T> { None }\n}\n";
        let s = sigs(LanguageKind::Rust, src);
        assert_eq!(s.len(), 2);
        assert!(s[0].is_async);
        assert_eq!(s[0].return_type.as_deref(), Some("Result<String, Error>"));
        assert_eq!(s[1].name, "Cache.get");
        assert_eq!(s[1].parameters.len(), 1);
    }

    #[test]
    fn test_interface_members() {
        let src = "interface Shape {\n  area: number;\n  label?: string;\n  scale(by: number): void;\n}\n";
        let tree = parse_tree(LanguageKind::TypeScript, Path::new("/t"), src.as_bytes()).unwrap();
        let members = extract_interface_members(&tree, src.as_bytes(), LanguageKind::TypeScript);
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].type_text.as_deref(), Some("number"));
        assert!(members[1].optional);
        assert_eq!(members[2].member_kind, MemberKind::Method);
        assert_eq!(members[2].type_text.as_deref(), Some("(by: number): void"));
        assert!(members.iter().all(|m| m.owner == "Shape"));
    }

    #[test]
    fn test_rust_trait_members() {
        let src = "trait Store {\n    type Key;\n    fn get(&self, k: u32) -> String;\n    fn name(&self) -> &str { \"s\" }\n}\n";
        let tree = parse_tree(LanguageKind::Rust, Path::new("/t"), src.as_bytes()).unwrap();
        let members = extract_interface_members(&tree, src.as_bytes(), LanguageKind::Rust);
        assert_eq!(members.len(), 3);
        assert_eq!(members[1].type_text.as_deref(), Some("fn(u32) -> String"));
        assert!(!members[1].optional);
        assert!(members[2].optional);
    }

    #[test]
    fn test_added_optional_parameter_is_not_breaking() {
        let old = sig("f", &[("a", Some("string"), false)], None);
        let new = sig("f", &[("a", Some("string"), false), ("b", Some("number"), true)], None);
        let changes = compare_signatures(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::ParameterAdded);
        assert!(!changes[0].breaking);
    }

    #[test]
    fn test_breaking_changes_detected() {
        let old = sig("f", &[("a", Some("string"), true), ("b", None, false)], Some("number"));
        let new = sig("g", &[("a", Some("number"), false)], Some("string"));
        let kinds: Vec<_> = compare_signatures(&old, &new).iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Renamed,
                ChangeKind::ParameterTypeChanged,
                ChangeKind::ParameterBecameRequired,
                ChangeKind::ParameterRemoved,
                ChangeKind::ReturnTypeChanged,
            ]
        );
    }

    #[test]
    fn test_whitespace_only_edit_is_not_a_change() {
        let old = sig("f", &[("a", Some("Map<string, number>"), false)], None);
        let mut new = old.clone();
        new.parameters[0].type_text = Some(normalize_type("Map<string,   number>"));
        assert!(compare_signatures(&old, &new).is_empty());
    }

    #[test]
    fn test_diff_signature_sets() {
        let old = vec![sig("keep", &[], None), sig("gone", &[], None), sig("edit", &[], None)];
        let new = vec![
            sig("keep", &[], None),
            sig("edit", &[("x", None, false)], None),
            sig("fresh", &[], None),
        ];
        let diffs = diff_signature_sets(&old, &new);
        let summary: Vec<_> = diffs.iter().map(|d| (d.name.as_str(), d.status)).collect();
        assert_eq!(
            summary,
            vec![
                ("gone", DiffStatus::Removed),
                ("edit", DiffStatus::Changed),
                ("fresh", DiffStatus::Added),
            ]
        );
        assert!(diffs[0].is_breaking());
        assert!(diffs[1].is_breaking());
        assert!(!diffs[2].is_breaking());
    }
}
