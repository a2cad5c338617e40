pub mod calls;
pub mod imports;
pub mod languages;
pub mod signatures;
pub mod symbols;
pub mod usage;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser, Tree};

use crate::error::{AnalysisError, Result};
use crate::graph::{DependencyKind, SymbolInfo};
use crate::language::LanguageKind;

use languages::language_for;

// Thread-local Parser instances: one per thread and grammar, zero lock contention.
// Each Parser is initialised lazily on first use of its grammar.
thread_local! {
    static PARSERS: RefCell<HashMap<LanguageKind, Parser>> = RefCell::new(HashMap::new());
    static PARSED_SINCE_RESET: Cell<usize> = const { Cell::new(0) };
}

/// An import statement as written, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImport {
    /// The raw module specifier, e.g. `"./utils"`, `"..helpers"`, `"crate::parser"`.
    pub module: String,
    pub kind: DependencyKind,
    /// 1-based line of the statement.
    pub line: usize,
    /// Local names the statement binds: `X` of `import X`, `b` of `a as b`.
    #[serde(default)]
    pub bindings: Vec<String>,
    /// Bindings that nothing else in the file refers to.
    #[serde(default)]
    pub unused: Vec<String>,
    /// Python `from m import a, b`: imported names that may be submodules of `m`,
    /// parallel to `bindings`.
    #[serde(default)]
    pub submodules: Vec<String>,
}

impl RawImport {
    pub fn new(module: impl Into<String>, kind: DependencyKind, line: usize) -> Self {
        Self {
            module: module.into(),
            kind,
            line,
            bindings: Vec::new(),
            unused: Vec::new(),
            submodules: Vec::new(),
        }
    }

    pub fn with_bindings(mut self, bindings: Vec<String>) -> Self {
        self.bindings = bindings;
        self
    }

    /// Whether anything the statement binds is used. Statements that bind nothing
    /// (side effects, globs, dynamic imports) count as used, as do re-exports.
    pub fn is_used(&self) -> bool {
        self.kind == DependencyKind::ReExport
            || self.bindings.is_empty()
            || self.unused.len() < self.bindings.len()
    }
}

/// What a call site does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteKind {
    /// `f()`, `obj.m()`, `new C()`.
    Call,
    /// Type annotations, identifiers passed as values.
    Reference,
    /// `extends`, `implements`, base classes, `impl Trait for Type`.
    Inherit,
}

/// A syntactic use of a name inside a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Qualified name of the enclosing symbol; `None` at module scope.
    pub caller: Option<String>,
    /// Name as written at the site (bare member name for method calls).
    pub callee: String,
    pub kind: SiteKind,
    /// 1-based line of the site.
    pub line: usize,
}

/// Everything one analyzer extracts from one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub imports: Vec<RawImport>,
    pub symbols: Vec<SymbolInfo>,
    pub call_sites: Vec<CallSite>,
}

/// Capability set of a per-language analyzer.
///
/// Analyzers only look at the text they are given: they never resolve paths and never
/// touch the filesystem. Unsupported syntax degrades to partial results; an error is
/// returned only when the parser produces no tree at all.
pub trait LanguageAnalyzer: Send + Sync {
    fn language(&self) -> LanguageKind;

    /// Extensions this analyzer is registered for.
    fn extensions(&self) -> &'static [&'static str] {
        self.language().extensions()
    }

    fn parse_imports(&self, path: &Path, source: &str) -> Result<Vec<RawImport>>;

    fn extract_symbols(&self, path: &Path, source: &str) -> Result<Vec<SymbolInfo>>;

    /// Imports, symbols and call sites in one parse.
    fn analyze(&self, path: &Path, source: &str) -> Result<FileAnalysis>;
}

/// Tree-sitter backed analyzer for one of the built-in languages.
#[derive(Debug, Clone, Copy)]
pub struct TreeSitterAnalyzer {
    kind: LanguageKind,
}

impl TreeSitterAnalyzer {
    pub fn new(kind: LanguageKind) -> Self {
        Self { kind }
    }
}

impl LanguageAnalyzer for TreeSitterAnalyzer {
    fn language(&self) -> LanguageKind {
        self.kind
    }

    fn parse_imports(&self, path: &Path, source: &str) -> Result<Vec<RawImport>> {
        let tree = parse_tree(self.kind, path, source.as_bytes())?;
        Ok(imports::extract_imports(&tree, source.as_bytes(), self.kind))
    }

    fn extract_symbols(&self, path: &Path, source: &str) -> Result<Vec<SymbolInfo>> {
        let tree = parse_tree(self.kind, path, source.as_bytes())?;
        Ok(symbols::extract_symbols(&tree, source.as_bytes(), self.kind, path))
    }

    fn analyze(&self, path: &Path, source: &str) -> Result<FileAnalysis> {
        let bytes = source.as_bytes();
        let tree = parse_tree(self.kind, path, bytes)?;
        let imports = imports::extract_imports(&tree, bytes, self.kind);
        let symbols = symbols::extract_symbols(&tree, bytes, self.kind, path);
        let call_sites = calls::extract_call_sites(&tree, bytes, self.kind, &symbols);
        Ok(FileAnalysis {
            imports,
            symbols,
            call_sites,
        })
    }
}

/// Extension → analyzer lookup.
#[derive(Clone)]
pub struct AnalyzerRegistry {
    by_extension: HashMap<String, Arc<dyn LanguageAnalyzer>>,
}

impl AnalyzerRegistry {
    /// An empty registry: every file is unsupported.
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Registry with the tree-sitter analyzers for every built-in language.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for kind in LanguageKind::ALL {
            registry.register(Arc::new(TreeSitterAnalyzer::new(kind)));
        }
        registry
    }

    /// Register `analyzer` for all of its extensions, replacing previous registrations.
    pub fn register(&mut self, analyzer: Arc<dyn LanguageAnalyzer>) {
        for ext in analyzer.extensions() {
            self.by_extension
                .insert((*ext).to_owned(), Arc::clone(&analyzer));
        }
    }

    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn LanguageAnalyzer>> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        self.by_extension.get(ext).cloned()
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut exts: Vec<_> = self.by_extension.keys().collect();
        exts.sort();
        f.debug_struct("AnalyzerRegistry")
            .field("extensions", &exts)
            .finish()
    }
}

/// Parse `source` with this thread's parser for `kind`.
pub fn parse_tree(kind: LanguageKind, path: &Path, source: &[u8]) -> Result<Tree> {
    let tree = PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(kind) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                let mut p = Parser::new();
                p.set_language(&language_for(kind)).map_err(|e| {
                    AnalysisError::parse(path, format!("failed to load {} grammar: {e}", kind.display_name()))
                })?;
                v.insert(p)
            }
        };
        parser
            .parse(source, None)
            .ok_or_else(|| AnalysisError::parse(path, "tree-sitter returned no tree"))
    })?;
    PARSED_SINCE_RESET.with(|c| c.set(c.get() + 1));
    Ok(tree)
}

/// Drop this thread's parsers so their internal allocations are released.
///
/// Returns the number of files parsed on this thread since the previous reset.
pub fn reset_parsers() -> usize {
    PARSERS.with(|cell| cell.borrow_mut().clear());
    PARSED_SINCE_RESET.with(|c| c.replace(0))
}

// ---------------------------------------------------------------------------
// Shared tree helpers
// ---------------------------------------------------------------------------

pub(crate) fn node_text<'a>(node: Node<'a>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

pub(crate) fn start_line(node: Node) -> usize {
    node.start_position().row + 1
}

pub(crate) fn end_line(node: Node) -> usize {
    node.end_position().row + 1
}

/// Return true when `node` has a direct (anonymous or named) child of the given kind.
pub(crate) fn has_child_kind(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == kind)
}

/// Visit `root` and every descendant in document order without recursion.
pub(crate) fn walk_tree<'a>(root: Node<'a>, mut visit: impl FnMut(Node<'a>)) {
    let mut cursor = root.walk();
    loop {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_registry_dispatch() {
        let registry = AnalyzerRegistry::with_defaults();
        assert_eq!(
            registry
                .for_path(Path::new("/a/b.tsx"))
                .map(|a| a.language()),
            Some(LanguageKind::Tsx)
        );
        assert!(registry.is_supported(Path::new("/a/b.py")));
        assert!(!registry.is_supported(Path::new("/a/b.go")));
        assert!(!registry.is_supported(Path::new("/a/Makefile")));
    }

    #[test]
    fn test_empty_registry_supports_nothing() {
        let registry = AnalyzerRegistry::empty();
        assert!(!registry.is_supported(Path::new("/a/b.ts")));
    }

    #[test]
    fn test_analyze_typescript_file() {
        let path = PathBuf::from("/proj/src/app.ts");
        let src = "import { helper } from './helper';\n\nexport function main() {\n  helper();\n}\n";
        let analysis = TreeSitterAnalyzer::new(LanguageKind::TypeScript)
            .analyze(&path, src)
            .unwrap();
        assert_eq!(analysis.imports.len(), 1);
        assert_eq!(analysis.imports[0].module, "./helper");
        assert_eq!(analysis.symbols.len(), 1);
        assert_eq!(analysis.symbols[0].name, "main");
        assert!(
            analysis
                .call_sites
                .iter()
                .any(|c| c.callee == "helper" && c.caller.as_deref() == Some("main"))
        );
    }

    #[test]
    fn test_syntax_error_degrades_to_partial() {
        let path = PathBuf::from("/proj/broken.ts");
        let src = "import a from './a';\nfunction ok() {}\nclass {{{ broken\n";
        let analysis = TreeSitterAnalyzer::new(LanguageKind::TypeScript)
            .analyze(&path, src)
            .expect("syntax errors must not fail the file");
        assert!(analysis.imports.iter().any(|i| i.module == "./a"));
        assert!(analysis.symbols.iter().any(|s| s.name == "ok"));
    }

    #[test]
    fn test_reset_parsers_reports_count() {
        reset_parsers();
        let path = PathBuf::from("/x.py");
        parse_tree(LanguageKind::Python, &path, b"import os\n").unwrap();
        parse_tree(LanguageKind::Python, &path, b"import sys\n").unwrap();
        assert_eq!(reset_parsers(), 2);
        assert_eq!(reset_parsers(), 0);
    }
}
