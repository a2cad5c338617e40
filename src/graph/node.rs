use std::path::Path;

use serde::{Deserialize, Serialize};

/// The kind of symbol extracted from source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// A function declaration, arrow-function constant, or free `fn`.
    Function,
    /// A class declaration or a Rust struct.
    Class,
    /// A class method, impl method, or method on a Python class.
    Method,
    /// An exported constant, Rust `const`/`static`, or interface property.
    Variable,
    /// A TypeScript interface or Rust trait.
    Interface,
    /// A type alias.
    Type,
    /// Anything else (enums, modules).
    Other,
}

/// 1-indexed, inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn contains(&self, line: usize) -> bool {
        self.start <= line && line <= self.end
    }

    pub fn line_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// One declared symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// `<file path>#<qualified name>`, unique within a file.
    pub id: String,
    /// Bare identifier (`distance`).
    pub name: String,
    /// Dotted name including owners (`Point.distance`).
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub range: LineRange,
    pub is_exported: bool,
    /// Id of the owning symbol for nested members (ownership, not inheritance).
    pub parent_id: Option<String>,
}

/// Build the canonical symbol id for a qualified name in `file`.
pub fn symbol_id(file: &Path, qualified_name: &str) -> String {
    format!("{}#{}", file.display(), qualified_name)
}
