use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a dependency was declared in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// `import … from 'x'`, Python `import`/`from … import`, Rust `use`/`mod`.
    StaticImport,
    /// CommonJS `require('x')`.
    Require,
    /// `export … from 'x'`, Rust `pub use`.
    ReExport,
    /// `import('x')`.
    DynamicImport,
}

/// One resolved import edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// Absolute, normalized target path (or `pkg:<name>` when `is_external`).
    pub path: PathBuf,
    pub kind: DependencyKind,
    /// 1-based line of the import statement.
    pub line: usize,
    /// Raw specifier as written.
    pub module: String,
    #[serde(default)]
    pub is_external: bool,
    /// False when none of the names the import binds are used in the importing file.
    /// Side-effect imports, globs and re-exports always count as used.
    #[serde(default = "used_by_default")]
    pub is_used: bool,
    /// Bound names that nothing in the importing file refers to.
    #[serde(default)]
    pub unused_names: Vec<String>,
}

fn used_by_default() -> bool {
    true
}

/// Relationship between two symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// Declaration containment (parent → member).
    Structural,
    /// Static reference such as `extends`/`implements`/base classes.
    Dependency,
    /// The source syntactically invokes the target.
    Call,
    /// The source names the target without invoking it.
    Reference,
}

/// An edge between two symbol ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    pub source: String,
    pub target: String,
    pub relation: RelationType,
    /// 1-based lines of the call/reference sites, ascending.
    pub call_sites: Vec<usize>,
    /// Target lies outside the analyzed file.
    pub is_external: bool,
    /// Derived per query from the current edge set; never authoritative.
    pub is_cycle: bool,
}

impl CallEdge {
    pub fn new(source: String, target: String, relation: RelationType) -> Self {
        Self {
            source,
            target,
            relation,
            call_sites: Vec::new(),
            is_external: false,
            is_cycle: false,
        }
    }
}
