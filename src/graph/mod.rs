pub mod edge;
pub mod node;

pub use edge::{CallEdge, Dependency, DependencyKind, RelationType};
pub use node::{LineRange, SymbolInfo, SymbolKind, symbol_id};
