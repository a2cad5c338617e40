use tree_sitter::Language;

use crate::language::LanguageKind;

/// Return the tree-sitter [`Language`] for a language kind.
///
/// # Grammar selection rules
/// - TypeScript -> `LANGUAGE_TYPESCRIPT`
/// - TSX        -> `LANGUAGE_TSX`
///   These MUST be different: the TypeScript grammar cannot parse JSX, and the TSX grammar
///   breaks angle-bracket type assertions (`<T>expr`). Mixing them causes parse errors.
/// - JavaScript -> `tree_sitter_javascript::LANGUAGE` (also used for `.jsx`)
pub fn language_for(kind: LanguageKind) -> Language {
    match kind {
        LanguageKind::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        LanguageKind::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        LanguageKind::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        LanguageKind::Python => tree_sitter_python::LANGUAGE.into(),
        LanguageKind::Rust => tree_sitter_rust::LANGUAGE.into(),
    }
}

/// Index into per-grammar query caches for the script family.
///
/// Queries compiled for one grammar cannot be run against another grammar's tree.
pub(crate) fn script_slot(kind: LanguageKind) -> Option<usize> {
    match kind {
        LanguageKind::TypeScript => Some(0),
        LanguageKind::Tsx => Some(1),
        LanguageKind::JavaScript => Some(2),
        _ => None,
    }
}
