use std::path::Path;

use serde::{Deserialize, Serialize};

/// A programming language with a registered analyzer.
///
/// Plain `Copy` enum, pattern-matched at dispatch boundaries. TSX is kept apart from
/// TypeScript because the two need different tree-sitter grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LanguageKind {
    TypeScript,
    Tsx,
    JavaScript,
    Python,
    Rust,
}

/// Resolution family: languages in one family share path-resolution rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionFamily {
    /// TypeScript, TSX and JavaScript (Node-style resolution).
    Script,
    Python,
    Rust,
}

impl LanguageKind {
    pub const ALL: [LanguageKind; 5] = [
        LanguageKind::TypeScript,
        LanguageKind::Tsx,
        LanguageKind::JavaScript,
        LanguageKind::Python,
        LanguageKind::Rust,
    ];

    /// File extensions (without the dot) handled by this language.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            LanguageKind::TypeScript => &["ts", "mts", "cts"],
            LanguageKind::Tsx => &["tsx"],
            LanguageKind::JavaScript => &["js", "jsx", "mjs", "cjs"],
            LanguageKind::Python => &["py", "pyi"],
            LanguageKind::Rust => &["rs"],
        }
    }

    /// Returns true if this language kind matches a given file extension.
    pub fn matches_extension(&self, ext: &str) -> bool {
        self.extensions().contains(&ext)
    }

    pub fn from_extension(ext: &str) -> Option<LanguageKind> {
        Self::ALL.into_iter().find(|lk| lk.matches_extension(ext))
    }

    pub fn from_path(path: &Path) -> Option<LanguageKind> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        Self::from_extension(ext)
    }

    /// Human-readable display name, also recorded as `provider_used` detail.
    pub fn display_name(&self) -> &'static str {
        match self {
            LanguageKind::TypeScript => "TypeScript",
            LanguageKind::Tsx => "TSX",
            LanguageKind::JavaScript => "JavaScript",
            LanguageKind::Python => "Python",
            LanguageKind::Rust => "Rust",
        }
    }

    pub fn family(&self) -> ResolutionFamily {
        match self {
            LanguageKind::TypeScript | LanguageKind::Tsx | LanguageKind::JavaScript => {
                ResolutionFamily::Script
            }
            LanguageKind::Python => ResolutionFamily::Python,
            LanguageKind::Rust => ResolutionFamily::Rust,
        }
    }

    /// Parse a CLI flag string into a `LanguageKind`. Case-insensitive.
    pub fn from_str_loose(s: &str) -> Option<LanguageKind> {
        match s.to_lowercase().as_str() {
            "typescript" | "ts" => Some(LanguageKind::TypeScript),
            "tsx" => Some(LanguageKind::Tsx),
            "javascript" | "js" => Some(LanguageKind::JavaScript),
            "python" | "py" => Some(LanguageKind::Python),
            "rust" | "rs" => Some(LanguageKind::Rust),
            _ => None,
        }
    }
}

/// Every extension with a registered analyzer.
pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
    LanguageKind::ALL
        .into_iter()
        .flat_map(|lk| lk.extensions().iter().copied())
}
