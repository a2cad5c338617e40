use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::workspace::discover_script_packages;
use crate::paths::normalize_path;

/// Prefix → directory table consulted before any other resolution step.
///
/// Entries are matched longest prefix first. A prefix without a trailing `/` only
/// matches on a segment boundary, so `@app` matches `@app` and `@app/x` but not `@apple`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: Vec<(String, PathBuf)>,
}

impl AliasTable {
    /// Build the table from, in decreasing precedence: `depgraph.toml [aliases]`,
    /// `tsconfig.json compilerOptions.paths`, and npm/pnpm workspace packages.
    pub fn load(root: &Path, configured: &BTreeMap<String, String>) -> Self {
        let mut table = Self::default();
        for (prefix, dir) in configured {
            table.insert(prefix, root.join(dir.trim_end_matches('*')));
        }
        for (prefix, dir) in tsconfig_paths(root) {
            table.insert(&prefix, dir);
        }
        for (name, dir) in discover_script_packages(root) {
            table.insert(&name, dir);
        }
        table.entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        tracing::debug!(entries = table.entries.len(), "alias table built");
        table
    }

    /// First registration of a prefix wins.
    fn insert(&mut self, prefix: &str, dir: PathBuf) {
        let prefix = prefix.trim_end_matches('*').to_owned();
        if prefix.is_empty() || self.entries.iter().any(|(p, _)| *p == prefix) {
            return;
        }
        self.entries.push((prefix, dir));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Rewrite `specifier` to an absolute path when an alias prefix matches.
    pub fn lookup(&self, specifier: &str) -> Option<PathBuf> {
        self.entries.iter().find_map(|(prefix, dir)| {
            let rest = specifier.strip_prefix(prefix.as_str())?;
            let on_boundary = prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/');
            if !on_boundary {
                return None;
            }
            let rest = rest.trim_start_matches('/');
            Some(if rest.is_empty() {
                dir.clone()
            } else {
                dir.join(rest)
            })
        })
    }
}

/// `compilerOptions.paths` of `<root>/tsconfig.json`, first target of each pattern,
/// anchored at `compilerOptions.baseUrl` (default: the tsconfig directory).
fn tsconfig_paths(root: &Path) -> Vec<(String, PathBuf)> {
    let Ok(content) = std::fs::read_to_string(root.join("tsconfig.json")) else {
        return Vec::new();
    };
    let json: serde_json::Value = match serde_json::from_str(&strip_json_comments(&content)) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!("failed to parse tsconfig.json: {err}. Ignoring its path aliases.");
            return Vec::new();
        }
    };

    let options = &json["compilerOptions"];
    let base = normalize_path(&root.join(options["baseUrl"].as_str().unwrap_or(".")));
    let Some(paths) = options["paths"].as_object() else {
        return Vec::new();
    };

    paths
        .iter()
        .filter_map(|(pattern, targets)| {
            let first = targets.as_array()?.first()?.as_str()?;
            Some((pattern.clone(), base.join(first.trim_end_matches('*'))))
        })
        .collect()
}

/// Drop `//` and `/* */` comments and trailing commas so tsconfig files parse as JSON.
/// String literals are left untouched.
fn strip_json_comments(input: &str) -> String {
    remove_trailing_commas(&remove_comments(input))
}

fn remove_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => out.extend(chars.next()),
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                if chars.by_ref().any(|next| next == '\n') {
                    out.push('\n');
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => {
                in_string = c == '"';
                out.push(c);
            }
        }
    }
    out
}

fn remove_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if !matches!(next, Some('}') | Some(']')) {
                out.push(c);
            }
        } else {
            in_string = c == '"';
            out.push(c);
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_longest_prefix_wins() {
        let mut table = AliasTable::default();
        table.insert("@", PathBuf::from("/r/src"));
        table.insert("@app/core", PathBuf::from("/r/core"));
        table.insert("@app", PathBuf::from("/r/app"));
        table
            .entries
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        assert_eq!(table.lookup("@app/core/x"), Some(PathBuf::from("/r/core/x")));
        assert_eq!(table.lookup("@app/y"), Some(PathBuf::from("/r/app/y")));
        assert_eq!(table.lookup("@app"), Some(PathBuf::from("/r/app")));
        assert_eq!(table.lookup("@/z"), Some(PathBuf::from("/r/src/z")));
        assert_eq!(table.lookup("@apple"), None, "prefix must end on a segment boundary");
        assert_eq!(table.lookup("react"), None);
    }

    #[test]
    fn test_load_merges_sources_with_config_precedence() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(
            root.join("tsconfig.json"),
            r#"{
  // comment
  "compilerOptions": {
    "baseUrl": ".",
    "paths": {
      "@/*": ["src/*"],
      "~lib/*": ["lib/*", "fallback/*"], /* second target ignored */
    },
  },
}"#,
        )
        .unwrap();
        let mut configured = BTreeMap::new();
        configured.insert("@/".to_owned(), "app".to_owned());

        let table = AliasTable::load(root, &configured);
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("@/x"), Some(root.join("app").join("x")));
        assert_eq!(table.lookup("~lib/y"), Some(root.join("lib/y")));
    }

    #[test]
    fn test_strip_json_comments_keeps_strings() {
        let src = r#"{"url": "https://example.com/*x*/", "a": [1, 2,], // tail
}"#;
        let json: serde_json::Value = serde_json::from_str(&strip_json_comments(src)).unwrap();
        assert_eq!(json["url"], "https://example.com/*x*/");
        assert_eq!(json["a"].as_array().map(Vec::len), Some(2));
    }
}
