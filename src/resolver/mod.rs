pub mod alias;
pub mod file_resolver;
pub mod python;
pub mod rust_resolver;
pub mod workspace;

pub use alias::AliasTable;

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use oxc_resolver::Resolver;

use crate::config::{ConfigHandle, EngineConfig, ExternalPackages};
use crate::language::{LanguageKind, ResolutionFamily};
use crate::paths::normalize_path;

/// Prefix of the opaque dependency path given to pass-through external packages.
pub const PACKAGE_PREFIX: &str = "pkg:";

/// Where a specifier points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// A file of the workspace, absolute and normalized.
    File(PathBuf),
    /// An external package kept as an opaque, never-expanded node.
    Package(String),
}

impl ResolvedTarget {
    /// Path recorded in the dependency list: the file itself, or `pkg:<name>`.
    pub fn dependency_path(&self) -> PathBuf {
        match self {
            ResolvedTarget::File(path) => path.clone(),
            ResolvedTarget::Package(name) => PathBuf::from(format!("{PACKAGE_PREFIX}{name}")),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, ResolvedTarget::Package(_))
    }
}

/// Classification produced by the per-family resolvers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    File(PathBuf),
    /// A package outside the workspace, by package name.
    External(String),
    NotFound,
}

/// Whether `path` is an opaque package identifier rather than a file.
pub fn is_package_path(path: &Path) -> bool {
    path.to_str().is_some_and(|p| p.starts_with(PACKAGE_PREFIX))
}

/// Package name of a bare script specifier: `@scope/pkg/sub` → `@scope/pkg`,
/// `lodash/fp` → `lodash`, `node:fs` → `fs`.
pub fn script_package_name(specifier: &str) -> &str {
    let bare = specifier.strip_prefix("node:").unwrap_or(specifier);
    let mut parts = bare.splitn(3, '/');
    match (parts.next(), parts.next()) {
        (Some(scope), Some(name)) if scope.starts_with('@') => {
            &bare[..scope.len() + 1 + name.len()]
        }
        (Some(first), _) => first,
        _ => bare,
    }
}

/// Maps raw specifiers to workspace files, per language family.
///
/// Built once per engine and shared. Alias and workspace tables are built lazily on
/// first use and dropped by [`PathResolver::clear_cache`].
pub struct PathResolver {
    root: PathBuf,
    config: ConfigHandle,
    script: Resolver,
    aliases: RwLock<Option<Arc<AliasTable>>>,
    rust_crates: RwLock<Option<Arc<HashMap<String, PathBuf>>>>,
}

impl PathResolver {
    pub fn new(root: &Path, config: ConfigHandle) -> Self {
        Self {
            root: normalize_path(root),
            config,
            script: file_resolver::build_script_resolver(),
            aliases: RwLock::new(None),
            rust_crates: RwLock::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `specifier` as imported by `from_file`.
    ///
    /// `None` is a normal outcome: missing targets, excluded externals, `node_modules`
    /// hits while they are excluded, and imports of the file itself.
    pub fn resolve(&self, from_file: &Path, specifier: &str) -> Option<ResolvedTarget> {
        let family = LanguageKind::from_path(from_file)?.family();
        let outcome = match family {
            ResolutionFamily::Script => self.resolve_script(from_file, specifier),
            ResolutionFamily::Python => python::resolve(&self.root, from_file, specifier),
            ResolutionFamily::Rust => {
                rust_resolver::resolve(from_file, specifier, &self.rust_crates())
            }
        };

        let config = self.config.current();
        match outcome {
            Outcome::File(path) => {
                let path = normalize_path(&path);
                if path == normalize_path(from_file) {
                    return None;
                }
                if config.exclude_node_modules && in_node_modules(&path) {
                    return package_target(&config, script_package_name(specifier));
                }
                Some(ResolvedTarget::File(path))
            }
            Outcome::External(name) => package_target(&config, &name),
            Outcome::NotFound => {
                tracing::debug!(
                    from = %from_file.display(),
                    specifier,
                    "specifier did not resolve"
                );
                None
            }
        }
    }

    fn resolve_script(&self, from_file: &Path, specifier: &str) -> Outcome {
        let aliased = self.aliases().lookup(specifier);
        let target = match &aliased {
            Some(path) => path.to_string_lossy().into_owned(),
            None if is_path_like(specifier) => specifier.to_owned(),
            None => return Outcome::External(script_package_name(specifier).to_owned()),
        };
        match file_resolver::resolve_script_path(&self.script, from_file, &target) {
            Some(path) => Outcome::File(path),
            None => Outcome::NotFound,
        }
    }

    /// The alias table, built on first use.
    pub fn aliases(&self) -> Arc<AliasTable> {
        if let Some(table) = read_cached(&self.aliases) {
            return table;
        }
        let aliases = self.config.current().aliases;
        let table = Arc::new(AliasTable::load(&self.root, &aliases));
        store_cached(&self.aliases, Arc::clone(&table));
        table
    }

    fn rust_crates(&self) -> Arc<HashMap<String, PathBuf>> {
        if let Some(crates) = read_cached(&self.rust_crates) {
            return crates;
        }
        let crates = Arc::new(workspace::discover_rust_crates(&self.root));
        store_cached(&self.rust_crates, Arc::clone(&crates));
        crates
    }

    /// Forget alias tables, workspace layouts and the file-system cache of the
    /// script resolver. Called when configuration or manifests change.
    pub fn clear_cache(&self) {
        self.script.clear_cache();
        reset_cached(&self.aliases);
        reset_cached(&self.rust_crates);
    }
}

impl std::fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathResolver")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn package_target(config: &EngineConfig, name: &str) -> Option<ResolvedTarget> {
    match config.external_packages {
        ExternalPackages::Exclude => None,
        ExternalPackages::Passthrough => Some(ResolvedTarget::Package(name.to_owned())),
    }
}

fn is_path_like(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
        || Path::new(specifier).is_absolute()
}

fn in_node_modules(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == "node_modules"))
}

fn read_cached<T>(slot: &RwLock<Option<Arc<T>>>) -> Option<Arc<T>> {
    slot.read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn store_cached<T>(slot: &RwLock<Option<Arc<T>>>, value: Arc<T>) {
    *slot.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(value);
}

fn reset_cached<T>(slot: &RwLock<Option<Arc<T>>>) {
    *slot.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
}
