/// Integration suite: drives the library through `Engine` on temporary workspaces and
/// the compiled `depgraph` binary through subprocesses.
///
/// `CARGO_BIN_EXE_depgraph` is set by Cargo during `cargo test` and points to the
/// binary of the current profile.
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use depgraph::analyzer::AnalysisStatus;
use depgraph::paths::{normalize_path, relative_specifier};
use depgraph::spider::find_cycle_nodes;
use depgraph::{Engine, EngineConfig};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn quiet() -> EngineConfig {
    EngineConfig {
        enable_background_indexing: false,
        ..EngineConfig::default()
    }
}

/// Write `files` (relative path, content) under a fresh temporary directory.
fn workspace(files: &[(&str, &str)]) -> tempfile::TempDir {
    let tmp = tempfile::tempdir().expect("tempdir");
    for (rel, content) in files {
        let path = tmp.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture dir");
        }
        fs::write(&path, content).expect("write fixture");
    }
    tmp
}

fn p(root: &Path, rel: &str) -> PathBuf {
    normalize_path(&root.join(rel))
}

fn abc() -> tempfile::TempDir {
    workspace(&[
        ("a.ts", "import { b } from './b';\nexport const a = b;\n"),
        ("b.ts", "import { c } from './c';\nexport const b = c;\n"),
        ("c.ts", "export const c = 1;\n"),
    ])
}

fn python_app() -> tempfile::TempDir {
    workspace(&[
        (
            "app.py",
            "from utils.database import connect_db\nfrom utils.helpers import format_result\nfrom services.processor import DataProcessor\nimport json\n",
        ),
        ("services/__init__.py", ""),
        (
            "services/processor.py",
            "from ..utils.helpers import parse_json\n\nclass DataProcessor:\n    def process(self, data):\n        return self._transform(data)\n\n    def _transform(self, item):\n        return parse_json(item)\n",
        ),
        ("utils/__init__.py", "from .database import connect_db\n"),
        ("utils/database.py", "from .helpers import validate\n\ndef connect_db():\n    return validate()\n"),
        ("utils/helpers.py", "def validate():\n    return True\n\ndef parse_json(x):\n    return x\n\ndef format_result(x):\n    return x\n"),
    ])
}

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_depgraph"))
}

/// Run the binary with `--root <root>` and assert success. Returns stdout.
fn run_success(root: &Path, args: &[&str]) -> String {
    let out = Command::new(binary())
        .arg("--root")
        .arg(root)
        .args(args)
        .current_dir(root)
        .env("RUST_LOG", "depgraph=warn")
        .output()
        .expect("failed to invoke depgraph binary");
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();
    assert!(
        out.status.success(),
        "command {:?} failed with status {:?}\nstdout: {}\nstderr: {}",
        args,
        out.status,
        stdout,
        stderr
    );
    stdout
}

fn run_json(root: &Path, args: &[&str]) -> serde_json::Value {
    let stdout = run_success(root, args);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON ({e}): {stdout}"))
}

// ---------------------------------------------------------------------------
// Library scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_crawl_and_referencers_survive_reanalysis() {
    let tmp = abc();
    let root = tmp.path();
    let engine = Engine::new(root, quiet());

    let crawl = engine.crawl_dependency_graph(&root.join("a.ts"), Some(2), None, 0);
    assert_eq!(crawl.nodes, vec![p(root, "a.ts"), p(root, "b.ts"), p(root, "c.ts")]);
    let edges: HashSet<(PathBuf, PathBuf)> = crawl
        .edges
        .iter()
        .map(|e| (e.source.clone(), e.target.clone()))
        .collect();
    assert_eq!(
        edges,
        HashSet::from([(p(root, "a.ts"), p(root, "b.ts")), (p(root, "b.ts"), p(root, "c.ts"))])
    );

    let refs = engine.find_referencing_files(&root.join("c.ts"));
    assert_eq!(refs.iter().map(|d| d.path.clone()).collect::<Vec<_>>(), vec![p(root, "b.ts")]);

    let report = engine.invalidate_files(&[root.join("b.ts")]);
    assert_eq!(report.invalidated, vec![p(root, "b.ts")]);
    engine.analyze_dependencies(&root.join("b.ts")).unwrap();
    let refs = engine.find_referencing_files(&root.join("c.ts"));
    assert_eq!(refs.iter().map(|d| d.path.clone()).collect::<Vec<_>>(), vec![p(root, "b.ts")]);
}

#[test]
fn test_unsupported_file_is_flagged_not_an_error() {
    let tmp = workspace(&[("notes.xyz", "whatever")]);
    let engine = Engine::new(tmp.path(), quiet());
    let analysis = engine
        .analyze_dependencies(&tmp.path().join("notes.xyz"))
        .unwrap();
    assert!(analysis.dependencies.is_empty());
    assert_eq!(analysis.status, AnalysisStatus::Unsupported);
}

#[test]
fn test_second_analysis_is_a_cache_hit() {
    let tmp = abc();
    let engine = Engine::new(tmp.path(), quiet());
    let file = tmp.path().join("a.ts");

    let first = engine.analyze_dependencies(&file).unwrap();
    let reads = engine.analyzer().stats().disk_reads;
    let second = engine.analyze_dependencies(&file).unwrap();

    assert_eq!(first.dependencies, second.dependencies);
    assert_eq!(second.status, AnalysisStatus::Cached);
    assert_eq!(engine.analyzer().stats().disk_reads, reads);
}

#[test]
fn test_referencers_follow_edited_imports() {
    let tmp = abc();
    let root = tmp.path();
    let engine = Engine::new(root, quiet());
    engine.analyze_dependencies(&root.join("a.ts")).unwrap();
    assert_eq!(engine.find_referencing_files(&root.join("b.ts")).len(), 1);

    for _ in 0..3 {
        fs::write(root.join("a.ts"), "import { c } from './c';\n").unwrap();
        engine.invalidate_files(&[root.join("a.ts")]);
        engine.analyze_dependencies(&root.join("a.ts")).unwrap();
    }
    assert!(engine.find_referencing_files(&root.join("b.ts")).is_empty());
    let refs = engine.find_referencing_files(&root.join("c.ts"));
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].path, p(root, "a.ts"));
}

#[test]
fn test_relative_specifier_round_trip() {
    let tmp = workspace(&[("src/app/main.ts", ""), ("src/lib/util.ts", "")]);
    let root = tmp.path();
    let engine = Engine::new(root, quiet());
    let from = p(root, "src/app/main.ts");

    let target = engine
        .analyzer()
        .resolve_module_specifier(&from, "../lib/util")
        .unwrap();
    assert_eq!(target, p(root, "src/lib/util.ts"));
    assert_eq!(relative_specifier(&from, &target).as_deref(), Some("../lib/util"));
}

#[test]
fn test_cycles_through_crawl() {
    let tmp = workspace(&[
        ("a.ts", "import './b';\n"),
        ("b.ts", "import './c';\n"),
        ("c.ts", "import './a';\nimport './d';\n"),
        ("d.ts", ""),
    ]);
    let root = tmp.path();
    let engine = Engine::new(root, quiet());
    let crawl = engine.crawl_dependency_graph(&root.join("a.ts"), Some(10), None, 0);
    let edges: Vec<_> = crawl.edges.into_iter().map(|e| (e.source, e.target)).collect();

    let report = find_cycle_nodes(&edges);
    assert_eq!(
        report.components,
        vec![vec![p(root, "a.ts"), p(root, "b.ts"), p(root, "c.ts")]]
    );
    assert!(!report.contains(&p(root, "d.ts")));
}

#[test]
fn test_acyclic_dag_reports_no_cycles() {
    let edges = vec![("a", "b"), ("b", "c"), ("a", "c")];
    assert!(find_cycle_nodes(&edges).nodes.is_empty());
}

#[test]
fn test_depth_bound_and_paging() {
    let tmp = workspace(&[
        ("n0.ts", "import './n1';\nimport './m1';\n"),
        ("n1.ts", "import './n2';\n"),
        ("m1.ts", "import './n2';\n"),
        ("n2.ts", "import './n3';\n"),
        ("n3.ts", "import './n4';\n"),
        ("n4.ts", ""),
    ]);
    let root = tmp.path();
    let engine = Engine::new(root, quiet());
    let entry = root.join("n0.ts");

    let bounded = engine.crawl_dependency_graph(&entry, Some(2), None, 0);
    assert_eq!(bounded.total_nodes, 4);
    assert!(!bounded.nodes.contains(&p(root, "n3.ts")));

    let full = engine.crawl_dependency_graph(&entry, Some(10), None, 0);
    let mut paged = Vec::new();
    let mut offset = 0;
    loop {
        let page = engine.crawl_dependency_graph(&entry, Some(10), Some(2), offset);
        if page.nodes.is_empty() {
            break;
        }
        paged.extend(page.nodes);
        offset += 2;
    }
    assert_eq!(paged, full.nodes);
}

#[test]
fn test_python_package_imports() {
    let tmp = python_app();
    let root = tmp.path();
    let engine = Engine::new(root, quiet());

    let app = engine.analyze_dependencies(&root.join("app.py")).unwrap();
    let targets: Vec<PathBuf> = app.dependencies.iter().map(|d| d.path.clone()).collect();
    assert_eq!(
        targets,
        vec![
            p(root, "utils/database.py"),
            p(root, "utils/helpers.py"),
            p(root, "services/processor.py"),
        ]
    );
    assert_eq!(app.unresolved, 1, "`json` is an external module");

    let processor = engine
        .analyze_dependencies(&root.join("services/processor.py"))
        .unwrap();
    assert_eq!(processor.dependencies[0].path, p(root, "utils/helpers.py"));
}

#[test]
fn test_python_from_import_reaches_namespace_submodule() {
    let tmp = workspace(&[
        (
            "relative_imports.py",
            "# Relative imports test\nfrom . import helpers\nfrom .main import main\nfrom .utils import helpers as h\nfrom ..utils.helpers import calculate\n\ndef process_data(data: str) -> str:\n    value = calculate(5, 10)\n    return f\"{data} - {value}\"\n",
        ),
        ("main.py", "def main():\n    pass\n"),
        ("utils/helpers.py", "def calculate(a, b):\n    return a + b\n"),
    ]);
    let root = tmp.path();
    let engine = Engine::new(root, quiet());

    let analysis = engine
        .analyze_dependencies(&root.join("relative_imports.py"))
        .unwrap();
    let targets: Vec<(PathBuf, usize)> = analysis
        .dependencies
        .iter()
        .map(|d| (d.path.clone(), d.line))
        .collect();
    assert_eq!(
        targets,
        vec![(p(root, "main.py"), 3), (p(root, "utils/helpers.py"), 4)]
    );
    assert_eq!(analysis.unresolved, 2);
    assert_eq!(analysis.dependencies[1].module, ".utils");
}

#[test]
fn test_crawl_marks_unused_imports() {
    let tmp = workspace(&[
        ("Cargo.toml", "[package]\nname = \"fixture\"\nversion = \"0.1.0\"\n"),
        (
            "src/main.rs",
            "mod helper;\nmod unused;\nuse helper::internal;\n\nfn main() {\n    let data = helper::format_data(\"test\");\n    println!(\"{}\", data);\n}\n",
        ),
        ("src/helper.rs", "pub fn format_data(data: &str) -> String {\n    format!(\"[{}]\", data)\n}\npub fn internal() {}\n"),
        ("src/unused.rs", "pub fn nothing() {}\n"),
    ]);
    let root = tmp.path();
    let engine = Engine::new(root, quiet());

    let crawl = engine.crawl_dependency_graph(&root.join("src/main.rs"), Some(1), None, 0);
    let used = |target: &str| {
        crawl
            .edges
            .iter()
            .find(|e| e.target == p(root, target))
            .map(|e| e.is_used)
    };
    assert_eq!(used("src/helper.rs"), Some(true));
    assert_eq!(used("src/unused.rs"), Some(false));

    let analysis = engine.analyze_dependencies(&root.join("src/main.rs")).unwrap();
    let helper = analysis
        .dependencies
        .iter()
        .find(|d| d.path == p(root, "src/helper.rs"))
        .unwrap();
    assert_eq!(helper.line, 1);
    assert_eq!(helper.unused_names, vec!["internal".to_owned()]);
}

#[test]
fn test_rust_module_tree() {
    let tmp = workspace(&[
        ("Cargo.toml", "[package]\nname = \"fixture\"\nversion = \"0.1.0\"\n"),
        ("src/main.rs", "mod utils;\nuse utils::database::connect_db;\nfn main() { connect_db(); }\n"),
        ("src/utils/mod.rs", "pub mod database;\n"),
        ("src/utils/database.rs", "use crate::utils;\npub fn connect_db() {}\n"),
    ]);
    let root = tmp.path();
    let engine = Engine::new(root, quiet());

    let main = engine.analyze_dependencies(&root.join("src/main.rs")).unwrap();
    let targets: HashSet<PathBuf> = main.dependencies.iter().map(|d| d.path.clone()).collect();
    assert!(targets.contains(&p(root, "src/utils/mod.rs")));
    assert!(targets.contains(&p(root, "src/utils/database.rs")));
}

#[tokio::test]
async fn test_full_index_then_persisted_restore() {
    let tmp = abc();
    let root = tmp.path();
    {
        let engine = Engine::new(root, quiet());
        let stats = engine.rebuild_index().await;
        assert_eq!(stats.total, 3);
        assert!(stats.failures.is_empty());
    }

    fs::write(root.join("c.ts"), "export const c = 2;\n").unwrap();
    let engine = Engine::new(root, quiet());
    let report = engine.restore_persisted_index().unwrap().unwrap();
    assert_eq!(report.restored, 3);
    assert_eq!(report.validation.stale_files, vec![p(root, "c.ts")]);
    // c.ts had no imports, so pruning it keeps b.ts as its referencer.
    assert_eq!(engine.find_referencing_files(&root.join("c.ts")).len(), 1);
}

#[tokio::test]
async fn test_status_broadcast_reaches_complete() {
    let tmp = abc();
    let engine = Engine::new(tmp.path(), quiet());
    let mut status = engine.subscribe_status();
    engine.rebuild_index().await;

    status.mark_changed();
    let snapshot = status.borrow_and_update().clone();
    assert_eq!(snapshot.state, depgraph::spider::IndexerState::Complete);
    assert_eq!(snapshot.processed, 3);
    assert_eq!(snapshot.total, 3);
}

// ---------------------------------------------------------------------------
// Binary
// ---------------------------------------------------------------------------

#[test]
fn test_cli_deps_json() {
    let tmp = abc();
    let json = run_json(tmp.path(), &["deps", "a.ts", "--json"]);
    let deps = json["dependencies"].as_array().unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0]["module"], "./b");
    assert_eq!(deps[0]["kind"], "static_import");
    assert_eq!(deps[0]["line"], 1);
}

#[test]
fn test_cli_crawl_paging_json() {
    let tmp = abc();
    let json = run_json(tmp.path(), &["crawl", "a.ts", "--limit", "2", "--offset", "1", "--json"]);
    assert_eq!(json["total_nodes"], 3);
    let nodes = json["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(nodes[0].as_str().unwrap().ends_with("b.ts"));
    assert_eq!(json["edges"].as_array().unwrap().len(), 1);
}

#[test]
fn test_cli_index_then_refs() {
    let tmp = abc();
    let stats = run_json(tmp.path(), &["index", "--json"]);
    assert_eq!(stats["processed"], 3);
    assert!(tmp.path().join(".depgraph/reverse-index.bin").exists());

    let refs = run_json(tmp.path(), &["refs", "c.ts", "--json"]);
    let refs = refs.as_array().unwrap();
    assert_eq!(refs.len(), 1);
    assert!(refs[0]["path"].as_str().unwrap().ends_with("b.ts"));
}

#[test]
fn test_cli_cycles_and_symbols() {
    let tmp = workspace(&[
        ("a.ts", "import './b';\nexport function ping() { return pong(); }\nfunction pong() { return ping(); }\n"),
        ("b.ts", "import './a';\n"),
    ]);
    let cycles = run_json(tmp.path(), &["cycles", "a.ts", "--json"]);
    assert_eq!(cycles["components"].as_array().unwrap().len(), 1);

    let symbols = run_json(tmp.path(), &["symbols", "a.ts", "--json"]);
    assert_eq!(symbols["symbols"].as_array().unwrap().len(), 2);
    let cyclic = symbols["dependencies"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["is_cycle"] == true)
        .count();
    assert_eq!(cyclic, 2);

    let human = run_success(tmp.path(), &["cycles", "a.ts"]);
    assert!(human.contains("1 cycle(s)"));
}
