//! Adapter behavior against the scripted mock editor.

use std::time::Duration;

use serde_json::json;

use holt_ide::types::DiagnosticSeverity;
use holt_ide::{Analysis, Diagnostics, Direction, IdeConfig, IdeError, Navigation, Position, Workspace};
use holt_paths::PathResolver;
use holt_poll::BackoffConfig;
use holt_rpc::mock::MockEditor;
use holt_rpc::{EditorClient, EditorClientConfig};

struct Fixture {
    _dir: tempfile::TempDir,
    client: EditorClient,
    mock: MockEditor,
    config: IdeConfig,
    file: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    let file = dir.path().join("src/app.py");
    std::fs::write(&file, "import utils\n\ndef main():\n    pass\n").unwrap();
    std::fs::write(dir.path().join("src/utils.py"), "def helper():\n    pass\n").unwrap();
    let resolver = PathResolver::new(dir.path()).unwrap();

    let (client, mock) = MockEditor::spawn(
        resolver,
        EditorClientConfig {
            call_timeout: Duration::from_millis(500),
            ..EditorClientConfig::default()
        },
    );

    mock.respond("buffer/open", json!(1));
    mock.respond("lsp/status", json!({ "clients": 1, "ready": true }));

    let config = IdeConfig {
        lsp_ready: BackoffConfig {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(20),
            multiplier: 2.0,
            deadline: Duration::from_millis(200),
        },
        ..IdeConfig::default()
    };
    let file = std::fs::canonicalize(&file).unwrap();

    Fixture {
        _dir: dir,
        client,
        mock,
        config,
        file,
    }
}

#[tokio::test]
async fn definitions_come_back_workspace_relative() {
    let f = fixture();
    f.mock.respond(
        "lsp/definition",
        json!([{ "path": f.file.parent().unwrap().join("utils.py"), "line": 1, "column": 4 }]),
    );

    let navigation = Navigation::new(f.client.clone(), f.config.clone());
    let definitions = navigation
        .find_definition("src/app.py", Position::new(1, 7))
        .await
        .unwrap();

    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].file, "src/utils.py");
    assert_eq!(definitions[0].line, 1);
}

#[tokio::test]
async fn references_are_grouped_by_file() {
    let f = fixture();
    let other = f.file.parent().unwrap().join("utils.py");
    f.mock.respond(
        "lsp/references",
        json!([
            { "path": f.file, "line": 1, "column": 7 },
            { "path": other, "line": 1, "column": 4 },
            { "path": other, "line": 2, "column": 4 },
        ]),
    );

    let navigation = Navigation::new(f.client.clone(), f.config.clone());
    let result = navigation
        .find_references("src/app.py", Position::new(1, 7), true)
        .await
        .unwrap();

    assert_eq!(result.total_count, 3);
    assert_eq!(result.grouped_by_file.len(), 2);
    // Most-referenced file first.
    assert_eq!(result.grouped_by_file[0].file, "src/utils.py");
    assert_eq!(result.grouped_by_file[0].count, 2);
}

#[tokio::test]
async fn hover_carries_the_requested_position() {
    let f = fixture();
    f.mock.respond("lsp/hover", json!("def main() -> None"));

    let navigation = Navigation::new(f.client.clone(), f.config.clone());
    let hover = navigation
        .hover("src/app.py", Position::new(3, 4))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hover.contents, "def main() -> None");
    assert_eq!((hover.line, hover.column), (3, 4));

    f.mock.respond("lsp/hover", json!(null));
    let missing = navigation
        .hover("src/app.py", Position::new(2, 0))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn completions_are_ranked_truncated_and_named() {
    let f = fixture();
    f.mock.respond(
        "lsp/completion",
        json!([
            { "label": "zebra", "kind": 3, "sort_text": "0002" },
            { "label": "apply", "kind": 2, "sort_text": "0001" },
            { "label": "banana", "kind": 6 },
        ]),
    );

    let navigation = Navigation::new(f.client.clone(), f.config.clone());
    let result = navigation
        .completions("src/app.py", Position::new(4, 4), Some(2))
        .await
        .unwrap();

    assert_eq!(result.total_count, 3);
    assert_eq!(result.returned_count, 2);
    assert!(result.truncated);
    // sort_text ranking wins over labels.
    assert_eq!(result.completions[0].text, "apply");
    assert_eq!(result.completions[0].kind.as_deref(), Some("method"));
    assert_eq!(result.completions[1].text, "zebra");
    assert_eq!(result.completions[1].kind.as_deref(), Some("function"));
}

#[tokio::test]
async fn symbol_outline_keeps_hierarchy() {
    let f = fixture();
    f.mock.respond(
        "lsp/documentSymbols",
        json!([{
            "name": "Main",
            "kind": 5,
            "line": 1,
            "column": 0,
            "children": [
                { "name": "run", "kind": 6, "line": 2, "column": 4 },
            ],
        }]),
    );

    let navigation = Navigation::new(f.client.clone(), f.config.clone());
    let result = navigation.document_symbols("src/app.py").await.unwrap();

    assert_eq!(result.file, "src/app.py");
    assert_eq!(result.total_count, 2);
    assert_eq!(result.symbols[0].kind, "class");
    assert_eq!(result.symbols[0].children[0].kind, "method");
}

#[tokio::test]
async fn diagnostics_are_mapped_and_ordered_by_severity() {
    let f = fixture();
    f.mock.respond(
        "lsp/diagnostics",
        json!([
            { "line": 9, "column": 0, "severity": 2, "message": "unused import", "source": "pyflakes" },
            { "line": 3, "column": 4, "severity": 1, "message": "undefined name", "source": "pyflakes" },
            { "line": 1, "column": 0, "severity": 4, "message": "style nit" },
        ]),
    );

    let diagnostics = Diagnostics::new(f.client.clone(), f.config.clone());
    let result = diagnostics.get_diagnostics("src/app.py").await.unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result[0].severity, DiagnosticSeverity::Error);
    assert_eq!(result[0].message, "undefined name");
    assert_eq!(result[1].severity, DiagnosticSeverity::Warning);
    assert_eq!(result[2].severity, DiagnosticSeverity::Hint);
    assert_eq!(result[0].file, "src/app.py");
}

#[tokio::test]
async fn dependency_graph_combines_imports_and_importers() {
    let f = fixture();
    f.mock
        .respond("analysis/imports", json!(["import utils", "import os"]));
    f.mock.respond(
        "workspace/search",
        json!([
            { "path": f.file.parent().unwrap().join("utils.py"), "line": 1, "text": "import app" },
            { "path": f.file, "line": 1, "text": "app = 1" },
        ]),
    );

    let analysis = Analysis::new(f.client.clone(), f.config.clone());
    let graph = analysis
        .analyze_dependencies("src/app.py", Direction::Both)
        .await
        .unwrap();

    assert_eq!(graph.file, "src/app.py");
    assert_eq!(graph.imports, vec!["import utils", "import os"]);
    // The file itself never appears in its own importers.
    assert_eq!(graph.imported_by, vec!["src/utils.py"]);

    let imports_only = analysis
        .analyze_dependencies("src/app.py", Direction::Imports)
        .await
        .unwrap();
    assert!(imports_only.imported_by.is_empty());
    assert_eq!(f.mock.calls_for("workspace/search"), 1);
}

#[tokio::test]
async fn read_file_honors_line_ranges() {
    let f = fixture();
    f.mock.respond(
        "buffer/read",
        json!(["import utils", "", "def main():", "    pass"]),
    );

    let workspace = Workspace::new(f.client.clone());
    let whole = workspace.read_file("src/app.py", None).await.unwrap();
    assert_eq!(whole.total_lines, 4);
    assert!(whole.content.starts_with("import utils"));

    let slice = workspace
        .read_file("src/app.py", Some((3, 4)))
        .await
        .unwrap();
    assert_eq!(slice.content, "def main():\n    pass");
    assert_eq!(slice.total_lines, 4);
}

#[tokio::test]
async fn an_unready_language_server_times_out_not_hangs() {
    let f = fixture();
    f.mock
        .respond("lsp/status", json!({ "clients": 0, "ready": false }));

    let navigation = Navigation::new(f.client.clone(), f.config.clone());
    let started = std::time::Instant::now();
    let err = navigation
        .find_definition("src/app.py", Position::new(1, 0))
        .await
        .unwrap_err();

    assert!(matches!(err, IdeError::NotReady(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
}
