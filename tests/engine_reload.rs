// tests/engine_reload.rs

mod common;

use std::path::Path;
use std::sync::{Arc, Mutex};

use common::{init_tracing, instance_at, loader_for, path, paths, with_timeout, RecordingLifecycle};

use jobtree::config::JobLoader;
use jobtree::engine::{AlternativeViews, Engine, TreeSnapshot};
use jobtree::errors::JobTreeError;
use jobtree::fs::mock::MockFileSystem;
use jobtree::types::LogicalValue;

const ROOT_DOC: &str = "/jobs/root.toml";
const SUB_DOC: &str = "/jobs/sub.toml";

const ROOT: &str = r#"
[config]
settle_delay = "0ms"
watch = false
diagnostics = false

[job]
name = "Root"
expression = "a & sub"

[[node]]
id = "a"
checker = { plugin = "constant", args = { value = "true" } }

[[node]]
id = "sub"
kind = "job"
include = "sub.toml"
"#;

const ROOT_WITH_C: &str = r#"
[config]
settle_delay = "0ms"
watch = false
diagnostics = false

[job]
name = "Root"
expression = "a & sub & c"

[[node]]
id = "a"
checker = { plugin = "constant", args = { value = "true" } }

[[node]]
id = "sub"
kind = "job"
include = "sub.toml"

[[node]]
id = "c"
kind = "constant"
value = false
"#;

const SUB: &str = r#"
[job]
name = "Sub"

[[node]]
id = "x"
checker = { plugin = "constant", args = { value = "true" } }

[[node]]
id = "y"
checker = { plugin = "constant", args = { value = "true" } }
"#;

#[derive(Default)]
struct RecordingViews {
    snapshots: Mutex<Vec<TreeSnapshot>>,
}

impl AlternativeViews for RecordingViews {
    fn refresh(&self, snapshot: &TreeSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}

struct Fixture {
    fs: Arc<MockFileSystem>,
    lifecycle: Arc<RecordingLifecycle>,
    views: Arc<RecordingViews>,
    engine: Engine,
}

fn fixture() -> Fixture {
    init_tracing();
    let (fs, loader) = loader_for(&[(ROOT_DOC, ROOT), (SUB_DOC, SUB)]);
    let loaded = loader.load(Path::new(ROOT_DOC), true, false).unwrap();
    let lifecycle = Arc::new(RecordingLifecycle::new());
    let views = Arc::new(RecordingViews::default());
    let engine = Engine::new(loaded, ROOT_DOC, Arc::new(loader), lifecycle.clone())
        .unwrap()
        .with_views(views.clone());
    Fixture {
        fs,
        lifecycle,
        views,
        engine,
    }
}

#[tokio::test]
async fn editing_the_root_document_grafts_only_what_changed() {
    let fx = fixture();
    let (a, sub) = {
        let tree = fx.engine.tree().lock().await;
        (instance_at(&tree, "root/main/a"), instance_at(&tree, "root/main/sub"))
    };

    fx.fs.add_file(ROOT_DOC, ROOT_WITH_C);
    let report = with_timeout(fx.engine.reload(&path("root/main/a"))).await.unwrap();

    let grafted: Vec<String> = report.grafted_paths().iter().map(|p| p.to_string()).collect();
    assert_eq!(grafted, vec!["root/main"]);

    let tree = fx.engine.tree().lock().await;
    assert_eq!(
        paths(&tree),
        vec![
            "root",
            "root/main",
            "root/main/a",
            "root/main/sub",
            "root/main/sub/x",
            "root/main/sub/y",
            "root/main/c"
        ]
    );
    assert_eq!(instance_at(&tree, "root/main/a"), a);
    assert_eq!(instance_at(&tree, "root/main/sub"), sub);
    let main = tree.node(tree.find(&path("root/main")).unwrap()).unwrap();
    assert_eq!(main.name, "Root");
    assert!(fx.lifecycle.started_paths().contains(&"root/main/c".to_string()));
}

#[tokio::test]
async fn a_broken_document_leaves_the_tree_untouched() {
    let fx = fixture();
    let before = paths(&*fx.engine.tree().lock().await);

    fx.fs.add_file(ROOT_DOC, "[job\nname = ");
    let err = with_timeout(fx.engine.reload(&path("root/main"))).await.unwrap_err();

    assert!(matches!(err, JobTreeError::Document(_)), "{err}");
    assert_eq!(paths(&*fx.engine.tree().lock().await), before);
    assert!(fx.lifecycle.started().is_empty());
    assert!(fx.lifecycle.stopped().is_empty());
    assert!(fx.views.snapshots.lock().unwrap().is_empty());
}

#[tokio::test]
async fn editing_an_included_document_reloads_only_that_job() {
    let fx = fixture();
    let (main, x, y) = {
        let tree = fx.engine.tree().lock().await;
        (
            instance_at(&tree, "root/main"),
            instance_at(&tree, "root/main/sub/x"),
            instance_at(&tree, "root/main/sub/y"),
        )
    };

    fx.fs.add_file(SUB_DOC, &*SUB.replace(
        "id = \"y\"\nchecker = { plugin = \"constant\", args = { value = \"true\" } }",
        "id = \"y\"\nchecker = { plugin = \"constant\", args = { value = \"false\" } }",
    ));
    let report = with_timeout(fx.engine.reload(&path("root/main/sub/x"))).await.unwrap();

    let grafted: Vec<String> = report.grafted_paths().iter().map(|p| p.to_string()).collect();
    assert_eq!(grafted, vec!["root/main/sub/y"]);

    let tree = fx.engine.tree().lock().await;
    assert_eq!(instance_at(&tree, "root/main"), main);
    assert_eq!(instance_at(&tree, "root/main/sub/x"), x);
    assert_ne!(instance_at(&tree, "root/main/sub/y"), y);
    assert_eq!(fx.lifecycle.stopped(), vec![y]);
}

#[tokio::test]
async fn reloading_the_anchor_reloads_the_root_document() {
    let fx = fixture();
    fx.fs.add_file(ROOT_DOC, ROOT_WITH_C);

    let report = with_timeout(fx.engine.reload(&path("root"))).await.unwrap();

    assert!(report.rejected.is_empty());
    let grafted: Vec<String> = report.grafted_paths().iter().map(|p| p.to_string()).collect();
    assert_eq!(grafted, vec!["root/main"]);
}

#[tokio::test]
async fn views_see_the_tree_after_each_pass() {
    let fx = fixture();
    fx.fs.add_file(ROOT_DOC, ROOT_WITH_C);

    with_timeout(fx.engine.reload(&path("root/main"))).await.unwrap();

    let snapshots = fx.views.snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].value(&path("root/main/c")), Some(LogicalValue::False));
    assert!(snapshots[0].dump.contains("c"));
}

#[tokio::test]
async fn unknown_origins_are_reported() {
    let fx = fixture();
    let err = fx.engine.reload(&path("root/main/nope")).await.unwrap_err();
    assert!(matches!(err, JobTreeError::NodeNotFound(_)));
}
