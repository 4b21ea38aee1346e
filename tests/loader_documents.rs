// tests/loader_documents.rs

mod common;

use common::{init_tracing, path, paths, write_jobs};
use tempfile::TempDir;

use jobtree::config::{JobLoader, TomlJobLoader};
use jobtree::errors::JobTreeError;
use jobtree::types::NodeKind;

const ROOT: &str = r#"
[config]
settle_delay = "50ms"
watch = false

[job]
name = "Root"
expression = "a & sub"

[[node]]
id = "a"
checker = { plugin = "command", args = { cmd = "true" } }
trigger = { every = "10s" }

[[node]]
id = "sub"
kind = "job"
include = "sub.toml"
"#;

const SUB: &str = r#"
[job]
name = "Sub"

[checker.disk]
plugin = "command"
args = { cmd = "test -d /" }

[[node]]
id = "x"
kind = "modifier"
modifier = { checker = "disk", op = "unknown-as-false" }

[[node]]
id = "group"
kind = "list"
children = [
    { id = "y", checker = { plugin = "constant", args = { value = "true" } } },
]
"#;

#[test]
fn loads_nested_documents_from_disk() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let root = write_jobs(dir.path(), &[("root.toml", ROOT), ("sub.toml", SUB)]);

    let loaded = TomlJobLoader::default().load(&root, true, false).unwrap();

    assert_eq!(loaded.name, "Root");
    assert_eq!(loaded.documents.len(), 2);
    assert_eq!(loaded.settings.settle_delay.as_millis(), 50);
    assert!(!loaded.settings.watch);
    assert_eq!(
        paths(&loaded.tree),
        vec!["main", "main/a", "main/sub", "main/sub/x", "main/sub/group", "main/sub/group/y"]
    );

    let tree = &loaded.tree;
    let sub = tree.node(tree.find(&path("main/sub")).unwrap()).unwrap();
    assert_eq!(sub.name, "Sub");
    let source = sub.job_data.as_ref().and_then(|d| d.source.clone()).unwrap();
    assert_eq!(source, dir.path().join("sub.toml").canonicalize().unwrap());
    assert!(sub.config.checkers.contains_key("disk"));

    let x = tree.node(tree.find(&path("main/sub/x")).unwrap()).unwrap();
    assert_eq!(x.kind, NodeKind::ValueModifier);
}

#[test]
fn nested_documents_ignore_their_config_section() {
    let dir = TempDir::new().unwrap();
    let sub = "[config]\nsettle_delay = \"9s\"\n[[node]]\nid = \"x\"\nkind = \"constant\"\nvalue = true\n";
    let path = write_jobs(dir.path(), &[("sub.toml", sub)]);

    let loaded = TomlJobLoader::default().load(&path, false, false).unwrap();
    assert_eq!(loaded.name, "sub");
    assert_eq!(loaded.settings.settle_delay.as_millis(), 200);
}

#[test]
fn include_cycles_are_document_errors() {
    let dir = TempDir::new().unwrap();
    let a = "[job]\nname = \"A\"\n[[node]]\nid = \"b\"\nkind = \"job\"\ninclude = \"b.toml\"\n";
    let b = "[[node]]\nid = \"a\"\nkind = \"job\"\ninclude = \"a.toml\"\n";
    let root = write_jobs(dir.path(), &[("a.toml", a), ("b.toml", b)]);

    let err = TomlJobLoader::default().load(&root, true, false).unwrap_err();
    assert!(matches!(err, JobTreeError::Document(_)), "{err}");
}

#[test]
fn the_root_job_must_be_named() {
    let dir = TempDir::new().unwrap();
    let root = write_jobs(dir.path(), &[("root.toml", "[[node]]\nid = \"a\"\nkind = \"constant\"\nvalue = true\n")]);

    let err = TomlJobLoader::default().load(&root, true, false).unwrap_err();
    assert!(err.to_string().contains("[job].name"), "{err}");
}

#[test]
fn missing_includes_name_the_including_document() {
    let dir = TempDir::new().unwrap();
    let root = write_jobs(
        dir.path(),
        &[("root.toml", "[job]\nname = \"R\"\n[[node]]\nid = \"s\"\nkind = \"job\"\ninclude = \"gone.toml\"\n")],
    );

    let err = TomlJobLoader::default().load(&root, true, false).unwrap_err();
    assert!(matches!(err, JobTreeError::Document(_)));
    assert!(err.to_string().contains("gone.toml"), "{err}");
}
