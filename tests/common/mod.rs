#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use jobtree::tree::{NodePath, Tree};
use jobtree::types::InstanceId;

pub use jobtree_test_utils::*;

/// Write `files` (relative name, TOML) into `dir`; returns the first path.
pub fn write_jobs(dir: &Path, files: &[(&str, &str)]) -> PathBuf {
    for (name, content) in files {
        fs::write(dir.join(name), content).expect("write job document");
    }
    dir.join(files[0].0)
}

pub fn path(s: &str) -> NodePath {
    s.parse().expect("valid node path")
}

pub fn instance_at(tree: &Tree, at: &str) -> InstanceId {
    let key = tree.find(&path(at)).unwrap_or_else(|| panic!("no node at {at}"));
    tree.get(key).expect("live node").instance()
}

/// Every live path, in walk order.
pub fn paths(tree: &Tree) -> Vec<String> {
    tree.walk(tree.root())
        .into_iter()
        .map(|k| tree.path_of(k).to_string())
        .collect()
}
