// src/engine/views.rs

//! Presentation-side collaborators of a reload.

use std::collections::BTreeMap;

use crate::tree::{dump, NodePath, Tree};
use crate::types::LogicalValue;

/// Read-only picture of the live tree, taken under the gate after a pass.
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    pub values: BTreeMap<NodePath, LogicalValue>,
    pub dump: String,
}

impl TreeSnapshot {
    pub fn capture(tree: &Tree) -> Self {
        let values = tree
            .walk(tree.root())
            .into_iter()
            .filter_map(|k| tree.get(k).map(|n| (tree.path_of(k), n.value())))
            .collect();
        Self {
            values,
            dump: dump::render(tree, tree.root()),
        }
    }

    pub fn value(&self, path: &NodePath) -> Option<LogicalValue> {
        self.values.get(path).copied()
    }
}

/// Dependent views (tables, graphs, dashboards) refreshed after each pass.
pub trait AlternativeViews: Send + Sync {
    fn refresh(&self, snapshot: &TreeSnapshot);
}

/// Headless default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoViews;

impl AlternativeViews for NoViews {
    fn refresh(&self, _snapshot: &TreeSnapshot) {}
}

/// Runs work on the presentation layer's own thread, when it has one.
pub trait Coordinator: Send + Sync {
    fn run(&self, work: Box<dyn FnOnce() + Send + '_>);
}

/// Runs work on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineCoordinator;

impl Coordinator for InlineCoordinator {
    fn run(&self, work: Box<dyn FnOnce() + Send + '_>) {
        work()
    }
}
