// src/tree/index.rs

//! Tree indexer: path -> node lookup, rebuilt once per tree per pass.

use std::collections::HashMap;

use crate::tree::{NodeKey, NodePath, Tree};

#[derive(Debug, Default)]
pub struct PathIndex {
    map: HashMap<NodePath, NodeKey>,
}

impl PathIndex {
    /// Index every node below (and including) `start`.
    ///
    /// Paths are computed relative to `start`'s own parent chain, then
    /// rebased on `prefix` if given. A candidate loaded for a nested job list
    /// is indexed with the active job list's parent path as prefix, so both
    /// trees share one path space.
    pub fn build(tree: &Tree, start: NodeKey, prefix: Option<&NodePath>) -> Self {
        let mut map = HashMap::new();
        let base = tree.path_of(start);
        let mut stack: Vec<(NodeKey, NodePath)> = vec![(start, base)];

        while let Some((key, path)) = stack.pop() {
            let Some(node) = tree.get(key) else { continue };
            for child in node.children().iter().rev() {
                if let Some(c) = tree.get(*child) {
                    stack.push((*child, path.child(&c.id)));
                }
            }
            let full = match prefix {
                Some(p) => path.rebased(p),
                None => path,
            };
            map.insert(full, key);
        }

        Self { map }
    }

    pub fn get(&self, path: &NodePath) -> Option<NodeKey> {
        self.map.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &NodePath> {
        self.map.keys()
    }
}
