// src/registry/node_index.rs

use std::collections::BTreeMap;

use crate::registry::NodeRef;
use crate::tree::NodePath;

/// Tree-wide node lookup used for connector and trigger-source resolution.
#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    /// Plain name -> first node registered under it (pre-order).
    pub by_name: BTreeMap<String, NodeRef>,
    /// Full path -> node.
    pub by_id: BTreeMap<NodePath, NodeRef>,
    /// `<job name>.<node name>` -> node, for names shadowed in `by_name`.
    pub last_chance: BTreeMap<String, NodeRef>,
}

impl NodeIndex {
    /// Resolve a name: plain names first, then qualified last-chance names.
    pub fn resolve(&self, name: &str) -> Option<&NodeRef> {
        self.by_name
            .get(name)
            .or_else(|| self.last_chance.get(name))
    }

    pub fn by_path(&self, path: &NodePath) -> Option<&NodeRef> {
        self.by_id.get(path)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Every reference held by the three tables.
    pub fn iter(&self) -> impl Iterator<Item = &NodeRef> {
        self.by_name
            .values()
            .chain(self.by_id.values())
            .chain(self.last_chance.values())
    }
}
