// src/registry/checkers.rs

//! Checker lookup: connector references that could not be resolved yet
//! (global, pruned as they resolve) and checkers referenced only by value
//! modifiers (local to a job list).

use std::collections::BTreeMap;

use crate::registry::{NodeIndex, NodeRef, RegistryEntry};
use crate::tree::{NodePath, PluginSpec};

#[derive(Debug, Clone)]
pub struct ConnectorEntry {
    pub node: NodeRef,
    pub target: String,
}

impl RegistryEntry for ConnectorEntry {
    fn node(&self) -> &NodeRef {
        &self.node
    }
}

#[derive(Debug, Clone, Default)]
pub struct UnresolvedConnectors {
    pub(crate) entries: BTreeMap<NodePath, ConnectorEntry>,
}

impl UnresolvedConnectors {
    pub fn insert(&mut self, entry: ConnectorEntry) {
        self.entries.insert(entry.node.path.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, connector: &NodePath) -> bool {
        self.entries.contains_key(connector)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectorEntry> {
        self.entries.values()
    }

    /// Drop every entry whose target now resolves. Returns the pruned paths.
    pub fn prune(&mut self, index: &NodeIndex) -> Vec<NodePath> {
        let resolved: Vec<NodePath> = self
            .entries
            .iter()
            .filter(|(_, e)| index.resolve(&e.target).is_some())
            .map(|(p, _)| p.clone())
            .collect();
        for p in &resolved {
            self.entries.remove(p);
        }
        resolved
    }
}

/// A job-level checker used by the value modifier `node`.
#[derive(Debug, Clone)]
pub struct CheckerEntry {
    pub node: NodeRef,
    pub checker: String,
    pub spec: PluginSpec,
}

impl RegistryEntry for CheckerEntry {
    fn node(&self) -> &NodeRef {
        &self.node
    }
}

/// modifier node id -> checker it evaluates.
#[derive(Debug, Clone, Default)]
pub struct ModifierCheckers {
    pub(crate) entries: BTreeMap<String, CheckerEntry>,
}

impl ModifierCheckers {
    pub fn insert(&mut self, modifier_id: impl Into<String>, entry: CheckerEntry) {
        self.entries.insert(modifier_id.into(), entry);
    }

    pub fn get(&self, modifier_id: &str) -> Option<&CheckerEntry> {
        self.entries.get(modifier_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CheckerEntry> {
        self.entries.values()
    }
}
