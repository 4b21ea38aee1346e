// src/registry/mod.rs

//! Tree-global registries.
//!
//! Four lookup tables are shared across job-list boundaries:
//!
//! - [`triggers`]: event-name-set -> (owner path -> trigger). Global.
//! - [`workers`]: (node id + event set) -> ordered worker list. Local to the
//!   job list that owns the node.
//! - [`checkers`]: unresolved connector references (global) plus checkers
//!   referenced only by value modifiers (local).
//! - [`node_index`]: node-by-name, node-by-id and last-chance tables. Global.
//!
//! Global tables live once in [`GlobalRegistries`] on the tree (owned by the
//! root) instead of being duplicated at every job-list level. Local tables
//! live in each job list's [`LocalRegistries`].
//!
//! Entries never hold arena keys; they reference nodes through [`NodeRef`]
//! (path + instance), so they stay meaningful while subtrees move between
//! arenas. [`collect`] derives the entries a subtree requires; [`merge`]
//! reconciles them with what is registered.

pub mod checkers;
pub mod collect;
pub mod merge;
pub mod node_index;
pub mod triggers;
pub mod workers;

use std::fmt;

pub use checkers::{CheckerEntry, ConnectorEntry, ModifierCheckers, UnresolvedConnectors};
pub use merge::{MergeFailure, MergeOutcome, StateTransfer};
pub use node_index::NodeIndex;
pub use triggers::{EventTriggerRegistry, TriggerEntry};
pub use workers::{WorkerEntry, WorkerRegistry};

use crate::tree::{NodePath, Tree};
use crate::types::{InstanceId, ObservedEvent};

/// Reference from a registry entry to a node object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub path: NodePath,
    pub instance: InstanceId,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.path, self.instance)
    }
}

/// Common behaviour of every registry value.
pub trait RegistryEntry: Clone + fmt::Debug {
    /// The node this entry exists for.
    fn node(&self) -> &NodeRef;

    /// Cached trigger state that must survive a repoint.
    fn cached_event(&self) -> Option<&ObservedEvent> {
        None
    }

    /// Adopt cached state from the entry this one replaces.
    fn carry_state_from(&mut self, _previous: &Self) {}
}

impl RegistryEntry for NodeRef {
    fn node(&self) -> &NodeRef {
        self
    }
}

/// Registries owned by the tree root.
#[derive(Debug, Clone, Default)]
pub struct GlobalRegistries {
    pub triggers: EventTriggerRegistry,
    pub connectors: UnresolvedConnectors,
    pub nodes: NodeIndex,
}

/// Registries owned by one job list.
#[derive(Debug, Clone, Default)]
pub struct LocalRegistries {
    pub workers: WorkerRegistry,
    pub modifier_checkers: ModifierCheckers,
}

impl LocalRegistries {
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty() && self.modifier_checkers.is_empty()
    }
}

/// Every registry entry whose node is not the live node at that path.
///
/// Empty after any successful pass.
pub fn dangling_entries(tree: &Tree) -> Vec<String> {
    let mut dangling = Vec::new();
    let mut check = |table: &str, node: &NodeRef| {
        let live = tree
            .key_of(node.instance)
            .map(|k| tree.path_of(k))
            .filter(|p| p == &node.path);
        if live.is_none() {
            dangling.push(format!("{table}: {node}"));
        }
    };

    for (_, entry) in tree.globals.triggers.iter() {
        check("triggers", &entry.node);
    }
    for entry in tree.globals.connectors.iter() {
        check("connectors", &entry.node);
    }
    for node in tree.globals.nodes.iter() {
        check("nodes", node);
    }
    for key in tree.job_lists() {
        if let Some(locals) = tree.get(key).and_then(|n| n.locals()) {
            for entry in locals.workers.iter() {
                check("workers", &entry.node);
            }
            for entry in locals.modifier_checkers.iter() {
                check("modifier_checkers", &entry.node);
            }
        }
    }
    dangling
}
