// src/registry/collect.rs

//! Derive the registry entries a subtree requires from its nodes.
//!
//! Collection reads the live tree, so every entry it produces references the
//! node objects that are actually attached at the time.

use std::collections::BTreeMap;

use crate::registry::{
    CheckerEntry, ConnectorEntry, EventTriggerRegistry, LocalRegistries, MergeFailure, NodeIndex,
    NodeRef, TriggerEntry, UnresolvedConnectors, WorkerEntry,
};
use crate::tree::{NodeKey, NodePath, Tree, TriggerSpec};
use crate::types::NodeKind;

/// Wiring entries collected for a subtree.
#[derive(Debug, Default)]
pub struct CollectedWiring {
    pub triggers: EventTriggerRegistry,
    pub connectors: UnresolvedConnectors,
    /// Local tables keyed by the path of the job list they register in.
    pub locals: BTreeMap<NodePath, LocalRegistries>,
    pub failures: Vec<MergeFailure>,
}

fn node_ref(tree: &Tree, key: NodeKey) -> Option<NodeRef> {
    let node = tree.get(key)?;
    Some(NodeRef {
        path: tree.path_of(key),
        instance: node.instance(),
    })
}

/// Node-index entries for every node of the subtree rooted at `scope`.
pub fn collect_node_index(tree: &Tree, scope: NodeKey) -> NodeIndex {
    let mut index = NodeIndex::default();

    for key in tree.walk(scope) {
        let (Some(node), Some(r)) = (tree.get(key), node_ref(tree, key)) else {
            continue;
        };

        index.by_id.insert(r.path.clone(), r.clone());
        index
            .by_name
            .entry(node.name.clone())
            .or_insert_with(|| r.clone());

        if let Some(job) = node.job().and_then(|j| tree.get(j)) {
            index
                .last_chance
                .entry(format!("{}.{}", job.name, node.name))
                .or_insert(r);
        }
    }

    index
}

/// Trigger, connector, worker and modifier-checker entries for the subtree
/// rooted at `scope`. Names resolve against `index`.
pub fn collect_wiring(tree: &Tree, scope: NodeKey, index: &NodeIndex) -> CollectedWiring {
    let mut out = CollectedWiring::default();

    for key in tree.walk(scope) {
        let (Some(node), Some(r)) = (tree.get(key), node_ref(tree, key)) else {
            continue;
        };

        // A node registers local entries in its enclosing job list; only the
        // anchor, which has none, registers in itself.
        let home = match node.job() {
            Some(j) => tree.path_of(j),
            None => r.path.clone(),
        };

        if let Some(TriggerSpec::On { events, source }) = &node.config.trigger {
            if index.resolve(source).is_some() {
                out.triggers.insert(
                    events.clone(),
                    TriggerEntry {
                        node: r.clone(),
                        source: source.clone(),
                        last_event: None,
                    },
                );
            } else {
                out.failures.push(MergeFailure {
                    registry: "triggers",
                    key: format!("{} on {}", r.path, events),
                    reason: format!("trigger source '{source}' does not resolve"),
                });
            }
        }

        for worker in &node.config.workers {
            out.locals.entry(home.clone()).or_default().workers.insert(
                node.id.clone(),
                worker.on.clone(),
                WorkerEntry {
                    node: r.clone(),
                    plugins: worker.plugins.clone(),
                    last_event: None,
                },
            );
        }

        if node.kind == NodeKind::Connector {
            if let Some(target) = &node.config.target {
                if index.resolve(target).is_none() {
                    out.connectors.insert(ConnectorEntry {
                        node: r.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        if node.kind == NodeKind::ValueModifier {
            if let Some(m) = &node.config.modifier {
                let spec = node
                    .job()
                    .and_then(|j| tree.get(j))
                    .and_then(|j| j.config.checkers.get(&m.checker));
                match spec {
                    Some(spec) => {
                        out.locals
                            .entry(home.clone())
                            .or_default()
                            .modifier_checkers
                            .insert(
                                node.id.clone(),
                                CheckerEntry {
                                    node: r.clone(),
                                    checker: m.checker.clone(),
                                    spec: spec.clone(),
                                },
                            );
                    }
                    None => out.failures.push(MergeFailure {
                        registry: "modifier_checkers",
                        key: r.path.to_string(),
                        reason: format!("checker '{}' is not declared by the job list", m.checker),
                    }),
                }
            }
        }
    }

    out
}
