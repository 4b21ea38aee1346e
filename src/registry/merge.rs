// src/registry/merge.rs

//! Global registry merger.
//!
//! After a subtree rooted at path `S` changed, every table is reconciled
//! against the entries [`collect`](super::collect) derives from the live
//! subtree:
//!
//! - (a) entries present in the new side but not registered are added;
//! - (b) registered entries under `S` absent from the new side are removed;
//! - (c) on a key match the registered entry is kept, unless the node it
//!   references was replaced: then the new entry takes over, adopting the
//!   old entry's cached trigger state, and a [`StateTransfer`] is reported
//!   so the caller can re-propagate that state onto the new node.
//!
//! Local tables are merged for every job list inside `S` (bottom-up), then
//! again at every ancestor job list up to the root. The plain-name and
//! last-chance tables are realigned against the whole tree, so a name
//! shadowed outside `S` is picked up again when its owner under `S` goes.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use crate::registry::collect::{collect_node_index, collect_wiring};
use crate::registry::{EventTriggerRegistry, NodeRef, RegistryEntry};
use crate::tree::{NodeKey, NodePath, Tree};
use crate::types::ObservedEvent;

/// A registry key that could not be resolved; skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeFailure {
    pub registry: &'static str,
    pub key: String,
    pub reason: String,
}

impl fmt::Display for MergeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.registry, self.key, self.reason)
    }
}

/// Cached trigger state that moved from a replaced node onto its successor.
#[derive(Debug, Clone)]
pub struct StateTransfer {
    pub node: NodeRef,
    pub event: ObservedEvent,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub added: usize,
    pub removed: usize,
    pub repointed: usize,
    pub kept: usize,
    pub pruned_connectors: usize,
    pub failures: Vec<MergeFailure>,
    pub transfers: Vec<StateTransfer>,
}

impl MergeOutcome {
    pub fn absorb(&mut self, other: MergeOutcome) {
        self.added += other.added;
        self.removed += other.removed;
        self.repointed += other.repointed;
        self.kept += other.kept;
        self.pruned_connectors += other.pruned_connectors;
        self.failures.extend(other.failures);
        self.transfers.extend(other.transfers);
    }
}

/// Reconcile one table against `fresh`, limited to entries under `scope`.
pub(crate) fn merge_table<K, E>(
    table: &'static str,
    registered: &mut BTreeMap<K, E>,
    fresh: BTreeMap<K, E>,
    scope: &NodePath,
    out: &mut MergeOutcome,
) where
    K: Ord + fmt::Debug,
    E: RegistryEntry,
{
    let before = registered.len();
    registered.retain(|k, e| !e.node().path.starts_with(scope) || fresh.contains_key(k));
    out.removed += before - registered.len();

    for (key, mut entry) in fresh {
        match registered.get_mut(&key) {
            None => {
                registered.insert(key, entry);
                out.added += 1;
            }
            Some(existing) if !existing.node().path.starts_with(scope) => {
                debug!(
                    table,
                    ?key,
                    kept = %existing.node(),
                    "key already registered outside the merged subtree; keeping it"
                );
                out.kept += 1;
            }
            Some(existing) if existing.node().instance == entry.node().instance => {
                out.kept += 1;
            }
            Some(existing) => {
                entry.carry_state_from(existing);
                if let Some(event) = entry.cached_event() {
                    out.transfers.push(StateTransfer {
                        node: entry.node().clone(),
                        event: event.clone(),
                    });
                }
                debug!(table, ?key, from = %existing.node(), to = %entry.node(), "repointing entry");
                *existing = entry;
                out.repointed += 1;
            }
        }
    }
}

/// Make a name table equal to `whole`, counting the differences.
fn align_names(
    table: &'static str,
    registered: &mut BTreeMap<String, NodeRef>,
    whole: BTreeMap<String, NodeRef>,
    out: &mut MergeOutcome,
) {
    let before = registered.len();
    registered.retain(|name, _| whole.contains_key(name));
    out.removed += before - registered.len();

    for (name, entry) in whole {
        match registered.get_mut(&name) {
            None => {
                debug!(table, name = %name, to = %entry, "registering name");
                registered.insert(name, entry);
                out.added += 1;
            }
            Some(existing) if *existing == entry => out.kept += 1,
            Some(existing) => {
                debug!(table, name = %name, from = %existing, to = %entry, "repointing name");
                *existing = entry;
                out.repointed += 1;
            }
        }
    }
}

fn merge_triggers(
    registered: &mut EventTriggerRegistry,
    fresh: EventTriggerRegistry,
    scope: &NodePath,
    out: &mut MergeOutcome,
) {
    let mut fresh = fresh.by_events;
    let sets: Vec<_> = registered
        .by_events
        .keys()
        .chain(fresh.keys())
        .cloned()
        .collect();

    for set in sets {
        let incoming = fresh.remove(&set).unwrap_or_default();
        let table = registered.by_events.entry(set).or_default();
        merge_table("triggers", table, incoming, scope, out);
    }
    registered.by_events.retain(|_, m| !m.is_empty());
}

/// Reconcile every registry for the subtree rooted at `scope_key` of the
/// live tree, and at each ancestor job list.
pub fn merge_subtree(tree: &mut Tree, scope_key: NodeKey) -> MergeOutcome {
    let scope = tree.path_of(scope_key);
    let mut out = MergeOutcome::default();

    // Node index first: wiring resolves names against the merged index.
    let fresh = collect_node_index(tree, scope_key);
    merge_table("nodes.by_id", &mut tree.globals.nodes.by_id, fresh.by_id, &scope, &mut out);

    // Name tables hold the first node in pre-order, which may lie outside
    // the scope; they are realigned against the whole live tree.
    let whole = collect_node_index(tree, tree.root());
    {
        let nodes = &mut tree.globals.nodes;
        align_names("nodes.by_name", &mut nodes.by_name, whole.by_name, &mut out);
        align_names("nodes.last_chance", &mut nodes.last_chance, whole.last_chance, &mut out);
    }

    let mut wiring = collect_wiring(tree, scope_key, &tree.globals.nodes);
    for failure in &wiring.failures {
        warn!(%failure, "registry merge skipped an unresolvable key");
    }
    out.failures.append(&mut wiring.failures);

    merge_triggers(&mut tree.globals.triggers, wiring.triggers, &scope, &mut out);
    merge_table(
        "connectors",
        &mut tree.globals.connectors.entries,
        wiring.connectors.entries,
        &scope,
        &mut out,
    );

    let mut jobs: Vec<NodeKey> = tree
        .walk(scope_key)
        .into_iter()
        .filter(|k| tree.get(*k).is_some_and(|n| n.is_job_list()))
        .collect();
    jobs.reverse();
    jobs.extend(tree.job_ancestors(scope_key));

    for job in jobs {
        let path = tree.path_of(job);
        let fresh = wiring.locals.remove(&path).unwrap_or_default();
        if let Some(locals) = tree.get_mut(job).and_then(|n| n.locals_mut()) {
            merge_table(
                "workers",
                &mut locals.workers.entries,
                fresh.workers.entries,
                &scope,
                &mut out,
            );
            merge_table(
                "modifier_checkers",
                &mut locals.modifier_checkers.entries,
                fresh.modifier_checkers.entries,
                &scope,
                &mut out,
            );
        }
    }

    let pruned = tree.globals.connectors.prune(&tree.globals.nodes);
    out.pruned_connectors = pruned.len();

    debug!(
        scope = %scope,
        added = out.added,
        removed = out.removed,
        repointed = out.repointed,
        kept = out.kept,
        pruned = out.pruned_connectors,
        "registry merge finished"
    );
    out
}

/// Build every registry of a freshly loaded tree from scratch.
pub fn rebuild(tree: &mut Tree) -> MergeOutcome {
    let root = tree.root();
    merge_subtree(tree, root)
}

/// Seed the candidate job list `c` with the local registries (and their
/// cached trigger/worker state) of the active job list `a`.
///
/// The candidate's loader output carries no registry state; after a graft
/// the merge compares against what is seeded here.
pub fn carry_local_state(active: &Tree, a: NodeKey, candidate: &mut Tree, c: NodeKey) {
    let Some(locals) = active.get(a).and_then(|n| n.locals()).cloned() else {
        return;
    };
    if let Some(target) = candidate.get_mut(c).and_then(|n| n.locals_mut()) {
        *target = locals;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{dangling_entries, TriggerEntry};
    use crate::tree::{Node, NodeConfig, PluginSpec, TriggerSpec, WorkerSpec};
    use crate::types::{EventSet, InstanceId, NodeKind};
    use std::time::SystemTime;

    fn r(path: &str) -> NodeRef {
        NodeRef {
            path: path.parse().unwrap(),
            instance: InstanceId::next(),
        }
    }

    fn single(id: &str) -> Node {
        Node::new(id, NodeKind::SingleNode, NodeConfig::default())
    }

    #[test]
    fn merge_table_adds_removes_and_keeps() {
        let scope: NodePath = "root/main".parse().unwrap();
        let keep = r("root/main/a");
        let outside = r("root/other/x");

        let mut registered = BTreeMap::new();
        registered.insert("a", keep.clone());
        registered.insert("gone", r("root/main/gone"));
        registered.insert("x", outside.clone());

        let mut fresh = BTreeMap::new();
        fresh.insert("a", keep.clone());
        fresh.insert("new", r("root/main/new"));

        let mut out = MergeOutcome::default();
        merge_table("t", &mut registered, fresh, &scope, &mut out);

        assert_eq!((out.added, out.removed, out.kept, out.repointed), (1, 1, 1, 0));
        assert!(registered.contains_key("x"));
        assert!(!registered.contains_key("gone"));
        assert_eq!(registered["a"], keep);
    }

    #[test]
    fn replaced_trigger_owner_is_repointed_with_cached_event() {
        let scope: NodePath = "root/main".parse().unwrap();
        let old_owner = r("root/main/t");
        let new_owner = NodeRef {
            path: old_owner.path.clone(),
            instance: InstanceId::next(),
        };
        let event = ObservedEvent {
            event: "false".into(),
            source: "root/main/a".into(),
            at: SystemTime::now(),
        };

        let mut registered = BTreeMap::new();
        registered.insert(
            "t",
            TriggerEntry {
                node: old_owner,
                source: "a".into(),
                last_event: Some(event.clone()),
            },
        );
        let mut fresh = BTreeMap::new();
        fresh.insert(
            "t",
            TriggerEntry {
                node: new_owner.clone(),
                source: "a".into(),
                last_event: None,
            },
        );

        let mut out = MergeOutcome::default();
        merge_table("triggers", &mut registered, fresh, &scope, &mut out);

        assert_eq!(out.repointed, 1);
        assert_eq!(registered["t"].node, new_owner);
        assert_eq!(registered["t"].last_event, Some(event.clone()));
        assert_eq!(out.transfers.len(), 1);
        assert_eq!(out.transfers[0].event, event);
    }

    #[test]
    fn rebuild_registers_every_requirement() {
        let mut main = Node::new("main", NodeKind::JobList, NodeConfig::default());
        main.config
            .checkers
            .insert("disk".into(), PluginSpec::new("command").arg("cmd", "true"));
        let mut tree = Tree::new(main);
        let root = tree.root();

        tree.add_child(root, single("a")).unwrap();

        let mut t = single("t");
        t.config.trigger = Some(TriggerSpec::On {
            events: EventSet::new(["false"]),
            source: "a".into(),
        });
        t.config.workers.push(WorkerSpec {
            on: EventSet::new(["true"]),
            plugins: vec![PluginSpec::new("command")],
        });
        tree.add_child(root, t).unwrap();

        let mut c = Node::new("c", NodeKind::Connector, NodeConfig::default());
        c.config.target = Some("elsewhere".into());
        tree.add_child(root, c).unwrap();

        let mut m = Node::new("m", NodeKind::ValueModifier, NodeConfig::default());
        m.config.modifier = Some(crate::tree::ModifierSpec {
            checker: "disk".into(),
            op: crate::tree::ModifierOp::Invert,
        });
        tree.add_child(root, m).unwrap();

        let out = rebuild(&mut tree);
        assert!(out.failures.is_empty(), "{:?}", out.failures);

        let g = &tree.globals;
        assert_eq!(g.nodes.len(), 5);
        assert_eq!(g.triggers.len(), 1);
        assert_eq!(g.connectors.len(), 1);
        let locals = tree.node(root).unwrap().locals().unwrap();
        assert_eq!(locals.workers.len(), 1);
        assert_eq!(locals.modifier_checkers.get("m").unwrap().checker, "disk");
        assert!(dangling_entries(&tree).is_empty());
    }

    #[test]
    fn shadowed_names_take_over_when_the_first_owner_leaves() {
        let mut tree = Tree::new(Node::new("main", NodeKind::JobList, NodeConfig::default()));
        let root = tree.root();
        let s1 = tree
            .add_child(root, Node::new("s1", NodeKind::JobList, NodeConfig::default()))
            .unwrap();
        let s2 = tree
            .add_child(root, Node::new("s2", NodeKind::JobList, NodeConfig::default()))
            .unwrap();
        let x1 = tree.add_child(s1, single("x")).unwrap();
        tree.add_child(s2, single("x")).unwrap();
        rebuild(&mut tree);
        assert_eq!(
            tree.globals.nodes.resolve("x").map(|r| r.path.to_string()),
            Some("main/s1/x".to_string())
        );

        tree.remove_subtree(x1);
        let out = merge_subtree(&mut tree, s1);

        let nodes = &tree.globals.nodes;
        assert_eq!(
            nodes.resolve("x").map(|r| r.path.to_string()),
            Some("main/s2/x".to_string())
        );
        assert!(nodes.last_chance.get("s1.x").is_none());
        assert!(nodes.last_chance.contains_key("s2.x"));
        assert!(out.repointed >= 1);
        assert!(dangling_entries(&tree).is_empty());
    }

    #[test]
    fn unresolvable_trigger_source_is_skipped_not_fatal() {
        let mut tree = Tree::new(Node::new("main", NodeKind::JobList, NodeConfig::default()));
        let root = tree.root();
        let mut t = single("t");
        t.config.trigger = Some(TriggerSpec::On {
            events: EventSet::new(["true"]),
            source: "nobody".into(),
        });
        tree.add_child(root, t).unwrap();

        let out = rebuild(&mut tree);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].registry, "triggers");
        assert!(tree.globals.triggers.is_empty());
    }
}
