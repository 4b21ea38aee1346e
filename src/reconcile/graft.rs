// src/reconcile/graft.rs

//! Subtree grafter.
//!
//! Replaces the divergent active subtree `a` (child `k` of `P`) with its
//! candidate counterpart `c`:
//!
//! 1. locate `k` (key first, then id);
//! 2. if `a` and `c` are job lists, pair their children index by index and
//!    swap every branch-equal candidate child for a constant placeholder
//!    carrying the running child's last good value;
//! 3. detach `a` (it stays in the arena) and move `c` into the live arena;
//! 4. attach `c` at `P[k]`, rewriting back-references below it;
//! 5. invalidate `P`'s cached logic;
//! 6. start `c`;
//! 7. splice each salvaged running child back over its placeholder and
//!    carry `a`'s progress onto `c`, without restarting `c`;
//! 8. merge registries for `c` and its ancestor job lists;
//! 9. release `a` and the orphaned placeholders, sending stop requests.
//!
//! Tree dumps are published before step 3 and after steps 4, 7 and 9.

use tracing::{debug, info};

use crate::errors::{JobTreeError, Result};
use crate::reconcile::{Checkpoint, GraftRecord, Pass};
use crate::registry::merge::{carry_local_state, merge_subtree};
use crate::tree::equivalence::branch_equal;
use crate::tree::{Node, NodeKey};

impl Pass<'_, '_> {
    pub(crate) fn graft(&mut self, a: NodeKey, c: NodeKey) -> Result<()> {
        let path = self.active.path_of(a);
        let (replaced, a_id, parent) = {
            let node = self.active.node(a)?;
            let parent = node
                .parent()
                .ok_or_else(|| JobTreeError::NodeNotFound(format!("parent of {path}")))?;
            (node.instance(), node.id.clone(), parent)
        };

        // 1.
        let index = match self.active.node(parent)?.children().iter().position(|k| *k == a) {
            Some(i) => i,
            None => self
                .active
                .find_child_by_id(parent, &a_id)
                .map(|(i, _)| i)
                .ok_or_else(|| JobTreeError::NodeNotFound(format!("{path} under its parent")))?,
        };

        // 2.
        let salvage = self.stand_in_for_running_children(a, c)?;
        self.carry_nested_job_state(c);
        debug!(path = %path, salvaged = salvage.len(), "grafting divergent subtree");
        self.checkpoint(Checkpoint::BeforeDetach);

        // 3.
        self.active.detach(a);
        let moved = self.active.move_subtree_from(&mut self.candidate, c)?;
        let replacement = self.active.node(moved)?.instance();

        // 4. + 5.
        self.active.attach(parent, index, moved)?;
        self.active.invalidate(parent);
        self.checkpoint(Checkpoint::AfterAttach);

        // 6.
        self.lifecycle.start(self.active, moved);

        // 7.
        let mut salvaged = Vec::with_capacity(salvage.len());
        let mut orphans = Vec::with_capacity(salvage.len());
        for (i, running) in salvage {
            self.active.detach(running);
            orphans.push(self.active.replace_child(moved, i, running)?);
            salvaged.push(self.active.path_of(running));
        }
        if self.active.node(a)?.is_job_list() && self.active.node(moved)?.is_job_list() {
            let progress = self.active.node(a)?.progress;
            self.active.node_mut(moved)?.progress = progress;
        }
        self.active.invalidate(moved);
        self.checkpoint(Checkpoint::AfterSplice);

        // 8.
        let outcome = merge_subtree(self.active, moved);
        for transfer in &outcome.transfers {
            if let Some(node) = self
                .active
                .key_of(transfer.node.instance)
                .and_then(|k| self.active.get_mut(k))
            {
                node.observed = Some(transfer.event.clone());
            }
            self.lifecycle.prime(transfer.node.instance, &transfer.event);
        }
        self.report.merge.absorb(outcome);

        // 9.
        let mut disposed = self.active.remove_subtree(a);
        for orphan in orphans {
            disposed.extend(self.active.remove_subtree(orphan));
        }
        for instance in &disposed {
            self.lifecycle.stop(*instance);
        }
        self.checkpoint(Checkpoint::AfterRelease);

        info!(
            path = %path,
            replaced = %replaced,
            replacement = %replacement,
            salvaged = salvaged.len(),
            disposed = disposed.len(),
            "subtree grafted"
        );
        self.report.disposed.extend(disposed);
        self.report.grafts.push(GraftRecord {
            path,
            replaced,
            replacement,
            salvaged,
        });
        Ok(())
    }

    /// Step 2. Returns `(index, running active child)` for every pair whose
    /// candidate side is now a placeholder.
    fn stand_in_for_running_children(
        &mut self,
        a: NodeKey,
        c: NodeKey,
    ) -> Result<Vec<(usize, NodeKey)>> {
        let a_node = self.active.node(a)?;
        let c_node = self.candidate.node(c)?;
        if !(a_node.is_job_list() && c_node.is_job_list()) {
            return Ok(Vec::new());
        }

        let pairs: Vec<(usize, NodeKey, NodeKey)> = a_node
            .children()
            .iter()
            .zip(c_node.children().iter())
            .enumerate()
            .map(|(i, (ak, ck))| (i, *ak, *ck))
            .collect();

        let mut out = Vec::new();
        for (i, running, fresh) in pairs {
            if !branch_equal(self.active, running, &self.candidate, fresh) {
                continue;
            }
            let r = self.active.node(running)?;
            let placeholder = Node::placeholder(r.id.clone(), r.name.clone(), r.last_good);
            let ph = self.candidate.insert_detached(placeholder);
            let discarded = self.candidate.replace_child(c, i, ph)?;
            self.candidate.remove_subtree(discarded);
            out.push((i, running));
        }
        Ok(out)
    }

    /// Seed every candidate job list below `c` with the local registry state
    /// of the active job list at the same path.
    fn carry_nested_job_state(&mut self, c: NodeKey) {
        let jobs: Vec<NodeKey> = self
            .candidate
            .walk(c)
            .into_iter()
            .filter(|k| self.candidate.get(*k).is_some_and(|n| n.is_job_list()))
            .collect();

        for job in jobs {
            let path = self.candidate_path(job);
            let Some(active_job) = self.active_index.get(&path) else {
                continue;
            };
            if self.active.get(active_job).is_some_and(|n| n.is_job_list()) {
                carry_local_state(self.active, active_job, &mut self.candidate, job);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::reconcile::testing::Recorder;
    use crate::reconcile::{ConcurrencyGate, Reconciler};
    use crate::registry::{dangling_entries, merge::rebuild};
    use crate::tree::{Node, NodeConfig, PluginSpec, Tree};
    use crate::types::{LogicalValue, NodeKind, NodeResult};

    fn leaf(id: &str) -> Node {
        let cfg = NodeConfig {
            checker: Some(PluginSpec::new("command").arg("cmd", id)),
            ..NodeConfig::default()
        };
        Node::new(id, NodeKind::SingleNode, cfg)
    }

    fn job(expr: &str, ids: &[&str]) -> Tree {
        let cfg = NodeConfig {
            expression: Some(expr.into()),
            ..NodeConfig::default()
        };
        let mut tree = Tree::new(Node::new("main", NodeKind::JobList, cfg));
        let root = tree.root();
        for id in ids {
            tree.add_child(root, leaf(id)).unwrap();
        }
        tree
    }

    #[test]
    fn expression_change_keeps_running_children() {
        let mut active = Tree::anchored(job("a & b", &["a", "b"])).unwrap();
        rebuild(&mut active);
        let main = active.find(&"root/main".parse().unwrap()).unwrap();
        let a = active.find(&"root/main/a".parse().unwrap()).unwrap();
        let b = active.find(&"root/main/b".parse().unwrap()).unwrap();
        active.node_mut(a).unwrap().record_result(NodeResult::new(LogicalValue::True));
        active.node_mut(main).unwrap().progress.runs = 7;
        let old_main = active.node(main).unwrap().instance();
        let a_id = active.node(a).unwrap().instance();
        let b_id = active.node(b).unwrap().instance();

        let rec = Recorder::default();
        let report = Reconciler::new(&rec)
            .run(
                &ConcurrencyGate::new(),
                &mut active,
                main,
                job("a & b & c", &["a", "b", "c"]),
            )
            .unwrap();

        assert_eq!(report.grafts.len(), 1);
        assert_eq!(report.grafts[0].salvaged.len(), 2);

        let new_main = active.find(&"root/main".parse().unwrap()).unwrap();
        let node = active.node(new_main).unwrap();
        assert_ne!(node.instance(), old_main);
        assert_eq!(node.progress.runs, 7);
        assert_eq!(node.cached_logic, None);

        let a_after = active.find(&"root/main/a".parse().unwrap()).unwrap();
        assert_eq!(active.node(a_after).unwrap().instance(), a_id);
        assert_eq!(active.node(a_after).unwrap().value(), LogicalValue::True);
        assert_eq!(active.node(a_after).unwrap().job(), Some(new_main));
        let b_after = active.find(&"root/main/b".parse().unwrap()).unwrap();
        assert_eq!(active.node(b_after).unwrap().instance(), b_id);

        let started = rec.started.lock().unwrap();
        assert!(!started.contains(&a_id) && !started.contains(&b_id));
        let c = active.find(&"root/main/c".parse().unwrap()).unwrap();
        assert!(started.contains(&active.node(c).unwrap().instance()));
        assert!(rec.stopped.lock().unwrap().contains(&old_main));

        assert!(dangling_entries(&active).is_empty());
        assert_eq!(active.len(), 5);
    }
}
