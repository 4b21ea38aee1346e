// src/reconcile/differ.rs

//! Structural differ.
//!
//! Walks the active tree depth-first from the reload origin. Every active
//! node must have a candidate counterpart at the same path; a missing one
//! aborts the pass. Equivalent pairs are descended into, divergent pairs are
//! grafted as a whole and never descended into.

use tracing::{error, trace, warn};

use crate::errors::{JobTreeError, Result};
use crate::reconcile::{Pass, RootReplacementRejected};
use crate::registry::merge::carry_local_state;
use crate::tree::equivalence::equivalent;
use crate::tree::NodeKey;

impl Pass<'_, '_> {
    pub(crate) fn diff(&mut self, a: NodeKey) -> Result<()> {
        let path = self.active.path_of(a);
        let Some(c) = self.candidate_index.get(&path) else {
            error!(path = %path, "active node has no candidate counterpart; aborting pass");
            return Err(JobTreeError::Consistency {
                path: path.to_string(),
            });
        };
        self.report.visited += 1;

        let both_jobs = self.active.get(a).is_some_and(|n| n.is_job_list())
            && self.candidate.get(c).is_some_and(|n| n.is_job_list());
        if both_jobs {
            carry_local_state(self.active, a, &mut self.candidate, c);
        }

        if equivalent(self.active, a, &self.candidate, c) {
            trace!(path = %path, "equivalent");
            return self.diff_children(a);
        }

        if a == self.active.root() {
            warn!(path = %path, "tree root differs; refusing to replace it");
            self.report.rejected.push(RootReplacementRejected { path });
            return self.diff_children(a);
        }

        self.graft(a, c)
    }

    fn diff_children(&mut self, a: NodeKey) -> Result<()> {
        let children = self.active.node(a)?.children().to_vec();
        for child in children {
            self.diff(child)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::JobTreeError;
    use crate::reconcile::testing::Recorder;
    use crate::reconcile::{ConcurrencyGate, Reconciler};
    use crate::registry::merge::rebuild;
    use crate::tree::{Node, NodeConfig, PluginSpec, Tree};
    use crate::types::NodeKind;

    fn leaf(id: &str, cmd: &str) -> Node {
        let cfg = NodeConfig {
            checker: Some(PluginSpec::new("command").arg("cmd", cmd)),
            ..NodeConfig::default()
        };
        Node::new(id, NodeKind::SingleNode, cfg)
    }

    fn job(expr: &str, children: &[(&str, &str)]) -> Tree {
        let cfg = NodeConfig {
            expression: Some(expr.into()),
            ..NodeConfig::default()
        };
        let mut tree = Tree::new(Node::new("main", NodeKind::JobList, cfg));
        let root = tree.root();
        for (id, cmd) in children {
            tree.add_child(root, leaf(id, cmd)).unwrap();
        }
        tree
    }

    fn live(expr: &str, children: &[(&str, &str)]) -> Tree {
        let mut tree = Tree::anchored(job(expr, children)).unwrap();
        rebuild(&mut tree);
        tree
    }

    #[test]
    fn identical_candidate_changes_nothing() {
        let mut active = live("a & b", &[("a", "true"), ("b", "true")]);
        let before: Vec<_> = active.walk(active.root());
        let origin = active.find(&"root/main".parse().unwrap()).unwrap();

        let rec = Recorder::default();
        let report = Reconciler::new(&rec)
            .run(&ConcurrencyGate::new(), &mut active, origin, job("a & b", &[("a", "true"), ("b", "true")]))
            .unwrap();

        assert!(report.is_noop());
        assert_eq!(report.visited, 3);
        assert_eq!(active.walk(active.root()), before);
        assert!(rec.started.lock().unwrap().is_empty());
    }

    #[test]
    fn changed_leaf_is_the_only_graft() {
        let mut active = live("a & b", &[("a", "true"), ("b", "true")]);
        let origin = active.find(&"root/main".parse().unwrap()).unwrap();
        let a = active.find(&"root/main/a".parse().unwrap()).unwrap();
        let a_instance = active.node(a).unwrap().instance();

        let rec = Recorder::default();
        let report = Reconciler::new(&rec)
            .run(&ConcurrencyGate::new(), &mut active, origin, job("a & b", &[("a", "true"), ("b", "false")]))
            .unwrap();

        let paths: Vec<String> = report.grafted_paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["root/main/b"]);
        let a_after = active.find(&"root/main/a".parse().unwrap()).unwrap();
        assert_eq!(active.node(a_after).unwrap().instance(), a_instance);
    }

    #[test]
    fn renamed_top_job_is_rejected_at_the_root_then_fails_consistency() {
        let mut active = live("a & b", &[("a", "true"), ("b", "true")]);
        let root = active.root();
        let gate = ConcurrencyGate::new();

        let mut renamed = job("a & b", &[("a", "true"), ("b", "true")]);
        let r = renamed.root();
        renamed.node_mut(r).unwrap().id = "other".into();
        let candidate = Tree::anchored(renamed).unwrap();

        let rec = Recorder::default();
        let err = Reconciler::new(&rec)
            .run(&gate, &mut active, root, candidate)
            .unwrap_err();

        assert!(matches!(err, JobTreeError::Consistency { ref path } if path == "root/main"));
        assert!(!gate.is_suspended());
        assert_eq!(active.node(root).unwrap().children().len(), 1);
    }
}
