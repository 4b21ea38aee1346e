// src/reconcile/mod.rs

//! Live-tree reconciliation.
//!
//! One pass compares the active subtree at a reload origin with a freshly
//! loaded candidate tree and replaces only the divergent parts:
//!
//! - [`gate`]: the tree-wide suspend/resume gate held for the whole pass.
//! - [`differ`]: depth-first walk over the active tree, correlating nodes by
//!   structural path and recursing only into equivalent branches.
//! - [`graft`]: replaces one divergent subtree, salvaging running children.
//! - [`report`]: what a pass did.
//! - [`diagnostics`]: tree-dump checkpoints published during grafts.
//!
//! The pass itself is synchronous and never awaits. Starting and stopping
//! node supervisors goes through [`NodeLifecycle`], whose implementations
//! only enqueue requests.

pub mod diagnostics;
pub mod differ;
pub mod gate;
pub mod graft;
pub mod report;

use tracing::{debug, info};

pub use diagnostics::{Checkpoint, DiagnosticSink, NullSink, TracingSink};
pub use gate::{ConcurrencyGate, GateGuard};
pub use report::{GraftRecord, ReconcileReport, RootReplacementRejected};

use crate::errors::Result;
use crate::tree::{dump, NodeKey, NodePath, PathIndex, Tree};
use crate::types::{InstanceId, ObservedEvent};

/// Start/stop hooks the grafter calls. Implementations must not block.
pub trait NodeLifecycle: Send + Sync {
    /// Begin supervising the subtree rooted at `key`.
    fn start(&self, tree: &Tree, key: NodeKey);

    /// Cooperative stop request for a released node.
    fn stop(&self, instance: InstanceId);

    /// Hand a node the trigger state cached for the node it replaced.
    fn prime(&self, instance: InstanceId, event: &ObservedEvent);
}

/// Runs reconciliation passes against one lifecycle and diagnostic sink.
pub struct Reconciler<'r> {
    lifecycle: &'r dyn NodeLifecycle,
    diagnostics: Option<&'r dyn DiagnosticSink>,
}

impl<'r> Reconciler<'r> {
    pub fn new(lifecycle: &'r dyn NodeLifecycle) -> Self {
        Self {
            lifecycle,
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, sink: &'r dyn DiagnosticSink) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Reconcile the active subtree at `origin` with `candidate`.
    ///
    /// `candidate`'s root must carry the same id as `origin`. If `origin` is
    /// the tree root, `candidate` must be anchored the same way.
    pub fn run(
        &self,
        gate: &ConcurrencyGate,
        active: &mut Tree,
        origin: NodeKey,
        candidate: Tree,
    ) -> Result<ReconcileReport> {
        let _guard = gate.suspend();

        let prefix = active.node(origin)?.parent().map(|p| active.path_of(p));
        let candidate_index = PathIndex::build(&candidate, candidate.root(), prefix.as_ref());
        let active_index = PathIndex::build(active, origin, None);
        debug!(
            origin = %active.path_of(origin),
            active = active_index.len(),
            candidate = candidate_index.len(),
            "indexed both trees"
        );

        let mut pass = Pass {
            active,
            candidate,
            prefix,
            active_index,
            candidate_index,
            lifecycle: self.lifecycle,
            diagnostics: self.diagnostics,
            report: ReconcileReport::default(),
        };
        pass.diff(origin)?;

        let report = pass.report;
        info!(%report, "reconciliation pass finished");
        Ok(report)
    }
}

/// State of one running pass.
pub(crate) struct Pass<'t, 'r> {
    pub(crate) active: &'t mut Tree,
    pub(crate) candidate: Tree,
    /// Active path of the origin's parent; candidate paths are relative to it.
    pub(crate) prefix: Option<NodePath>,
    pub(crate) active_index: PathIndex,
    pub(crate) candidate_index: PathIndex,
    pub(crate) lifecycle: &'r dyn NodeLifecycle,
    pub(crate) diagnostics: Option<&'r dyn DiagnosticSink>,
    pub(crate) report: ReconcileReport,
}

impl Pass<'_, '_> {
    /// Path a candidate node will occupy in the active tree.
    pub(crate) fn candidate_path(&self, key: NodeKey) -> NodePath {
        let path = self.candidate.path_of(key);
        match &self.prefix {
            Some(p) => path.rebased(p),
            None => path,
        }
    }

    pub(crate) fn checkpoint(&self, at: Checkpoint) {
        if let Some(sink) = self.diagnostics {
            sink.publish(at, &dump::render(self.active, self.active.root()));
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records lifecycle calls in order.
    #[derive(Debug, Default)]
    pub(crate) struct Recorder {
        pub started: Mutex<Vec<InstanceId>>,
        pub stopped: Mutex<Vec<InstanceId>>,
        pub primed: Mutex<Vec<(InstanceId, String)>>,
    }

    impl NodeLifecycle for Recorder {
        fn start(&self, tree: &Tree, key: NodeKey) {
            let mut started = self.started.lock().unwrap();
            for k in tree.walk(key) {
                started.push(tree.get(k).unwrap().instance());
            }
        }

        fn stop(&self, instance: InstanceId) {
            self.stopped.lock().unwrap().push(instance);
        }

        fn prime(&self, instance: InstanceId, event: &ObservedEvent) {
            self.primed
                .lock()
                .unwrap()
                .push((instance, event.event.clone()));
        }
    }
}
