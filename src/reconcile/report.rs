// src/reconcile/report.rs

use std::fmt;

use crate::registry::{MergeFailure, MergeOutcome};
use crate::tree::NodePath;
use crate::types::InstanceId;

/// A pass tried to replace the tree root; nothing was changed there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootReplacementRejected {
    pub path: NodePath,
}

/// One subtree replacement.
#[derive(Debug, Clone)]
pub struct GraftRecord {
    pub path: NodePath,
    pub replaced: InstanceId,
    pub replacement: InstanceId,
    /// Children of the replaced job list that were spliced back running.
    pub salvaged: Vec<NodePath>,
}

/// Everything a pass did.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Active nodes compared against their candidate counterpart.
    pub visited: usize,
    pub grafts: Vec<GraftRecord>,
    pub rejected: Vec<RootReplacementRejected>,
    pub merge: MergeOutcome,
    /// Instances released and sent a stop request.
    pub disposed: Vec<InstanceId>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.grafts.is_empty()
    }

    pub fn merge_failures(&self) -> &[MergeFailure] {
        &self.merge.failures
    }

    pub fn grafted_paths(&self) -> Vec<&NodePath> {
        self.grafts.iter().map(|g| &g.path).collect()
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "visited {} nodes, {} grafts, {} root rejections, {} disposed, {} merge failures",
            self.visited,
            self.grafts.len(),
            self.rejected.len(),
            self.disposed.len(),
            self.merge.failures.len()
        )
    }
}
