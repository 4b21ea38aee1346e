// src/reconcile/diagnostics.rs

use std::fmt;

use tracing::debug;

/// Points inside a graft where a tree dump is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    BeforeDetach,
    AfterAttach,
    AfterSplice,
    AfterRelease,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Checkpoint::BeforeDetach => "before-detach",
            Checkpoint::AfterAttach => "after-attach",
            Checkpoint::AfterSplice => "after-splice",
            Checkpoint::AfterRelease => "after-release",
        };
        f.write_str(s)
    }
}

/// External log publisher for tree dumps. Must not block.
pub trait DiagnosticSink: Send + Sync {
    fn publish(&self, checkpoint: Checkpoint, dump: &str);
}

/// Writes dumps through `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn publish(&self, checkpoint: Checkpoint, dump: &str) {
        debug!(%checkpoint, "tree dump\n{dump}");
    }
}

/// Drops every dump (`diagnostics = false`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn publish(&self, _checkpoint: Checkpoint, _dump: &str) {}
}
