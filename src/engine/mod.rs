// src/engine/mod.rs

//! Orchestration engine for jobtree.
//!
//! This module ties together:
//! - result propagation (node values, expressions, connectors, triggers,
//!   workers and loggers)
//! - live reloads of job documents through the reconciler
//! - the main runtime event loop that reacts to:
//!   - node results from supervisors
//!   - reload requests (document watcher) and their outcomes
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the reload entry point in
//! [`reload`]; the async/IO shell in [`runtime`].

use crate::reconcile::ReconcileReport;
use crate::tree::NodePath;
use crate::types::{InstanceId, NodeResult};

/// Events flowing into the runtime from supervisors, the watcher, etc.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A supervisor finished a run.
    NodeResult {
        instance: InstanceId,
        result: NodeResult,
    },
    /// Reload the job list owning `origin`.
    ReloadRequested { origin: NodePath },
    /// A reload task finished.
    ReloadFinished {
        origin: NodePath,
        outcome: Result<ReconcileReport, String>,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod reload;
pub mod runtime;
pub mod views;

pub use core::{CoreCommand, CoreRuntime, CoreStep};
pub use reload::Engine;
pub use runtime::Runtime;
pub use views::{AlternativeViews, Coordinator, InlineCoordinator, NoViews, TreeSnapshot};
