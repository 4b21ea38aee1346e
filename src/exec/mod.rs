// src/exec/mod.rs

//! Node execution layer.
//!
//! Every executing node is driven by its own supervisor task, which runs the
//! node's checker when its trigger fires and reports back to the runtime via
//! [`EngineEvent::NodeResult`](crate::engine::EngineEvent).
//!
//! - [`plugins`] defines the checker/worker/logger traits, the
//!   [`PluginLoader`] seam, and the built-in plugins.
//! - [`command`] runs shell commands for the built-in command plugins.
//! - [`supervisor`] is the per-node loop (timer, tree-event fires, cancel).
//! - [`executor_loop`] owns the supervisors and serves [`SupervisorRequest`]s.
//! - [`backend`] provides the [`ExecutorBackend`] trait the runtime
//!   dispatches through, so tests can swap in a fake.
//! - [`lifecycle`] adapts the reconciler's start/stop hooks to requests.

pub mod backend;
pub mod command;
pub mod executor_loop;
pub mod lifecycle;
pub mod plugins;
pub mod supervisor;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_executor;
pub use lifecycle::ChannelLifecycle;
pub use plugins::{BuiltinPlugins, PluginLoader};

use crate::registry::NodeRef;
use crate::tree::{ModifierOp, NodeKey, NodePath, PluginSpec, Tree, TriggerSpec};
use crate::types::{InstanceId, NodeKind, NodeResult, ObservedEvent};

/// What a supervisor evaluates on each run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Checker(PluginSpec),
    /// A job-level checker whose value is rewritten by `op`.
    Modified { checker: PluginSpec, op: ModifierOp },
}

/// Everything a supervisor needs to drive one node.
#[derive(Debug, Clone)]
pub struct NodeJob {
    pub instance: InstanceId,
    pub path: NodePath,
    pub probe: Probe,
    pub trigger: Option<TriggerSpec>,
}

impl NodeJob {
    /// The supervisor job for `key`, if that node executes at all.
    ///
    /// Single nodes run their checker; value modifiers run the job-level
    /// checker they name. Branches, connectors, constants and snapshots
    /// never execute.
    pub fn for_node(tree: &Tree, key: NodeKey) -> Option<NodeJob> {
        let node = tree.get(key)?;
        let probe = match node.kind {
            NodeKind::SingleNode => Probe::Checker(node.config.checker.clone()?),
            NodeKind::ValueModifier => {
                let modifier = node.config.modifier.as_ref()?;
                let job = tree.get(node.job()?)?;
                Probe::Modified {
                    checker: job.config.checkers.get(&modifier.checker)?.clone(),
                    op: modifier.op,
                }
            }
            _ => return None,
        };
        Some(NodeJob {
            instance: node.instance(),
            path: tree.path_of(key),
            probe,
            trigger: node.config.trigger.clone(),
        })
    }
}

/// Requests served by the executor loop.
#[derive(Debug, Clone)]
pub enum SupervisorRequest {
    /// Start (or restart) the supervisor of a node.
    Start(NodeJob),
    /// Cooperative stop; the supervisor exits at its next await point.
    Stop(InstanceId),
    /// A tree-event trigger fired for a node.
    Fire {
        instance: InstanceId,
        event: ObservedEvent,
    },
    /// Hand a node cached trigger state without running it.
    Prime {
        instance: InstanceId,
        event: ObservedEvent,
    },
    /// Run a node's workers, in order, for `event`.
    RunWorkers {
        node: NodeRef,
        plugins: Vec<PluginSpec>,
        event: ObservedEvent,
    },
    /// Hand a result to a named logger.
    Log {
        logger: String,
        path: NodePath,
        result: NodeResult,
    },
}
