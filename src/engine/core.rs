// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`EngineEvent`]s against the live tree and produces:
//! - an updated tree (results, cached branch values, registry state)
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - dispatching [`SupervisorRequest`]s to the executor
//! - spawning reloads
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, error, info, warn};

use crate::engine::EngineEvent;
use crate::exec::{NodeJob, SupervisorRequest};
use crate::expr::ExpressionEvaluator;
use crate::registry::{GlobalRegistries, NodeRef};
use crate::tree::{NodeKey, NodePath, Tree};
use crate::types::{InstanceId, LogicalValue, NodeKind, NodeResult, ObservedEvent};

/// Event raised whenever a node settles on a different value.
pub const CHANGED_EVENT: &str = "changed";

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these requests to the executor.
    Dispatch(Vec<SupervisorRequest>),
    /// Spawn a reload of the job list owning this path.
    Reload(NodePath),
}

/// Decision returned by the core after handling a single `EngineEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn dispatch(requests: Vec<SupervisorRequest>) -> Self {
        let commands = if requests.is_empty() {
            Vec::new()
        } else {
            vec![CoreCommand::Dispatch(requests)]
        };
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Pure core runtime.
///
/// Owns only the expression evaluator; the tree is handed in per step so
/// the shell decides how it is shared with reloads.
pub struct CoreRuntime {
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl std::fmt::Debug for CoreRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreRuntime").finish_non_exhaustive()
    }
}

impl CoreRuntime {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Handle a single engine event, updating the tree and returning the
    /// resulting commands for the IO shell.
    pub fn step(&self, tree: &mut Tree, event: EngineEvent) -> CoreStep {
        match event {
            EngineEvent::NodeResult { instance, result } => {
                CoreStep::dispatch(self.apply_result(tree, instance, result))
            }
            EngineEvent::ReloadRequested { origin } => CoreStep {
                commands: vec![CoreCommand::Reload(origin)],
                keep_running: true,
            },
            EngineEvent::ReloadFinished { origin, outcome } => match outcome {
                Ok(report) => {
                    info!(origin = %origin, %report, "reload applied");
                    CoreStep::dispatch(self.settle(tree))
                }
                Err(e) => {
                    error!(origin = %origin, error = %e, "reload failed");
                    CoreStep::dispatch(Vec::new())
                }
            },
            EngineEvent::ShutdownRequested => CoreStep {
                commands: vec![CoreCommand::Dispatch(self.stop_all(tree))],
                keep_running: false,
            },
        }
    }

    /// Record a supervisor result and propagate it.
    ///
    /// Results for instances that are no longer in the tree (released by a
    /// pass while their run was in flight) are dropped.
    pub fn apply_result(
        &self,
        tree: &mut Tree,
        instance: InstanceId,
        result: NodeResult,
    ) -> Vec<SupervisorRequest> {
        let Some(key) = tree.key_of(instance) else {
            debug!(%instance, "result for a released node; ignoring");
            return Vec::new();
        };
        let mut out = Vec::new();
        self.propagate(tree, key, result, &mut out);
        out
    }

    /// Re-evaluate every branch whose cached value was invalidated, children
    /// before parents, and mirror connector targets.
    pub fn settle(&self, tree: &mut Tree) -> Vec<SupervisorRequest> {
        let mut out = Vec::new();

        for key in connectors(tree) {
            if let Some(value) = connector_source_value(tree, key)
                && tree.get(key).is_some_and(|n| n.last_result.is_none() || n.value() != value)
            {
                self.propagate(tree, key, NodeResult::new(value), &mut out);
            }
        }

        let mut order = tree.walk(tree.root());
        order.reverse();
        for key in order {
            let stale = tree
                .get(key)
                .is_some_and(|n| n.kind.is_branch() && n.cached_logic.is_none());
            if !stale {
                continue;
            }
            let value = self.evaluate_branch(tree, key);
            let Some(node) = tree.get_mut(key) else { continue };
            node.cached_logic = Some(value);
            if node.last_result.is_none() || node.value() != value {
                self.propagate(tree, key, NodeResult::new(value), &mut out);
            }
        }
        out
    }

    /// Stop requests for every executing node.
    pub fn stop_all(&self, tree: &Tree) -> Vec<SupervisorRequest> {
        tree.walk(tree.root())
            .into_iter()
            .filter_map(|k| NodeJob::for_node(tree, k))
            .map(|job| SupervisorRequest::Stop(job.instance))
            .collect()
    }

    fn propagate(
        &self,
        tree: &mut Tree,
        key: NodeKey,
        result: NodeResult,
        out: &mut Vec<SupervisorRequest>,
    ) {
        let mut work = VecDeque::from([(key, result)]);
        // A connector cycle would otherwise ping-pong forever.
        let mut budget = tree.len().saturating_mul(4).max(16);

        while let Some((key, result)) = work.pop_front() {
            if budget == 0 {
                warn!("result propagation did not converge; stopping");
                break;
            }
            budget -= 1;

            let changed = record(tree, key, result, out);
            if changed {
                let value = tree.get(key).map(|n| n.value()).unwrap_or_default();
                for conn in connectors_targeting(tree, key) {
                    work.push_back((conn, NodeResult::new(value)));
                }
            }
            if let Some(next) = self.reevaluate_ancestors(tree, key, changed) {
                work.push_back(next);
            }
        }
    }

    /// Climb from `key` while values change or caches are stale. Returns
    /// the first ancestor whose value changed, with its new result.
    fn reevaluate_ancestors(
        &self,
        tree: &mut Tree,
        key: NodeKey,
        mut changed: bool,
    ) -> Option<(NodeKey, NodeResult)> {
        let mut cur = key;
        loop {
            let parent = tree.get(cur)?.parent()?;
            let stale = tree.get(parent)?.cached_logic.is_none();
            if !changed && !stale {
                return None;
            }
            let value = self.evaluate_branch(tree, parent);
            let node = tree.get_mut(parent)?;
            node.cached_logic = Some(value);
            if node.last_result.is_none() || node.value() != value {
                return Some((parent, NodeResult::new(value)));
            }
            changed = false;
            cur = parent;
        }
    }

    /// Value of a branch: its expression over the children, or the Kleene
    /// AND of all children when it has none.
    pub fn evaluate_branch(&self, tree: &Tree, key: NodeKey) -> LogicalValue {
        let Some(node) = tree.get(key) else {
            return LogicalValue::Unknown;
        };
        let mut values = HashMap::new();
        let mut all = Vec::with_capacity(node.children().len());
        for child in node.children().iter().filter_map(|c| tree.get(*c)) {
            let value = child.cached_logic.unwrap_or_else(|| child.value());
            values.insert(child.name.clone(), value);
            values.insert(child.id.clone(), value);
            all.push(value);
        }

        match &node.config.expression {
            Some(expr) => match self.evaluator.evaluate(expr, &values) {
                Ok(v) => v,
                Err(e) => {
                    warn!(path = %tree.path_of(key), error = %e, "expression evaluation failed");
                    LogicalValue::Unknown
                }
            },
            None => kleene_all(&all),
        }
    }
}

fn kleene_all(values: &[LogicalValue]) -> LogicalValue {
    if values.contains(&LogicalValue::False) {
        LogicalValue::False
    } else if values.contains(&LogicalValue::Unknown) {
        LogicalValue::Unknown
    } else {
        LogicalValue::True
    }
}

/// Store `result` on `key` and queue what its events cause. Returns whether
/// the node's value changed.
fn record(
    tree: &mut Tree,
    key: NodeKey,
    result: NodeResult,
    out: &mut Vec<SupervisorRequest>,
) -> bool {
    let path = tree.path_of(key);
    let Some(node) = tree.get_mut(key) else {
        return false;
    };
    let had_result = node.last_result.is_some();
    let previous = node.value();
    let value = result.value;
    node.record_result(result.clone());
    if node.kind.is_branch() {
        node.cached_logic = Some(value);
    }
    let instance = node.instance();
    let name = node.name.clone();
    let id = node.id.clone();
    let logger = node.config.logger.clone();

    if let Some(logger) = logger {
        out.push(SupervisorRequest::Log {
            logger,
            path: path.clone(),
            result,
        });
    }

    let changed = !had_result || previous != value;
    let mut events = vec![value.event_name()];
    if had_result && previous != value {
        events.push(CHANGED_EVENT);
    }

    let source = NodeRef { path, instance };
    for event in events {
        let observed = ObservedEvent {
            event: event.to_string(),
            source: name.clone(),
            at: SystemTime::now(),
        };
        fire_triggers(&mut tree.globals, &source, &observed, out);
        run_workers(tree, key, &id, &source, &observed, out);
    }
    changed
}

fn fire_triggers(
    globals: &mut GlobalRegistries,
    source: &NodeRef,
    observed: &ObservedEvent,
    out: &mut Vec<SupervisorRequest>,
) {
    let GlobalRegistries {
        triggers, nodes, ..
    } = globals;
    for entry in triggers.listening_mut(&observed.event) {
        let resolves_here = nodes
            .resolve(&entry.source)
            .is_some_and(|r| r.instance == source.instance);
        if !resolves_here {
            continue;
        }
        debug!(
            node = %entry.node,
            source = %source,
            event = %observed.event,
            "trigger fired"
        );
        entry.last_event = Some(observed.clone());
        out.push(SupervisorRequest::Fire {
            instance: entry.node.instance,
            event: observed.clone(),
        });
    }
}

fn run_workers(
    tree: &mut Tree,
    key: NodeKey,
    id: &str,
    source: &NodeRef,
    observed: &ObservedEvent,
    out: &mut Vec<SupervisorRequest>,
) {
    let Some(home) = tree.owning_job(key) else { return };
    let Some(locals) = tree.get_mut(home).and_then(|n| n.locals_mut()) else {
        return;
    };
    for entry in locals.workers.for_event_mut(id, &observed.event) {
        if entry.node.instance != source.instance {
            continue;
        }
        entry.last_event = Some(observed.clone());
        out.push(SupervisorRequest::RunWorkers {
            node: entry.node.clone(),
            plugins: entry.plugins.clone(),
            event: observed.clone(),
        });
    }
}

fn connectors(tree: &Tree) -> Vec<NodeKey> {
    tree.walk(tree.root())
        .into_iter()
        .filter(|k| tree.get(*k).is_some_and(|n| n.kind == NodeKind::Connector))
        .collect()
}

/// Current value of the node a connector points at, if it resolves.
fn connector_source_value(tree: &Tree, connector: NodeKey) -> Option<LogicalValue> {
    let target = tree.get(connector)?.config.target.as_deref()?;
    let reference = tree.globals.nodes.resolve(target)?;
    let node = tree.get(tree.key_of(reference.instance)?)?;
    node.last_result.as_ref()?;
    Some(node.cached_logic.unwrap_or_else(|| node.value()))
}

fn connectors_targeting(tree: &Tree, key: NodeKey) -> Vec<NodeKey> {
    let Some(instance) = tree.get(key).map(|n| n.instance()) else {
        return Vec::new();
    };
    connectors(tree)
        .into_iter()
        .filter(|c| {
            tree.get(*c)
                .and_then(|n| n.config.target.as_deref())
                .and_then(|t| tree.globals.nodes.resolve(t))
                .is_some_and(|r| r.instance == instance)
        })
        .collect()
}
