// src/exec/executor_loop.rs

//! Executor loop owning every node supervisor.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::engine::EngineEvent;
use crate::errors::Result;
use crate::exec::plugins::{CheckContext, Checker, PluginLoader};
use crate::exec::supervisor::{supervise, ModifiedChecker, Signal};
use crate::exec::{NodeJob, Probe, SupervisorRequest};
use crate::registry::NodeRef;
use crate::tree::{NodePath, PluginSpec};
use crate::types::{InstanceId, LogicalValue, NodeResult, ObservedEvent};

/// Handle of a running supervisor.
///
/// - `cancel` asks the supervisor to stop (dropping it has the same effect).
/// - `signals` carries fires and primes.
/// - `handle` is the Tokio task running [`supervise`].
struct ActiveNode {
    path: NodePath,
    cancel: Option<oneshot::Sender<()>>,
    signals: mpsc::UnboundedSender<Signal>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// The returned sender never blocks, so it can be fed from the synchronous
/// reconciliation pass. **Per instance there is never more than one
/// supervisor**: starting an instance that is already supervised cancels the
/// previous supervisor first.
pub fn spawn_executor(
    events_tx: mpsc::Sender<EngineEvent>,
    plugins: Arc<dyn PluginLoader>,
) -> mpsc::UnboundedSender<SupervisorRequest> {
    let (tx, mut rx) = mpsc::unbounded_channel::<SupervisorRequest>();

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<InstanceId, ActiveNode> = HashMap::new();

        while let Some(request) = rx.recv().await {
            active.retain(|_, node| !node.handle.is_finished());
            handle_request(request, &mut active, &events_tx, plugins.as_ref());
        }

        for (_, node) in active.drain() {
            cancel(node);
        }
        info!("executor loop finished (channel closed)");
    });

    tx
}

fn handle_request(
    request: SupervisorRequest,
    active: &mut HashMap<InstanceId, ActiveNode>,
    events_tx: &mpsc::Sender<EngineEvent>,
    plugins: &dyn PluginLoader,
) {
    match request {
        SupervisorRequest::Start(job) => start(job, active, events_tx, plugins),
        SupervisorRequest::Stop(instance) => match active.remove(&instance) {
            Some(node) => cancel(node),
            None => debug!(%instance, "stop requested for a node without supervisor"),
        },
        SupervisorRequest::Fire { instance, event } => {
            signal(active, instance, Signal::Fire(event));
        }
        SupervisorRequest::Prime { instance, event } => {
            signal(active, instance, Signal::Prime(event));
        }
        SupervisorRequest::RunWorkers {
            node,
            plugins: specs,
            event,
        } => run_workers(node, specs, event, plugins),
        SupervisorRequest::Log {
            logger,
            path,
            result,
        } => match plugins.logger(&logger) {
            Ok(l) => l.log(&path, &result),
            Err(e) => warn!(path = %path, error = %e, "logger unavailable"),
        },
    }
}

fn start(
    job: NodeJob,
    active: &mut HashMap<InstanceId, ActiveNode>,
    events_tx: &mpsc::Sender<EngineEvent>,
    plugins: &dyn PluginLoader,
) {
    if let Some(previous) = active.remove(&job.instance) {
        debug!(path = %previous.path, "restart requested; cancelling previous supervisor");
        cancel(previous);
    }

    let checker: Arc<dyn Checker> = match resolve_probe(&job.probe, plugins) {
        Ok(c) => c,
        Err(e) => {
            // Reported like any failed run; the node stays Unknown.
            warn!(path = %job.path, error = %e, "node failed to start");
            let event = EngineEvent::NodeResult {
                instance: job.instance,
                result: NodeResult::with_detail(LogicalValue::Unknown, e.to_string()),
            };
            let tx = events_tx.clone();
            tokio::spawn(async move {
                if tx.send(event).await.is_err() {
                    debug!(path = %job.path, "runtime gone before start failure was reported");
                }
            });
            return;
        }
    };

    debug!(path = %job.path, instance = %job.instance, "starting supervisor");
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let (signals_tx, signals_rx) = mpsc::unbounded_channel();
    let instance = job.instance;
    let path = job.path.clone();
    let handle = tokio::spawn(supervise(
        job,
        checker,
        events_tx.clone(),
        signals_rx,
        cancel_rx,
    ));

    active.insert(
        instance,
        ActiveNode {
            path,
            cancel: Some(cancel_tx),
            signals: signals_tx,
            handle,
        },
    );
}

fn resolve_probe(probe: &Probe, plugins: &dyn PluginLoader) -> Result<Arc<dyn Checker>> {
    match probe {
        Probe::Checker(spec) => plugins.checker(spec),
        Probe::Modified { checker, op } => Ok(Arc::new(ModifiedChecker {
            inner: plugins.checker(checker)?,
            op: *op,
        })),
    }
}

fn signal(active: &HashMap<InstanceId, ActiveNode>, instance: InstanceId, signal: Signal) {
    match active.get(&instance) {
        Some(node) => {
            if node.signals.send(signal).is_err() {
                debug!(path = %node.path, "supervisor already finished");
            }
        }
        None => debug!(%instance, ?signal, "signal for a node without supervisor"),
    }
}

fn cancel(mut node: ActiveNode) {
    debug!(path = %node.path, "cancelling supervisor");
    if let Some(cancel) = node.cancel.take() {
        if cancel.send(()).is_err() {
            debug!(path = %node.path, "supervisor already finished while cancelling");
        }
    }
}

/// Run `specs` in order on a separate task; a failing worker does not stop
/// the ones after it.
fn run_workers(
    node: NodeRef,
    specs: Vec<PluginSpec>,
    event: ObservedEvent,
    plugins: &dyn PluginLoader,
) {
    let workers: Vec<_> = specs
        .iter()
        .filter_map(|spec| match plugins.worker(spec) {
            Ok(w) => Some((spec.plugin.clone(), w)),
            Err(e) => {
                warn!(node = %node, error = %e, "worker unavailable");
                None
            }
        })
        .collect();
    if workers.is_empty() {
        return;
    }

    tokio::spawn(async move {
        let ctx = CheckContext {
            path: node.path.clone(),
            event: Some(event),
        };
        for (name, worker) in workers {
            if let Err(e) = worker.run(&ctx).await {
                warn!(node = %node, worker = %name, error = %e, "worker failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::exec::plugins::BuiltinPlugins;
    use crate::tree::TriggerSpec;

    fn constant_job(value: &str, trigger: Option<TriggerSpec>) -> NodeJob {
        NodeJob {
            instance: InstanceId::next(),
            path: "root/main/a".parse().unwrap(),
            probe: Probe::Checker(PluginSpec::new("constant").arg("value", value)),
            trigger,
        }
    }

    #[tokio::test]
    async fn started_nodes_report_results() {
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let tx = spawn_executor(events_tx, Arc::new(BuiltinPlugins));
        let job = constant_job("true", None);
        let instance = job.instance;
        tx.send(SupervisorRequest::Start(job)).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .unwrap();
        match event {
            Some(EngineEvent::NodeResult { instance: got, result }) => {
                assert_eq!(got, instance);
                assert_eq!(result.value, LogicalValue::True);
            }
            other => panic!("unexpected {other:?}"),
        }
        tx.send(SupervisorRequest::Stop(instance)).unwrap();
    }

    #[tokio::test]
    async fn unknown_plugins_report_unknown() {
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let tx = spawn_executor(events_tx, Arc::new(BuiltinPlugins));
        let mut job = constant_job("true", None);
        job.probe = Probe::Checker(PluginSpec::new("nope"));
        tx.send(SupervisorRequest::Start(job)).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .unwrap();
        match event {
            Some(EngineEvent::NodeResult { result, .. }) => {
                assert_eq!(result.value, LogicalValue::Unknown);
                assert!(result.detail.unwrap().contains("nope"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_failures_wait_for_room_in_the_runtime_channel() {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        events_tx
            .send(EngineEvent::ShutdownRequested)
            .await
            .unwrap();
        let tx = spawn_executor(events_tx, Arc::new(BuiltinPlugins));
        let mut job = constant_job("true", None);
        job.probe = Probe::Checker(PluginSpec::new("nope"));
        let instance = job.instance;
        tx.send(SupervisorRequest::Start(job)).unwrap();

        // Give the executor time to hit the full channel.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(events_rx.recv().await, Some(EngineEvent::ShutdownRequested)));

        let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .unwrap();
        match event {
            Some(EngineEvent::NodeResult { instance: got, result }) => {
                assert_eq!(got, instance);
                assert_eq!(result.value, LogicalValue::Unknown);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
