// src/exec/supervisor.rs

//! Per-node supervisor loop.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, trace};

use crate::engine::EngineEvent;
use crate::exec::plugins::{CheckContext, Checker, PluginFuture};
use crate::exec::NodeJob;
use crate::tree::{ModifierOp, TriggerSpec};
use crate::types::{NodeResult, ObservedEvent};

/// Inputs a supervisor accepts besides cancellation.
#[derive(Debug, Clone)]
pub enum Signal {
    /// Run now because `event` fired the node's trigger.
    Fire(ObservedEvent),
    /// Remember `event` as the last one seen, without running.
    Prime(ObservedEvent),
}

/// Applies a value modifier's operation to a job-level checker.
pub(crate) struct ModifiedChecker {
    pub inner: Arc<dyn Checker>,
    pub op: ModifierOp,
}

impl Checker for ModifiedChecker {
    fn check<'a>(&'a self, ctx: &'a CheckContext) -> PluginFuture<'a, NodeResult> {
        Box::pin(async move {
            let mut result = self.inner.check(ctx).await;
            result.value = self.op.apply(result.value);
            result
        })
    }
}

/// Drive one node until cancelled.
///
/// - Without a trigger the node runs once at start.
/// - `Every` runs at start and then on each tick.
/// - `On` runs only when fired.
///
/// Every finished run is reported as [`EngineEvent::NodeResult`]. A run in
/// progress is abandoned (and its child process killed) on cancel.
pub async fn supervise(
    job: NodeJob,
    checker: Arc<dyn Checker>,
    events_tx: mpsc::Sender<EngineEvent>,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let mut ticker = match &job.trigger {
        Some(TriggerSpec::Every(period)) => {
            let mut t = interval(*period);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(t)
        }
        _ => None,
    };

    let mut ctx = CheckContext {
        path: job.path.clone(),
        event: None,
    };
    // The first interval tick completes immediately, so timer nodes start
    // through the select below.
    let mut run_now = job.trigger.is_none();

    loop {
        if run_now {
            run_now = false;
            let result = tokio::select! {
                _ = &mut cancel_rx => break,
                result = checker.check(&ctx) => result,
            };
            trace!(path = %job.path, value = %result.value, "node run finished");
            let event = EngineEvent::NodeResult {
                instance: job.instance,
                result,
            };
            if events_tx.send(event).await.is_err() {
                debug!(path = %job.path, "engine gone; supervisor exiting");
                break;
            }
        }

        tokio::select! {
            _ = &mut cancel_rx => break,
            _ = next_tick(&mut ticker) => run_now = true,
            signal = signals.recv() => match signal {
                Some(Signal::Fire(event)) => {
                    ctx.event = Some(event);
                    run_now = true;
                }
                Some(Signal::Prime(event)) => ctx.event = Some(event),
                None => break,
            },
        }
    }

    debug!(path = %job.path, instance = %job.instance, "supervisor stopped");
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}
