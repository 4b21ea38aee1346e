// src/exec/lifecycle.rs

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::exec::{NodeJob, SupervisorRequest};
use crate::reconcile::NodeLifecycle;
use crate::tree::{NodeKey, Tree};
use crate::types::{InstanceId, ObservedEvent};

/// [`NodeLifecycle`] that turns the reconciler's hooks into executor
/// requests. Sends never block, so it is safe inside a pass.
#[derive(Debug, Clone)]
pub struct ChannelLifecycle {
    tx: mpsc::UnboundedSender<SupervisorRequest>,
}

impl ChannelLifecycle {
    pub fn new(tx: mpsc::UnboundedSender<SupervisorRequest>) -> Self {
        Self { tx }
    }

    fn send(&self, request: SupervisorRequest) {
        if self.tx.send(request).is_err() {
            warn!("executor loop has shut down; dropping lifecycle request");
        }
    }
}

impl NodeLifecycle for ChannelLifecycle {
    fn start(&self, tree: &Tree, key: NodeKey) {
        for k in tree.walk(key) {
            if let Some(job) = NodeJob::for_node(tree, k) {
                debug!(path = %job.path, instance = %job.instance, "requesting start");
                self.send(SupervisorRequest::Start(job));
            }
        }
    }

    fn stop(&self, instance: InstanceId) {
        self.send(SupervisorRequest::Stop(instance));
    }

    fn prime(&self, instance: InstanceId, event: &ObservedEvent) {
        self.send(SupervisorRequest::Prime {
            instance,
            event: event.clone(),
        });
    }
}
