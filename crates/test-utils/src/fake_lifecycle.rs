use std::sync::Mutex;

use jobtree::reconcile::NodeLifecycle;
use jobtree::tree::{NodeKey, NodePath, Tree};
use jobtree::types::{InstanceId, ObservedEvent};

/// Records every lifecycle call, in order.
#[derive(Debug, Default)]
pub struct RecordingLifecycle {
    started: Mutex<Vec<(NodePath, InstanceId)>>,
    stopped: Mutex<Vec<InstanceId>>,
    primed: Mutex<Vec<(InstanceId, ObservedEvent)>>,
}

impl RecordingLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node of every started subtree.
    pub fn started(&self) -> Vec<(NodePath, InstanceId)> {
        self.started.lock().unwrap().clone()
    }

    pub fn started_paths(&self) -> Vec<String> {
        self.started().into_iter().map(|(p, _)| p.to_string()).collect()
    }

    pub fn stopped(&self) -> Vec<InstanceId> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn primed(&self) -> Vec<(InstanceId, ObservedEvent)> {
        self.primed.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.started.lock().unwrap().clear();
        self.stopped.lock().unwrap().clear();
        self.primed.lock().unwrap().clear();
    }
}

impl NodeLifecycle for RecordingLifecycle {
    fn start(&self, tree: &Tree, key: NodeKey) {
        let mut started = self.started.lock().unwrap();
        for k in tree.walk(key) {
            if let Some(node) = tree.get(k) {
                started.push((tree.path_of(k), node.instance()));
            }
        }
    }

    fn stop(&self, instance: InstanceId) {
        self.stopped.lock().unwrap().push(instance);
    }

    fn prime(&self, instance: InstanceId, event: &ObservedEvent) {
        self.primed.lock().unwrap().push((instance, event.clone()));
    }
}
