use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tracing::debug;

use jobtree::engine::EngineEvent;
use jobtree::errors::Result;
use jobtree::exec::{ExecutorBackend, SupervisorRequest};
use jobtree::types::{LogicalValue, NodeResult};

/// A fake executor that:
/// - records every request it is asked to carry out
/// - answers each `Fire` with a `NodeResult` of `fire_value`.
pub struct FakeExecutor {
    runtime_tx: tokio::sync::mpsc::Sender<EngineEvent>,
    requests: Arc<Mutex<Vec<SupervisorRequest>>>,
    fire_value: LogicalValue,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: tokio::sync::mpsc::Sender<EngineEvent>,
        requests: Arc<Mutex<Vec<SupervisorRequest>>>,
    ) -> Self {
        Self {
            runtime_tx,
            requests,
            fire_value: LogicalValue::True,
        }
    }

    pub fn answering(mut self, value: LogicalValue) -> Self {
        self.fire_value = value;
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(
        &mut self,
        requests: Vec<SupervisorRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let recorded = Arc::clone(&self.requests);
        let value = self.fire_value;

        Box::pin(async move {
            debug!(count = requests.len(), "fake executor received requests");
            for request in requests {
                recorded.lock().unwrap().push(request.clone());

                if let SupervisorRequest::Fire { instance, .. } = request {
                    // The runtime may be the one awaiting this dispatch, so
                    // never block on a full channel here.
                    tx.try_send(EngineEvent::NodeResult {
                        instance,
                        result: NodeResult::new(value),
                    })
                    .map_err(|e| anyhow::anyhow!("fake executor could not answer a fire: {e}"))?;
                }
            }
            Ok(())
        })
    }
}
