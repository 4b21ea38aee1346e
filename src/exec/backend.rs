// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw channel, so
//! tests can swap in a backend that records requests (and answers with
//! synthetic results) while production uses [`RealExecutorBackend`], a thin
//! wrapper around the [`spawn_executor`] loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;

use crate::engine::EngineEvent;
use crate::errors::{JobTreeError, Result};
use crate::exec::plugins::PluginLoader;
use crate::exec::{spawn_executor, SupervisorRequest};

/// How supervisor requests produced by the runtime core are carried out.
pub trait ExecutorBackend: Send {
    fn dispatch(
        &mut self,
        requests: Vec<SupervisorRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production backend forwarding requests to the executor loop.
#[derive(Debug, Clone)]
pub struct RealExecutorBackend {
    tx: mpsc::UnboundedSender<SupervisorRequest>,
}

impl RealExecutorBackend {
    /// Spawn the executor loop and wrap its request channel.
    pub fn spawn(events_tx: mpsc::Sender<EngineEvent>, plugins: Arc<dyn PluginLoader>) -> Self {
        Self {
            tx: spawn_executor(events_tx, plugins),
        }
    }

    /// Sender shared with [`ChannelLifecycle`](crate::exec::ChannelLifecycle),
    /// so reconciliation starts and runtime dispatches stay ordered.
    pub fn sender(&self) -> mpsc::UnboundedSender<SupervisorRequest> {
        self.tx.clone()
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn dispatch(
        &mut self,
        requests: Vec<SupervisorRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            for request in requests {
                tx.send(request)
                    .map_err(|_| JobTreeError::Other(anyhow!("executor loop has shut down")))?;
            }
            Ok(())
        })
    }
}
