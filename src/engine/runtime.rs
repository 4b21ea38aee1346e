// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::{ExecutorBackend, SupervisorRequest};
use crate::tree::NodePath;

use super::core::CoreRuntime;
use super::reload::Engine;
use super::{CoreCommand, EngineEvent};

/// Drives result propagation in response to `EngineEvent`s, spawns reloads,
/// and delegates supervisor requests to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels, locking the live tree and dispatching requests.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    engine: Engine,
    event_tx: mpsc::Sender<EngineEvent>,
    event_rx: mpsc::Receiver<EngineEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    /// `event_tx` must feed `event_rx`; reload tasks report back through it.
    pub fn new(
        core: CoreRuntime,
        engine: Engine,
        event_tx: mpsc::Sender<EngineEvent>,
        event_rx: mpsc::Receiver<EngineEvent>,
        executor: E,
    ) -> Self {
        Self {
            core,
            engine,
            event_tx,
            event_rx,
            executor,
        }
    }

    /// Main event loop.
    ///
    /// - Settles values frozen at load time.
    /// - Consumes `EngineEvent`s from `event_rx`.
    /// - Feeds them into the core runtime under the tree lock.
    /// - Executes commands returned by the core (dispatch, reload).
    pub async fn run(mut self) -> Result<()> {
        info!("jobtree runtime started");

        let initial = {
            let mut tree = self.engine.tree().lock().await;
            self.core.settle(&mut tree)
        };
        self.dispatch(initial).await?;

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = {
                let mut tree = self.engine.tree().lock().await;
                self.core.step(&mut tree, event)
            };

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Dispatch(requests) => self.dispatch(requests).await?,
            CoreCommand::Reload(origin) => self.spawn_reload(origin),
        }
        Ok(())
    }

    async fn dispatch(&mut self, requests: Vec<SupervisorRequest>) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }
        debug!(count = requests.len(), "dispatching supervisor requests");
        self.executor.dispatch(requests).await
    }

    /// Reloads run concurrently with the loop; passes serialize on the tree
    /// lock.
    fn spawn_reload(&self, origin: NodePath) {
        let engine = self.engine.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let outcome = engine.reload(&origin).await.map_err(|e| e.to_string());
            if tx
                .send(EngineEvent::ReloadFinished { origin, outcome })
                .await
                .is_err()
            {
                warn!("runtime gone before reload finished");
            }
        });
    }
}
