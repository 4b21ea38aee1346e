// src/watch/watcher.rs

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::engine::EngineEvent;
use crate::fs::{FileSystem, RealFileSystem};
use crate::tree::Tree;
use crate::watch::event_handler::{document_dirs, loaded_documents, process_document_change};
use crate::watch::hash::DocumentHashes;

/// Handle for the document watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive for
/// as long as needed. Dropping this handle will stop document watching.
pub struct WatcherHandle {
    _inner: Arc<StdMutex<RecommendedWatcher>>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Spawn a watcher over the directories of every document the live tree was
/// loaded from, sending `EngineEvent::ReloadRequested` when one changes.
///
/// Directories of documents added by later reloads (new includes) are picked
/// up after each processed change.
pub async fn spawn_watcher(
    tree: Arc<Mutex<Tree>>,
    runtime_tx: mpsc::Sender<EngineEvent>,
) -> Result<WatcherHandle> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    // Called synchronously by notify on its own thread.
    let watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    warn!("failed to forward notify event: {err}");
                }
            }
            Err(err) => warn!("document watch error: {err}"),
        },
        Config::default(),
    )?;
    let watcher = Arc::new(StdMutex::new(watcher));

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let documents = loaded_documents(&*tree.lock().await);
    let mut hashes = DocumentHashes::new();
    hashes.seed(fs.as_ref(), &documents);
    let mut watched = BTreeSet::new();
    watch_new_dirs(&watcher, &mut watched, document_dirs(&documents))?;
    info!(dirs = watched.len(), documents = documents.len(), "document watcher started");

    let async_watcher = Arc::clone(&watcher);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                continue;
            }
            debug!(?event, "received notify event");

            for path in &event.paths {
                process_document_change(fs.as_ref(), path, &tree, &mut hashes, &runtime_tx).await;
            }

            let documents = loaded_documents(&*tree.lock().await);
            let fresh: Vec<&PathBuf> = documents
                .iter()
                .filter(|d| !hashes.contains(d))
                .collect();
            hashes.seed(fs.as_ref(), fresh);
            if let Err(e) = watch_new_dirs(&async_watcher, &mut watched, document_dirs(&documents)) {
                warn!(error = %e, "could not watch new document directories");
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}

fn watch_new_dirs(
    watcher: &StdMutex<RecommendedWatcher>,
    watched: &mut BTreeSet<PathBuf>,
    dirs: BTreeSet<PathBuf>,
) -> Result<()> {
    let mut watcher = watcher.lock().unwrap_or_else(|e| e.into_inner());
    for dir in dirs {
        if watched.contains(&dir) {
            continue;
        }
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!(dir = %dir.display(), "watching document directory");
        watched.insert(dir);
    }
    Ok(())
}
