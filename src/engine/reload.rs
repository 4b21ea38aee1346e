// src/engine/reload.rs

//! Live reload entry point.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{EngineSettings, JobLoader, LoadedJob};
use crate::engine::views::{AlternativeViews, Coordinator, InlineCoordinator, NoViews, TreeSnapshot};
use crate::errors::{JobTreeError, Result};
use crate::reconcile::{ConcurrencyGate, DiagnosticSink, NodeLifecycle, ReconcileReport, Reconciler};
use crate::registry::merge::rebuild;
use crate::tree::{dump, NodeKey, NodePath, Tree};

/// Where a reload starting at some node actually applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadTarget {
    /// Active job list the candidate replaces.
    pub origin: NodePath,
    /// Document that job list was loaded from.
    pub document: PathBuf,
    /// The origin is the synthetic anchor; the candidate is anchored too.
    pub anchored: bool,
    /// The document is the root job document.
    pub root_job: bool,
}

/// Owns the live tree and everything a reload needs.
///
/// Cheap to clone; clones share the tree, the gate and the collaborators.
#[derive(Clone)]
pub struct Engine {
    tree: Arc<Mutex<Tree>>,
    gate: Arc<ConcurrencyGate>,
    loader: Arc<dyn JobLoader>,
    lifecycle: Arc<dyn NodeLifecycle>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    coordinator: Arc<dyn Coordinator>,
    views: Arc<dyn AlternativeViews>,
    settings: EngineSettings,
    root_document: PathBuf,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("root_document", &self.root_document)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Anchor a freshly loaded root job and build its registries.
    ///
    /// Nothing is started; call [`Engine::start`] once the executor runs.
    pub fn new(
        loaded: LoadedJob,
        root_document: impl Into<PathBuf>,
        loader: Arc<dyn JobLoader>,
        lifecycle: Arc<dyn NodeLifecycle>,
    ) -> Result<Self> {
        let mut tree = Tree::anchored(loaded.tree)?;
        let outcome = rebuild(&mut tree);
        for failure in &outcome.failures {
            tracing::warn!(%failure, "registry entry skipped at startup");
        }
        Ok(Self {
            tree: Arc::new(Mutex::new(tree)),
            gate: Arc::new(ConcurrencyGate::new()),
            loader,
            lifecycle,
            diagnostics: None,
            coordinator: Arc::new(InlineCoordinator),
            views: Arc::new(NoViews),
            settings: loaded.settings,
            root_document: root_document.into(),
        })
    }

    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn with_views(mut self, views: Arc<dyn AlternativeViews>) -> Self {
        self.views = views;
        self
    }

    pub fn with_coordinator(mut self, coordinator: Arc<dyn Coordinator>) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn tree(&self) -> &Arc<Mutex<Tree>> {
        &self.tree
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Start supervising every executing node of the live tree.
    pub async fn start(&self) {
        let tree = self.tree.lock().await;
        self.lifecycle.start(&tree, tree.root());
    }

    /// Snapshot of the live tree, taken with the gate held shared.
    pub async fn snapshot(&self) -> TreeSnapshot {
        let tree = self.tree.lock().await;
        let _read = self.gate.read();
        TreeSnapshot::capture(&tree)
    }

    /// Reload the job list owning `origin` from its document and reconcile
    /// the live tree with it.
    ///
    /// Document errors leave the live tree untouched. A consistency error
    /// aborts the pass; grafts it already applied stay in place.
    pub async fn reload(&self, origin: &NodePath) -> Result<ReconcileReport> {
        let target = {
            let tree = self.tree.lock().await;
            let key = tree
                .find(origin)
                .ok_or_else(|| JobTreeError::NodeNotFound(origin.to_string()))?;
            self.reload_target(&tree, key)?
        };
        info!(
            origin = %origin,
            job = %target.origin,
            document = %target.document.display(),
            "reloading job list"
        );

        let loader = Arc::clone(&self.loader);
        let document = target.document.clone();
        let root_job = target.root_job;
        let loaded = tokio::task::spawn_blocking(move || loader.load(&document, root_job, false))
            .await
            .map_err(|e| JobTreeError::Other(anyhow!("loader task failed: {e}")))??;

        let tree = Arc::clone(&self.tree);
        let gate = Arc::clone(&self.gate);
        let lifecycle = Arc::clone(&self.lifecycle);
        let diagnostics = self.diagnostics.clone();
        let job_path = target.origin.clone();
        let report = tokio::task::spawn_blocking(move || -> Result<ReconcileReport> {
            let mut active = tree.blocking_lock();
            // The tree may have changed while the document was loading.
            let origin = active
                .find(&job_path)
                .ok_or_else(|| JobTreeError::NodeNotFound(job_path.to_string()))?;
            let candidate = prepare_candidate(&active, origin, loaded, target.anchored)?;

            let reconciler = Reconciler::new(lifecycle.as_ref());
            let reconciler = match &diagnostics {
                Some(sink) => reconciler.with_diagnostics(sink.as_ref()),
                None => reconciler,
            };
            reconciler.run(&gate, &mut active, origin, candidate)
        })
        .await
        .map_err(|e| JobTreeError::Other(anyhow!("reconciliation task failed: {e}")))??;

        for failure in report.merge_failures() {
            tracing::warn!(%failure, "registry entry skipped");
        }

        tokio::time::sleep(self.settings.settle_delay).await;
        let snapshot = self.snapshot().await;
        debug!(dump = %snapshot.dump, "tree after reload");
        let views = Arc::clone(&self.views);
        self.coordinator
            .run(Box::new(move || views.refresh(&snapshot)));

        Ok(report)
    }

    /// Resolve the job list and document a reload at `key` applies to.
    ///
    /// Inline job lists have no document of their own; the nearest ancestor
    /// loaded from a document is reloaded instead.
    pub fn reload_target(&self, tree: &Tree, key: NodeKey) -> Result<ReloadTarget> {
        let mut candidates = Vec::new();
        candidates.extend(tree.owning_job(key));
        candidates.extend(tree.owning_job(key).map(|j| tree.job_ancestors(j)).unwrap_or_default());

        for job in candidates {
            let node = tree.node(job)?;
            if node.parent().is_none() {
                return Ok(ReloadTarget {
                    origin: tree.path_of(job),
                    document: self.root_document.clone(),
                    anchored: true,
                    root_job: true,
                });
            }
            if let Some(source) = node.job_data.as_ref().and_then(|d| d.source.as_ref()) {
                return Ok(ReloadTarget {
                    origin: tree.path_of(job),
                    document: source.clone(),
                    anchored: false,
                    root_job: same_document(source, &self.root_document),
                });
            }
        }
        Err(JobTreeError::NodeNotFound(format!(
            "no job document owns {}",
            tree.path_of(key)
        )))
    }
}

fn same_document(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Shape a loaded job so its root lines up with the active origin.
///
/// Nested jobs take the id (and, for included jobs, the name) of the node
/// that includes them; the root job keeps its own name.
fn prepare_candidate(
    active: &Tree,
    origin: NodeKey,
    loaded: LoadedJob,
    anchored: bool,
) -> Result<Tree> {
    if anchored {
        return Tree::anchored(loaded.tree);
    }
    let mut candidate = loaded.tree;
    let active_root = active.node(origin)?;
    let is_top_job = active_root
        .parent()
        .and_then(|p| active.get(p))
        .is_some_and(|p| p.parent().is_none());

    let root = candidate.root();
    let node = candidate.node_mut(root)?;
    node.id = active_root.id.clone();
    if !is_top_job {
        node.name = active_root.name.clone();
    }
    debug!(
        job = %active.path_of(origin),
        candidate = %dump::render(&candidate, root),
        "candidate prepared"
    );
    Ok(candidate)
}
