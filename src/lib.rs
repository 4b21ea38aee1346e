// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod expr;
pub mod fs;
pub mod logging;
pub mod reconcile;
pub mod registry;
pub mod tree;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{JobLoader, TomlJobLoader};
use crate::engine::{CoreRuntime, Engine, EngineEvent, Runtime};
use crate::exec::{BuiltinPlugins, ChannelLifecycle, RealExecutorBackend};
use crate::expr::KleeneEvaluator;
use crate::reconcile::TracingSink;
use crate::tree::{dump, Tree};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - job document loading
/// - executor and node supervisors
/// - the engine and its runtime loop
/// - (optional) document watcher
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let job_path = PathBuf::from(&args.job);
    let loader: Arc<dyn JobLoader> = Arc::new(TomlJobLoader::default());
    let loaded = loader
        .load(&job_path, true, false)
        .with_context(|| format!("loading job document {}", job_path.display()))?;
    info!(
        name = %loaded.name,
        documents = loaded.documents.len(),
        "job documents loaded"
    );

    if args.dry_run {
        print_dry_run(loaded.tree)?;
        return Ok(());
    }

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<EngineEvent>(64);

    // Supervisors report through the runtime channel; the reconciler shares
    // the executor's request channel so starts stay ordered with dispatches.
    let executor = RealExecutorBackend::spawn(rt_tx.clone(), Arc::new(BuiltinPlugins));
    let lifecycle = Arc::new(ChannelLifecycle::new(executor.sender()));

    let root_document = std::fs::canonicalize(&job_path).unwrap_or(job_path);
    let settings = loaded.settings;
    let mut engine = Engine::new(loaded, root_document, Arc::clone(&loader), lifecycle)?;
    if settings.diagnostics {
        engine = engine.with_diagnostics(Arc::new(TracingSink));
    }

    let _watcher_handle = if settings.watch && !args.no_watch {
        Some(watch::spawn_watcher(Arc::clone(engine.tree()), rt_tx.clone()).await?)
    } else {
        None
    };

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(EngineEvent::ShutdownRequested).await;
        });
    }

    engine.start().await;

    let core = CoreRuntime::new(Arc::new(KleeneEvaluator));
    let runtime = Runtime::new(core, engine, rt_tx, rt_rx, executor);
    runtime.run().await?;
    Ok(())
}

/// Dry-run output: the anchored tree and its registries.
fn print_dry_run(job: Tree) -> Result<()> {
    let mut tree = Tree::anchored(job)?;
    let outcome = registry::merge::rebuild(&mut tree);

    println!("jobtree dry-run");
    println!();
    print!("{}", dump::render(&tree, tree.root()));
    for failure in &outcome.failures {
        println!("unresolved: {failure}");
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
