// src/exec/plugins.rs

//! Checker, worker and logger plugins.
//!
//! The engine never names a concrete plugin: supervisors ask a
//! [`PluginLoader`] for an implementation matching a [`PluginSpec`].
//! [`BuiltinPlugins`] is the loader used by the binary:
//!
//! | kind    | plugin     | args                    |
//! |---------|------------|-------------------------|
//! | checker | `command`  | `cmd`                   |
//! | checker | `constant` | `value` (true/false/unknown) |
//! | worker  | `command`  | `cmd`                   |
//! | logger  | `tracing`  |                         |
//!
//! Command plugins see `JOBTREE_NODE` (the node path) and, when an event
//! drove the run, `JOBTREE_EVENT` in their environment.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{JobTreeError, Result};
use crate::exec::command::run_shell;
use crate::tree::{NodePath, PluginSpec};
use crate::types::{LogicalValue, NodeResult, ObservedEvent};

pub type PluginFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a checker run knows about its node.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub path: NodePath,
    /// Event that fired this run, or the last one the node was primed with.
    pub event: Option<ObservedEvent>,
}

impl CheckContext {
    fn env(&self) -> Vec<(&'static str, String)> {
        let mut envs = vec![("JOBTREE_NODE", self.path.to_string())];
        if let Some(ev) = &self.event {
            envs.push(("JOBTREE_EVENT", ev.event.clone()));
        }
        envs
    }
}

/// Produces a node's value. Failures are reported as `Unknown` results, never
/// as errors.
pub trait Checker: Send + Sync {
    fn check<'a>(&'a self, ctx: &'a CheckContext) -> PluginFuture<'a, NodeResult>;
}

/// Side effect run when a node raises an event.
pub trait Worker: Send + Sync {
    fn run<'a>(&'a self, ctx: &'a CheckContext) -> PluginFuture<'a, Result<()>>;
}

/// Receives every result of the nodes configured with it.
pub trait Logger: Send + Sync {
    fn log(&self, path: &NodePath, result: &NodeResult);
}

/// Resolves plugin references to implementations.
pub trait PluginLoader: Send + Sync + fmt::Debug {
    fn checker(&self, spec: &PluginSpec) -> Result<Arc<dyn Checker>>;
    fn worker(&self, spec: &PluginSpec) -> Result<Arc<dyn Worker>>;
    fn logger(&self, name: &str) -> Result<Arc<dyn Logger>>;
}

/// Plugins shipped with the crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinPlugins;

fn required_arg<'a>(spec: &'a PluginSpec, key: &str) -> Result<&'a str> {
    spec.args.get(key).map(String::as_str).ok_or_else(|| {
        JobTreeError::Plugin(format!("plugin '{}' requires argument '{key}'", spec.plugin))
    })
}

impl PluginLoader for BuiltinPlugins {
    fn checker(&self, spec: &PluginSpec) -> Result<Arc<dyn Checker>> {
        match spec.plugin.as_str() {
            "command" => Ok(Arc::new(CommandChecker {
                cmd: required_arg(spec, "cmd")?.to_string(),
            })),
            "constant" => {
                let value = required_arg(spec, "value")?
                    .parse::<LogicalValue>()
                    .map_err(JobTreeError::Plugin)?;
                Ok(Arc::new(ConstantChecker(value)))
            }
            other => Err(JobTreeError::Plugin(format!("unknown checker plugin '{other}'"))),
        }
    }

    fn worker(&self, spec: &PluginSpec) -> Result<Arc<dyn Worker>> {
        match spec.plugin.as_str() {
            "command" => Ok(Arc::new(CommandWorker {
                cmd: required_arg(spec, "cmd")?.to_string(),
            })),
            other => Err(JobTreeError::Plugin(format!("unknown worker plugin '{other}'"))),
        }
    }

    fn logger(&self, name: &str) -> Result<Arc<dyn Logger>> {
        match name {
            "tracing" => Ok(Arc::new(TracingLogger)),
            other => Err(JobTreeError::Plugin(format!("unknown logger '{other}'"))),
        }
    }
}

/// Exit status 0 is `True`, any other status `False`. A command that cannot
/// be spawned, or is killed by a signal, is `Unknown`.
#[derive(Debug)]
struct CommandChecker {
    cmd: String,
}

impl Checker for CommandChecker {
    fn check<'a>(&'a self, ctx: &'a CheckContext) -> PluginFuture<'a, NodeResult> {
        Box::pin(async move {
            let envs = ctx.env();
            match run_shell(&self.cmd, &envs).await {
                Ok(out) => {
                    let value = match out.status.code() {
                        Some(0) => LogicalValue::True,
                        Some(_) => LogicalValue::False,
                        None => LogicalValue::Unknown,
                    };
                    match out.last_line {
                        Some(line) => NodeResult::with_detail(value, line),
                        None => NodeResult::new(value),
                    }
                }
                Err(e) => {
                    debug!(path = %ctx.path, error = %e, "command checker failed to run");
                    NodeResult::with_detail(LogicalValue::Unknown, format!("{e:#}"))
                }
            }
        })
    }
}

#[derive(Debug)]
struct ConstantChecker(LogicalValue);

impl Checker for ConstantChecker {
    fn check<'a>(&'a self, _ctx: &'a CheckContext) -> PluginFuture<'a, NodeResult> {
        let value = self.0;
        Box::pin(async move { NodeResult::new(value) })
    }
}

#[derive(Debug)]
struct CommandWorker {
    cmd: String,
}

impl Worker for CommandWorker {
    fn run<'a>(&'a self, ctx: &'a CheckContext) -> PluginFuture<'a, Result<()>> {
        Box::pin(async move {
            let envs = ctx.env();
            let out = run_shell(&self.cmd, &envs).await?;
            if out.status.success() {
                Ok(())
            } else {
                Err(JobTreeError::Plugin(format!(
                    "worker '{}' exited with {}",
                    self.cmd, out.status
                )))
            }
        })
    }
}

#[derive(Debug)]
struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, path: &NodePath, result: &NodeResult) {
        info!(
            path = %path,
            value = %result.value,
            detail = result.detail.as_deref().unwrap_or(""),
            "node result"
        );
    }
}
