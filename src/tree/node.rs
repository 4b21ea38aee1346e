// src/tree/node.rs

//! Logical nodes and their configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use blake3::Hasher;
use serde::Deserialize;

use crate::registry::LocalRegistries;
use crate::tree::arena::NodeKey;
use crate::types::{EventSet, InstanceId, LogicalValue, NodeKind, NodeResult, ObservedEvent};

/// A plugin reference plus its arguments (checker, worker).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct PluginSpec {
    pub plugin: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl PluginSpec {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// What drives a node's runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSpec {
    /// Timer trigger.
    Every(Duration),
    /// Tree-event trigger: run when the node named `source` raises one of `events`.
    On { events: EventSet, source: String },
}

/// Workers run, in order, when their node raises one of `on`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub on: EventSet,
    pub plugins: Vec<PluginSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModifierOp {
    Invert,
    UnknownAsTrue,
    UnknownAsFalse,
}

impl ModifierOp {
    pub fn apply(self, value: LogicalValue) -> LogicalValue {
        match (self, value) {
            (ModifierOp::Invert, LogicalValue::True) => LogicalValue::False,
            (ModifierOp::Invert, LogicalValue::False) => LogicalValue::True,
            (ModifierOp::UnknownAsTrue, LogicalValue::Unknown) => LogicalValue::True,
            (ModifierOp::UnknownAsFalse, LogicalValue::Unknown) => LogicalValue::False,
            (_, v) => v,
        }
    }
}

/// A value modifier evaluates a job-level checker and rewrites its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierSpec {
    pub checker: String,
    pub op: ModifierOp,
}

/// Everything that makes two nodes "the same configuration".
///
/// Runtime state (results, timestamps, progress) lives on [`Node`], never here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeConfig {
    pub expression: Option<String>,
    pub checker: Option<PluginSpec>,
    pub trigger: Option<TriggerSpec>,
    pub logger: Option<String>,
    pub workers: Vec<WorkerSpec>,
    /// Connector target, by node name.
    pub target: Option<String>,
    /// Constant or frozen snapshot value.
    pub value: Option<LogicalValue>,
    pub modifier: Option<ModifierSpec>,
    /// Job-level checkers referenced only by value modifiers.
    pub checkers: BTreeMap<String, PluginSpec>,
}

/// blake3 digest of a node's kind, name and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn short_hex(&self) -> String {
        self.0[..6].iter().map(|b| format!("{b:02x}")).collect()
    }
}

struct FingerprintBuilder(Hasher);

impl FingerprintBuilder {
    fn str(&mut self, s: &str) -> &mut Self {
        self.0.update(&(s.len() as u64).to_le_bytes());
        self.0.update(s.as_bytes());
        self
    }

    fn opt(&mut self, s: Option<&str>) -> &mut Self {
        match s {
            Some(s) => self.str("some").str(s),
            None => self.str("none"),
        }
    }

    fn plugin(&mut self, spec: &PluginSpec) -> &mut Self {
        self.str(&spec.plugin);
        self.str(&spec.args.len().to_string());
        for (k, v) in &spec.args {
            self.str(k).str(v);
        }
        self
    }

    fn events(&mut self, events: &EventSet) -> &mut Self {
        let joined: Vec<&str> = events.iter().collect();
        self.str(&joined.join(","))
    }
}

impl NodeConfig {
    pub fn fingerprint(&self, kind: NodeKind, name: &str) -> Fingerprint {
        let mut fp = FingerprintBuilder(Hasher::new());
        fp.str(kind.as_str()).str(name);
        fp.opt(self.expression.as_deref());

        match &self.checker {
            Some(spec) => fp.str("checker").plugin(spec),
            None => fp.str("no-checker"),
        };

        match &self.trigger {
            Some(TriggerSpec::Every(d)) => fp.str("every").str(&d.as_millis().to_string()),
            Some(TriggerSpec::On { events, source }) => fp.str("on").events(events).str(source),
            None => fp.str("no-trigger"),
        };

        fp.opt(self.logger.as_deref());

        fp.str(&self.workers.len().to_string());
        for worker in &self.workers {
            fp.events(&worker.on);
            for plugin in &worker.plugins {
                fp.plugin(plugin);
            }
        }

        fp.opt(self.target.as_deref());
        fp.opt(self.value.map(|v| v.event_name()));

        match &self.modifier {
            Some(m) => fp.str("modifier").str(&m.checker).str(&format!("{:?}", m.op)),
            None => fp.str("no-modifier"),
        };

        fp.str(&self.checkers.len().to_string());
        for (name, spec) in &self.checkers {
            fp.str(name).plugin(spec);
        }

        Fingerprint(*fp.0.finalize().as_bytes())
    }
}

/// Run counters; carried over when a running child is spliced into a new parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub runs: u64,
    pub failures: u64,
}

/// Job-list specific state.
#[derive(Debug, Clone, Default)]
pub struct JobData {
    /// Document this job list was loaded from (root and included jobs).
    pub source: Option<PathBuf>,
    pub locals: LocalRegistries,
}

/// One node of the logical tree.
///
/// Not `Clone`: the instance id is the object's identity.
#[derive(Debug)]
pub struct Node {
    instance: InstanceId,
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub config: NodeConfig,

    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
    /// Nearest enclosing job list (never the node itself).
    pub(crate) job: Option<NodeKey>,
    pub(crate) tree_root: Option<NodeKey>,

    pub last_result: Option<NodeResult>,
    /// Last definite value this node produced.
    pub last_good: bool,
    pub progress: Progress,
    /// Trigger state carried across reloads.
    pub observed: Option<ObservedEvent>,
    /// Cached evaluation of a branch node; `None` when invalidated.
    pub cached_logic: Option<LogicalValue>,
    pub job_data: Option<JobData>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, config: NodeConfig) -> Self {
        let id = id.into();
        Self {
            instance: InstanceId::next(),
            name: id.clone(),
            id,
            kind,
            config,
            parent: None,
            children: Vec::new(),
            job: None,
            tree_root: None,
            last_result: None,
            last_good: false,
            progress: Progress::default(),
            observed: None,
            cached_logic: None,
            job_data: if kind == NodeKind::JobList {
                Some(JobData::default())
            } else {
                None
            },
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Constant stand-in for a child that is about to be spliced back.
    pub fn placeholder(id: impl Into<String>, name: impl Into<String>, last_good: bool) -> Self {
        let config = NodeConfig {
            value: Some(LogicalValue::from_bool(last_good)),
            ..NodeConfig::default()
        };
        let mut node = Node::new(id, NodeKind::Constant, config).with_name(name);
        node.last_good = last_good;
        node.last_result = Some(NodeResult::new(LogicalValue::from_bool(last_good)));
        node
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn job(&self) -> Option<NodeKey> {
        self.job
    }

    pub fn tree_root(&self) -> Option<NodeKey> {
        self.tree_root
    }

    pub fn is_job_list(&self) -> bool {
        self.kind == NodeKind::JobList
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.config.fingerprint(self.kind, &self.name)
    }

    /// Current value, `Unknown` if the node never produced one.
    pub fn value(&self) -> LogicalValue {
        self.last_result
            .as_ref()
            .map(|r| r.value)
            .unwrap_or(LogicalValue::Unknown)
    }

    /// Record a new result, keeping `last_good` and progress up to date.
    pub fn record_result(&mut self, result: NodeResult) {
        self.progress.runs += 1;
        match result.value.as_bool() {
            Some(b) => self.last_good = b,
            None => self.progress.failures += 1,
        }
        self.last_result = Some(result);
    }

    pub fn locals(&self) -> Option<&LocalRegistries> {
        self.job_data.as_ref().map(|d| &d.locals)
    }

    pub fn locals_mut(&mut self) -> Option<&mut LocalRegistries> {
        self.job_data.as_mut().map(|d| &mut d.locals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_runtime_state() {
        let cfg = NodeConfig {
            checker: Some(PluginSpec::new("command").arg("cmd", "true")),
            ..NodeConfig::default()
        };
        let mut a = Node::new("a", NodeKind::SingleNode, cfg.clone());
        let b = Node::new("a", NodeKind::SingleNode, cfg);
        a.record_result(NodeResult::new(LogicalValue::True));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.instance(), b.instance());
    }

    #[test]
    fn fingerprint_sees_argument_changes() {
        let a = NodeConfig {
            checker: Some(PluginSpec::new("command").arg("cmd", "true")),
            ..NodeConfig::default()
        };
        let b = NodeConfig {
            checker: Some(PluginSpec::new("command").arg("cmd", "false")),
            ..NodeConfig::default()
        };
        assert_ne!(
            a.fingerprint(NodeKind::SingleNode, "a"),
            b.fingerprint(NodeKind::SingleNode, "a")
        );
    }

    #[test]
    fn unknown_results_count_as_failures_and_keep_last_good() {
        let mut n = Node::new("a", NodeKind::SingleNode, NodeConfig::default());
        n.record_result(NodeResult::new(LogicalValue::True));
        n.record_result(NodeResult::new(LogicalValue::Unknown));
        assert!(n.last_good);
        assert_eq!(n.progress, Progress { runs: 2, failures: 1 });
    }

    #[test]
    fn modifiers_rewrite_values() {
        assert_eq!(ModifierOp::Invert.apply(LogicalValue::True), LogicalValue::False);
        assert_eq!(
            ModifierOp::UnknownAsFalse.apply(LogicalValue::Unknown),
            LogicalValue::False
        );
        assert_eq!(ModifierOp::UnknownAsTrue.apply(LogicalValue::False), LogicalValue::False);
    }
}
