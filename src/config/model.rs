// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{JobTreeError, Result};
use crate::tree::{ModifierOp, PluginSpec};
use crate::types::{parse_duration, NodeKind};

/// One job document as read from TOML.
///
/// ```toml
/// [config]
/// settle_delay = "200ms"
///
/// [job]
/// name = "Root"
/// expression = "a & b"
///
/// [checker.disk]
/// plugin = "command"
/// args = { cmd = "test -d /tmp" }
///
/// [[node]]
/// id = "a"
/// checker = { plugin = "command", args = { cmd = "true" } }
/// trigger = { every = "10s" }
///
/// [[node]]
/// id = "sub"
/// kind = "job"
/// include = "sub.toml"
/// ```
///
/// Every section is optional. `[config]` is only honoured in the root
/// document.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct JobDocument {
    #[serde(default)]
    pub config: EngineSection,

    #[serde(default)]
    pub job: JobSection,

    /// Job-level checkers, referenced only by value modifiers.
    #[serde(default)]
    pub checker: BTreeMap<String, PluginSpec>,

    #[serde(default)]
    pub node: Vec<NodeSection>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Wait after a pass before refreshing dependent views.
    #[serde(default = "default_settle_delay")]
    pub settle_delay: String,

    /// Publish tree dumps during grafts.
    #[serde(default = "default_true")]
    pub diagnostics: bool,

    /// Reload when a loaded document changes on disk.
    #[serde(default = "default_true")]
    pub watch: bool,
}

fn default_settle_delay() -> String {
    "200ms".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            settle_delay: default_settle_delay(),
            diagnostics: true,
            watch: true,
        }
    }
}

/// Validated `[config]` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub settle_delay: Duration,
    pub diagnostics: bool,
    pub watch: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(200),
            diagnostics: true,
            watch: true,
        }
    }
}

impl TryFrom<&EngineSection> for EngineSettings {
    type Error = JobTreeError;

    fn try_from(section: &EngineSection) -> Result<Self> {
        let settle_delay = parse_duration(&section.settle_delay)
            .map_err(|e| JobTreeError::document(format!("[config].settle_delay: {e}")))?;
        Ok(Self {
            settle_delay,
            diagnostics: section.diagnostics,
            watch: section.watch,
        })
    }
}

/// `[job]` section: the job list the document defines.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct JobSection {
    /// Path segment of the top-level job; defaults to `main`. Included jobs
    /// take the id of the node that includes them.
    #[serde(default)]
    pub id: Option<String>,

    /// Logical name. Required for the root document; included documents
    /// fall back to their file stem.
    #[serde(default)]
    pub name: Option<String>,

    /// Expression over child names; all children AND-ed when absent.
    #[serde(default)]
    pub expression: Option<String>,

    #[serde(default)]
    pub trigger: Option<TriggerSection>,

    #[serde(default)]
    pub logger: Option<String>,

    #[serde(default)]
    pub workers: Vec<WorkerSection>,
}

/// `[[node]]` entry, possibly nested through `children`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSection {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_kind")]
    pub kind: NodeKind,

    #[serde(default)]
    pub expression: Option<String>,

    #[serde(default)]
    pub checker: Option<PluginSpec>,

    #[serde(default)]
    pub trigger: Option<TriggerSection>,

    #[serde(default)]
    pub logger: Option<String>,

    #[serde(default)]
    pub workers: Vec<WorkerSection>,

    /// Connector target, by node name.
    #[serde(default)]
    pub target: Option<String>,

    /// Constant or frozen snapshot value.
    #[serde(default)]
    pub value: Option<bool>,

    #[serde(default)]
    pub modifier: Option<ModifierSection>,

    /// Nested job document, relative to the including document.
    #[serde(default)]
    pub include: Option<String>,

    /// Checkers of an inline job list.
    #[serde(default)]
    pub checkers: BTreeMap<String, PluginSpec>,

    #[serde(default)]
    pub children: Vec<NodeSection>,
}

fn default_kind() -> NodeKind {
    NodeKind::SingleNode
}

/// `trigger = { every = "10s" }` or `trigger = { on = ["false"], source = "b" }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TriggerSection {
    Every { every: String },
    On { on: Vec<String>, source: String },
}

/// One worker invocation; consecutive entries with the same `on` set run in
/// document order.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    pub on: Vec<String>,
    pub plugin: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModifierSection {
    pub checker: String,
    pub op: ModifierOp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_document() {
        let doc: JobDocument = toml::from_str(
            r#"
            [config]
            settle_delay = "50ms"
            watch = false

            [job]
            name = "Root"
            expression = "a & b"

            [checker.disk]
            plugin = "command"
            args = { cmd = "test -d /tmp" }

            [[node]]
            id = "a"
            checker = { plugin = "command", args = { cmd = "true" } }
            trigger = { every = "10s" }
            workers = [{ on = ["false"], plugin = "command", args = { cmd = "echo down" } }]

            [[node]]
            id = "b"
            kind = "modifier"
            modifier = { checker = "disk", op = "unknown-as-false" }
            trigger = { on = ["false"], source = "a" }
            "#,
        )
        .unwrap();

        let settings = EngineSettings::try_from(&doc.config).unwrap();
        assert_eq!(settings.settle_delay, Duration::from_millis(50));
        assert!(!settings.watch && settings.diagnostics);
        assert_eq!(doc.job.name.as_deref(), Some("Root"));
        assert_eq!(doc.node.len(), 2);
        assert_eq!(doc.node[0].kind, NodeKind::SingleNode);
        assert!(matches!(doc.node[0].trigger, Some(TriggerSection::Every { .. })));
        assert!(matches!(doc.node[1].trigger, Some(TriggerSection::On { .. })));
        assert_eq!(doc.node[1].modifier.as_ref().unwrap().op, ModifierOp::UnknownAsFalse);
        assert_eq!(doc.checker["disk"].args["cmd"], "test -d /tmp");
    }

    #[test]
    fn bad_settle_delay_is_a_document_error() {
        let section = EngineSection {
            settle_delay: "soon".into(),
            ..EngineSection::default()
        };
        assert!(matches!(
            EngineSettings::try_from(&section),
            Err(JobTreeError::Document(_))
        ));
    }
}
