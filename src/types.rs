// src/types.rs

//! Small value types shared by the tree, the registries and the runtime.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use serde::Deserialize;

/// Tri-state logical value produced by checks and expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogicalValue {
    True,
    False,
    #[default]
    Unknown,
}

impl LogicalValue {
    pub fn from_bool(b: bool) -> Self {
        if b { LogicalValue::True } else { LogicalValue::False }
    }

    /// `Some(bool)` for a definite value, `None` for `Unknown`.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            LogicalValue::True => Some(true),
            LogicalValue::False => Some(false),
            LogicalValue::Unknown => None,
        }
    }

    /// Event name emitted when a node settles on this value.
    pub fn event_name(self) -> &'static str {
        match self {
            LogicalValue::True => "true",
            LogicalValue::False => "false",
            LogicalValue::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LogicalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Last result of a node: value, free-form detail and when it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResult {
    pub value: LogicalValue,
    pub detail: Option<String>,
    pub at: SystemTime,
}

impl NodeResult {
    pub fn new(value: LogicalValue) -> Self {
        Self {
            value,
            detail: None,
            at: SystemTime::now(),
        }
    }

    pub fn with_detail(value: LogicalValue, detail: impl Into<String>) -> Self {
        Self {
            value,
            detail: Some(detail.into()),
            at: SystemTime::now(),
        }
    }
}

/// Node kinds of the logical tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[serde(rename = "job")]
    JobList,
    #[serde(rename = "list")]
    NodeList,
    #[serde(rename = "single")]
    SingleNode,
    Snapshot,
    Connector,
    Constant,
    #[serde(rename = "modifier")]
    ValueModifier,
}

impl NodeKind {
    /// Branch kinds own an ordered list of children.
    pub fn is_branch(self) -> bool {
        matches!(self, NodeKind::JobList | NodeKind::NodeList)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::JobList => "job",
            NodeKind::NodeList => "list",
            NodeKind::SingleNode => "single",
            NodeKind::Snapshot => "snapshot",
            NodeKind::Connector => "connector",
            NodeKind::Constant => "constant",
            NodeKind::ValueModifier => "modifier",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Identity of a node object for its whole lifetime.
///
/// Survives moves between arenas; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn next() -> Self {
        InstanceId(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered set of event names a trigger or worker reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EventSet(BTreeSet<String>);

impl EventSet {
    pub fn new<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EventSet(events.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, event: &str) -> bool {
        self.0.contains(event)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }
}

impl fmt::Display for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "{{{}}}", names.join(","))
    }
}

/// An event seen by a trigger: which event, raised by whom, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedEvent {
    pub event: String,
    pub source: String,
    pub at: SystemTime,
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

impl FromStr for LogicalValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" => Ok(LogicalValue::True),
            "false" => Ok(LogicalValue::False),
            "unknown" => Ok(LogicalValue::Unknown),
            other => Err(format!(
                "invalid logical value: {other} (expected \"true\", \"false\" or \"unknown\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_parse_with_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn event_sets_are_order_insensitive() {
        assert_eq!(EventSet::new(["false", "true"]), EventSet::new(["true", "false"]));
        assert_eq!(EventSet::new(["b", "a"]).to_string(), "{a,b}");
    }

    #[test]
    fn instance_ids_are_unique() {
        let a = InstanceId::next();
        let b = InstanceId::next();
        assert_ne!(a, b);
    }
}
