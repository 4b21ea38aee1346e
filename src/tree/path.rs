// src/tree/path.rs

//! Structural paths: the root-to-node id sequence joined by `/`.

use std::fmt;
use std::str::FromStr;

/// Root-to-node id sequence. Case-sensitive.
///
/// Paths are derived from the parent chain on demand; nodes never store
/// their own path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodePath(Vec<String>);

impl NodePath {
    pub fn root(id: impl Into<String>) -> Self {
        NodePath(vec![id.into()])
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NodePath(segments.into_iter().map(Into::into).collect())
    }

    pub fn child(&self, id: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(id.to_string());
        NodePath(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(NodePath(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Last id of the path (the node's own id).
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(|s| s.as_str())
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `self` equals `prefix` or lies below it.
    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Prepend `prefix` to this path.
    pub fn rebased(&self, prefix: &NodePath) -> Self {
        let mut segments = prefix.0.clone();
        segments.extend(self.0.iter().cloned());
        NodePath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl FromStr for NodePath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty node path".to_string());
        }
        let segments: Vec<String> = s.split('/').map(|p| p.to_string()).collect();
        if segments.iter().any(|p| p.is_empty()) {
            return Err(format!("node path '{s}' contains an empty segment"));
        }
        Ok(NodePath(segments))
    }
}
