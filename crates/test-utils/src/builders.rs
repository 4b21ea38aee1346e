#![allow(dead_code)]

use std::sync::Arc;

use jobtree::config::TomlJobLoader;
use jobtree::fs::mock::MockFileSystem;
use jobtree::tree::{Node, NodeConfig, NodeKey, PluginSpec, Tree, TriggerSpec};
use jobtree::types::{EventSet, LogicalValue, NodeKind, NodeResult};

/// Fluent builder for job trees.
///
/// Branch methods (`list`, `job`) open a scope that `end` closes; leaf
/// methods add to the innermost open scope.
///
/// ```ignore
/// let tree = TreeBuilder::job("main")
///     .expression("a & b")
///     .single("a")
///     .single("b")
///     .build();
/// ```
pub struct TreeBuilder {
    tree: Tree,
    open: Vec<NodeKey>,
}

fn checked(value: &str) -> NodeConfig {
    NodeConfig {
        checker: Some(PluginSpec::new("constant").arg("value", value)),
        ..NodeConfig::default()
    }
}

impl TreeBuilder {
    /// Start a tree whose root is the job list `id`.
    pub fn job(id: &str) -> Self {
        let tree = Tree::new(Node::new(id, NodeKind::JobList, NodeConfig::default()));
        let root = tree.root();
        Self {
            tree,
            open: vec![root],
        }
    }

    fn current(&self) -> NodeKey {
        *self.open.last().expect("builder scope underflow")
    }

    /// Set the expression of the innermost open branch.
    pub fn expression(mut self, expr: &str) -> Self {
        let key = self.current();
        self.tree.get_mut(key).expect("open branch").config.expression = Some(expr.into());
        self
    }

    /// Rename the innermost open branch.
    pub fn named(mut self, name: &str) -> Self {
        let key = self.current();
        self.tree.get_mut(key).expect("open branch").name = name.into();
        self
    }

    /// Add an arbitrary node to the innermost open scope.
    pub fn node(mut self, node: Node) -> Self {
        let parent = self.current();
        self.tree.add_child(parent, node).expect("add child");
        self
    }

    /// Single node whose constant checker reports `true`.
    pub fn single(self, id: &str) -> Self {
        self.node(Node::new(id, NodeKind::SingleNode, checked("true")))
    }

    /// Single node whose constant checker reports `value`.
    pub fn single_reporting(self, id: &str, value: &str) -> Self {
        self.node(Node::new(id, NodeKind::SingleNode, checked(value)))
    }

    /// Single node run whenever `source` raises one of `events`.
    pub fn triggered(self, id: &str, source: &str, events: &[&str]) -> Self {
        let mut config = checked("true");
        config.trigger = Some(TriggerSpec::On {
            events: EventSet::new(events.iter().copied()),
            source: source.into(),
        });
        self.node(Node::new(id, NodeKind::SingleNode, config))
    }

    pub fn connector(self, id: &str, target: &str) -> Self {
        let config = NodeConfig {
            target: Some(target.into()),
            ..NodeConfig::default()
        };
        self.node(Node::new(id, NodeKind::Connector, config))
    }

    pub fn constant(self, id: &str, value: bool) -> Self {
        let value = LogicalValue::from_bool(value);
        let config = NodeConfig {
            value: Some(value),
            ..NodeConfig::default()
        };
        let mut node = Node::new(id, NodeKind::Constant, config);
        node.record_result(NodeResult::new(value));
        node.progress = Default::default();
        self.node(node)
    }

    /// Open a node list.
    pub fn list(self, id: &str) -> Self {
        self.open_branch(Node::new(id, NodeKind::NodeList, NodeConfig::default()))
    }

    /// Open a nested job list.
    pub fn sub_job(self, id: &str) -> Self {
        self.open_branch(Node::new(id, NodeKind::JobList, NodeConfig::default()))
    }

    fn open_branch(mut self, node: Node) -> Self {
        let parent = self.current();
        let key = self.tree.add_child(parent, node).expect("add branch");
        self.open.push(key);
        self
    }

    /// Close the innermost open branch.
    pub fn end(mut self) -> Self {
        assert!(self.open.len() > 1, "cannot close the root");
        self.open.pop();
        self
    }

    pub fn build(self) -> Tree {
        self.tree
    }
}

/// A TOML loader over an in-memory set of documents.
pub fn loader_for(files: &[(&str, &str)]) -> (Arc<MockFileSystem>, TomlJobLoader) {
    let fs = Arc::new(MockFileSystem::new());
    for (path, content) in files {
        fs.add_file(path, *content);
    }
    let loader = TomlJobLoader::new(fs.clone());
    (fs, loader)
}
