// src/tree/mod.rs

//! Arena-backed logical tree.
//!
//! - [`arena`] is the generation-checked slot storage.
//! - [`node`] holds node data and configuration fingerprints.
//! - [`path`] defines structural paths.
//! - [`index`] is the per-pass path -> node indexer.
//! - [`equivalence`] decides whether two nodes (or branches) are the same.
//! - [`dump`] renders human-readable diagnostic dumps.
//!
//! Parent/child links, and the cached `job` / `tree_root` back-references,
//! are plain [`NodeKey`]s into the owning tree's arena. Detach and attach are
//! key rewrites; moving a subtree into another tree re-inserts every node and
//! leaves tombstones behind.

pub mod arena;
pub mod dump;
pub mod equivalence;
pub mod index;
pub mod node;
pub mod path;

use std::collections::HashMap;

pub use arena::NodeKey;
pub use index::PathIndex;
pub use node::{
    Fingerprint, JobData, ModifierOp, ModifierSpec, Node, NodeConfig, PluginSpec, Progress,
    TriggerSpec, WorkerSpec,
};
pub use path::NodePath;

use crate::errors::{JobTreeError, Result};
use crate::registry::GlobalRegistries;
use crate::types::{InstanceId, NodeKind};
use arena::Arena;

/// Id of the synthetic anchor job list at the top of every live tree.
pub const ROOT_ID: &str = "root";

#[derive(Debug)]
pub struct Tree {
    arena: Arena<Node>,
    root: NodeKey,
    instances: HashMap<InstanceId, NodeKey>,
    pub globals: GlobalRegistries,
}

impl Tree {
    /// Create a tree containing only `root`.
    pub fn new(root: Node) -> Self {
        let mut arena = Arena::new();
        let instance = root.instance();
        let key = arena.insert(root);
        if let Some(n) = arena.get_mut(key) {
            n.tree_root = Some(key);
        }

        let mut instances = HashMap::new();
        instances.insert(instance, key);

        Self {
            arena,
            root: key,
            instances,
            globals: GlobalRegistries::default(),
        }
    }

    /// Wrap a loaded job tree under the synthetic `root` anchor.
    pub fn anchored(mut job: Tree) -> Result<Tree> {
        let anchor = Node::new(ROOT_ID, NodeKind::JobList, NodeConfig::default());
        let mut tree = Tree::new(anchor);
        let job_root = job.root;
        let moved = tree.move_subtree_from(&mut job, job_root)?;
        let root = tree.root;
        tree.attach(root, 0, moved)?;
        Ok(tree)
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.arena.contains(key)
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.arena.get(key)
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.arena.get_mut(key)
    }

    pub fn node(&self, key: NodeKey) -> Result<&Node> {
        self.arena
            .get(key)
            .ok_or_else(|| JobTreeError::NodeNotFound(format!("key {key}")))
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Result<&mut Node> {
        self.arena
            .get_mut(key)
            .ok_or_else(|| JobTreeError::NodeNotFound(format!("key {key}")))
    }

    /// Resolve a node object by identity.
    pub fn key_of(&self, instance: InstanceId) -> Option<NodeKey> {
        self.instances.get(&instance).copied()
    }

    fn insert(&mut self, node: Node) -> NodeKey {
        let instance = node.instance();
        let key = self.arena.insert(node);
        self.instances.insert(instance, key);
        key
    }

    fn take(&mut self, key: NodeKey) -> Option<Node> {
        let node = self.arena.remove(key)?;
        self.instances.remove(&node.instance());
        Some(node)
    }

    /// Insert `node` without linking it anywhere.
    pub fn insert_detached(&mut self, node: Node) -> NodeKey {
        self.insert(node)
    }

    /// Insert `node` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeKey, node: Node) -> Result<NodeKey> {
        let len = self.node(parent)?.children.len();
        let key = self.insert(node);
        self.attach(parent, len, key)?;
        Ok(key)
    }

    /// Derive the structural path of `key` from its parent chain.
    ///
    /// For a detached node this is the path relative to its detached root.
    pub fn path_of(&self, key: NodeKey) -> NodePath {
        let mut segments = Vec::new();
        let mut cur = Some(key);
        while let Some(k) = cur {
            match self.arena.get(k) {
                Some(n) => {
                    segments.push(n.id.clone());
                    cur = n.parent;
                }
                None => break,
            }
        }
        segments.reverse();
        NodePath::from_segments(segments)
    }

    /// Depth-first, pre-order list of `key` and its descendants.
    pub fn walk(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            if let Some(n) = self.arena.get(k) {
                out.push(k);
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }

    /// The job list that owns `key`'s registries: the node itself if it is
    /// a job list, else its nearest enclosing one.
    pub fn owning_job(&self, key: NodeKey) -> Option<NodeKey> {
        let node = self.arena.get(key)?;
        if node.is_job_list() {
            Some(key)
        } else {
            node.job
        }
    }

    /// Job-list ancestors of `key`, nearest first, ending at the tree root.
    pub fn job_ancestors(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut cur = self.arena.get(key).and_then(|n| n.parent);
        while let Some(k) = cur {
            match self.arena.get(k) {
                Some(n) => {
                    if n.is_job_list() {
                        out.push(k);
                    }
                    cur = n.parent;
                }
                None => break,
            }
        }
        out
    }

    pub fn find_child_by_id(&self, parent: NodeKey, id: &str) -> Option<(usize, NodeKey)> {
        let p = self.arena.get(parent)?;
        p.children
            .iter()
            .enumerate()
            .find(|(_, k)| self.arena.get(**k).is_some_and(|n| n.id == id))
            .map(|(i, k)| (i, *k))
    }

    /// Unlink `key` from its parent. The node stays in the arena.
    ///
    /// Returns the index it occupied, or `None` if it had no parent.
    pub fn detach(&mut self, key: NodeKey) -> Option<usize> {
        let parent = self.arena.get(key)?.parent?;
        let index = {
            let p = self.arena.get_mut(parent)?;
            let index = p.children.iter().position(|c| *c == key)?;
            p.children.remove(index);
            index
        };
        if let Some(n) = self.arena.get_mut(key) {
            n.parent = None;
        }
        Some(index)
    }

    /// Link a detached node under `parent` at `index` (clamped) and rewrite
    /// the back-references of its whole subtree.
    pub fn attach(&mut self, parent: NodeKey, index: usize, key: NodeKey) -> Result<()> {
        if self.node(key)?.parent.is_some() {
            return Err(JobTreeError::Other(anyhow::anyhow!(
                "node {} is still attached",
                self.path_of(key)
            )));
        }
        let p = self.node_mut(parent)?;
        let index = index.min(p.children.len());
        p.children.insert(index, key);
        self.node_mut(key)?.parent = Some(parent);
        self.rehome(key);
        Ok(())
    }

    /// Put `key` (detached) at `index` of `parent` in place of the current
    /// child, which is detached and returned.
    pub fn replace_child(&mut self, parent: NodeKey, index: usize, key: NodeKey) -> Result<NodeKey> {
        let old = {
            let p = self.node_mut(parent)?;
            let slot = p.children.get_mut(index).ok_or_else(|| {
                JobTreeError::NodeNotFound(format!("child index {index} of key {parent}"))
            })?;
            std::mem::replace(slot, key)
        };
        if let Some(n) = self.arena.get_mut(old) {
            n.parent = None;
        }
        self.node_mut(key)?.parent = Some(parent);
        self.rehome(key);
        Ok(old)
    }

    /// Recompute `job` and `tree_root` for `key` and its descendants from
    /// their parents.
    pub fn rehome(&mut self, key: NodeKey) {
        for k in self.walk(key) {
            let parent = self.arena.get(k).and_then(|n| n.parent);
            let (job, tree_root) = match parent.and_then(|p| self.arena.get(p).map(|n| (p, n))) {
                Some((p, pn)) => {
                    let job = if pn.is_job_list() { Some(p) } else { pn.job };
                    (job, pn.tree_root)
                }
                None => (None, Some(k)),
            };
            if let Some(n) = self.arena.get_mut(k) {
                n.job = job;
                n.tree_root = tree_root;
            }
        }
    }

    /// Move the subtree rooted at `src` out of `other` into this tree.
    ///
    /// The moved root comes back detached; node identities are preserved.
    pub fn move_subtree_from(&mut self, other: &mut Tree, src: NodeKey) -> Result<NodeKey> {
        other.detach(src);
        let mut node = other
            .take(src)
            .ok_or_else(|| JobTreeError::NodeNotFound(format!("candidate key {src}")))?;
        let old_children = std::mem::take(&mut node.children);
        node.parent = None;
        let key = self.insert(node);

        for child in old_children {
            let moved = self.move_subtree_from(other, child)?;
            self.node_mut(moved)?.parent = Some(key);
            self.node_mut(key)?.children.push(moved);
        }
        Ok(key)
    }

    /// Drop `key` and its descendants from the arena, unlinking it first.
    ///
    /// Returns the instances released, in pre-order.
    pub fn remove_subtree(&mut self, key: NodeKey) -> Vec<InstanceId> {
        self.detach(key);
        let mut released = Vec::new();
        for k in self.walk(key) {
            if let Some(node) = self.take(k) {
                released.push(node.instance());
            }
        }
        released
    }

    /// Clear the cached logical state of `key` and of every ancestor.
    pub fn invalidate(&mut self, key: NodeKey) {
        let mut cur = Some(key);
        while let Some(k) = cur {
            match self.arena.get_mut(k) {
                Some(n) => {
                    n.cached_logic = None;
                    cur = n.parent;
                }
                None => break,
            }
        }
    }

    /// Resolve a path by walking children ids from the root.
    pub fn find(&self, path: &NodePath) -> Option<NodeKey> {
        let mut segments = path.segments().iter();
        let first = segments.next()?;
        let root = self.arena.get(self.root)?;
        if &root.id != first {
            return None;
        }
        let mut cur = self.root;
        for id in segments {
            cur = self.find_child_by_id(cur, id)?.1;
        }
        Some(cur)
    }

    /// All job lists reachable from the root, pre-order.
    pub fn job_lists(&self) -> Vec<NodeKey> {
        self.walk(self.root)
            .into_iter()
            .filter(|k| self.arena.get(*k).is_some_and(|n| n.is_job_list()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str) -> Node {
        Node::new(id, NodeKind::SingleNode, NodeConfig::default())
    }

    fn job(id: &str) -> Node {
        Node::new(id, NodeKind::JobList, NodeConfig::default())
    }

    #[test]
    fn paths_are_derived_from_parents() {
        let mut tree = Tree::new(job("main"));
        let root = tree.root();
        let list = tree
            .add_child(root, Node::new("l", NodeKind::NodeList, NodeConfig::default()))
            .unwrap();
        let a = tree.add_child(list, leaf("a")).unwrap();

        assert_eq!(tree.path_of(a).to_string(), "main/l/a");
        assert_eq!(tree.node(a).unwrap().job(), Some(root));
        assert_eq!(tree.find(&"main/l/a".parse().unwrap()), Some(a));
    }

    #[test]
    fn anchoring_prefixes_every_path_with_root() {
        let mut job_tree = Tree::new(job("main"));
        let r = job_tree.root();
        job_tree.add_child(r, leaf("a")).unwrap();

        let tree = Tree::anchored(job_tree).unwrap();
        let paths: Vec<String> = tree
            .walk(tree.root())
            .into_iter()
            .map(|k| tree.path_of(k).to_string())
            .collect();
        assert_eq!(paths, vec!["root", "root/main", "root/main/a"]);
    }

    #[test]
    fn moving_a_subtree_keeps_identity_and_leaves_tombstones() {
        let mut src = Tree::new(job("cand"));
        let r = src.root();
        let sub = src.add_child(r, job("sub")).unwrap();
        let a = src.add_child(sub, leaf("a")).unwrap();
        let a_instance = src.node(a).unwrap().instance();

        let mut dst = Tree::new(job("live"));
        let moved = dst.move_subtree_from(&mut src, sub).unwrap();
        let dst_root = dst.root();
        dst.attach(dst_root, 0, moved).unwrap();

        assert!(!src.contains(sub));
        assert!(src.node(r).unwrap().children().is_empty());
        let new_a = dst.key_of(a_instance).unwrap();
        assert_eq!(dst.path_of(new_a).to_string(), "live/sub/a");
        assert_eq!(dst.node(new_a).unwrap().job(), Some(moved));
        assert_eq!(dst.node(new_a).unwrap().tree_root(), Some(dst_root));
    }

    #[test]
    fn detach_and_replace_rewrite_links() {
        let mut tree = Tree::new(job("main"));
        let root = tree.root();
        let a = tree.add_child(root, leaf("a")).unwrap();
        let b = tree.add_child(root, leaf("b")).unwrap();

        assert_eq!(tree.detach(a), Some(0));
        assert_eq!(tree.node(root).unwrap().children(), &[b]);
        tree.attach(root, 5, a).unwrap();
        assert_eq!(tree.node(root).unwrap().children(), &[b, a]);

        let c = tree.add_child(root, leaf("c")).unwrap();
        tree.detach(c);
        let old = tree.replace_child(root, 0, c).unwrap();
        assert_eq!(old, b);
        assert_eq!(tree.node(b).unwrap().parent(), None);
        assert_eq!(tree.path_of(c).to_string(), "main/c");
    }

    #[test]
    fn remove_subtree_releases_all_instances() {
        let mut tree = Tree::new(job("main"));
        let root = tree.root();
        let sub = tree.add_child(root, job("sub")).unwrap();
        tree.add_child(sub, leaf("a")).unwrap();
        tree.add_child(sub, leaf("b")).unwrap();

        let released = tree.remove_subtree(sub);
        assert_eq!(released.len(), 3);
        assert_eq!(tree.len(), 1);
        assert!(tree.node(root).unwrap().children().is_empty());
    }
}
