// src/config/validate.rs

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{JobTreeError, Result};
use crate::expr::{referenced_names, KleeneEvaluator};
use crate::tree::{NodeKey, Tree};
use crate::types::NodeKind;

/// Reject include cycles.
///
/// Edge direction: including document -> included document.
pub fn validate_include_graph(edges: &[(PathBuf, PathBuf)]) -> Result<()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for (from, to) in edges {
        let (Some(from), Some(to)) = (from.to_str(), to.to_str()) else {
            return Err(JobTreeError::document(format!(
                "non UTF-8 document path {}",
                from.display()
            )));
        };
        graph.add_edge(from, to, ());
    }

    // A topological sort fails on any cycle, including self-includes.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(JobTreeError::document(format!(
            "include cycle detected involving document '{}'",
            cycle.node_id()
        ))),
    }
}

/// Check the invariants the reconciler relies on, over a freshly built tree.
pub fn validate_tree(tree: &Tree) -> Result<()> {
    validate_ids(tree)?;
    validate_expressions(tree)?;
    validate_modifiers(tree)?;
    Ok(())
}

/// Ids are non-empty, contain no `/`, and are unique within their job list.
fn validate_ids(tree: &Tree) -> Result<()> {
    let mut seen: HashMap<Option<NodeKey>, HashSet<&str>> = HashMap::new();

    for key in tree.walk(tree.root()) {
        let Some(node) = tree.get(key) else { continue };
        if node.id.is_empty() || node.id.contains('/') {
            return Err(JobTreeError::document(format!(
                "invalid node id '{}' under {}",
                node.id,
                tree.path_of(key).parent().map(|p| p.to_string()).unwrap_or_default()
            )));
        }
        if node.parent().is_none() {
            continue;
        }
        if !seen.entry(node.job()).or_default().insert(node.id.as_str()) {
            return Err(JobTreeError::document(format!(
                "duplicate node id '{}' in job list {}",
                node.id,
                node.job().map(|j| tree.path_of(j).to_string()).unwrap_or_default()
            )));
        }
    }
    Ok(())
}

/// Expressions parse, and every name they use is a child of the node.
fn validate_expressions(tree: &Tree) -> Result<()> {
    let evaluator = KleeneEvaluator;

    for key in tree.walk(tree.root()) {
        let Some(node) = tree.get(key) else { continue };
        let Some(expr) = &node.config.expression else { continue };

        if !node.kind.is_branch() {
            return Err(JobTreeError::document(format!(
                "{}: kind '{}' cannot have an expression",
                tree.path_of(key),
                node.kind
            )));
        }
        evaluator
            .check(expr)
            .map_err(|e| JobTreeError::document(format!("{}: {e}", tree.path_of(key))))?;

        let children: HashSet<&str> = node
            .children()
            .iter()
            .filter_map(|c| tree.get(*c))
            .flat_map(|c| [c.id.as_str(), c.name.as_str()])
            .collect();
        for name in referenced_names(expr) {
            if !children.contains(name.as_str()) {
                return Err(JobTreeError::document(format!(
                    "{}: expression refers to unknown child '{name}'",
                    tree.path_of(key)
                )));
            }
        }
    }
    Ok(())
}

/// Value modifiers name a checker declared by their job list.
fn validate_modifiers(tree: &Tree) -> Result<()> {
    for key in tree.walk(tree.root()) {
        let Some(node) = tree.get(key) else { continue };
        if node.kind != NodeKind::ValueModifier {
            continue;
        }
        let Some(modifier) = &node.config.modifier else { continue };
        let declared = node
            .job()
            .and_then(|j| tree.get(j))
            .is_some_and(|j| j.config.checkers.contains_key(&modifier.checker));
        if !declared {
            return Err(JobTreeError::document(format!(
                "{}: checker '{}' is not declared in [checker]",
                tree.path_of(key),
                modifier.checker
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Node, NodeConfig};

    fn job(expr: Option<&str>) -> Tree {
        let cfg = NodeConfig {
            expression: expr.map(str::to_string),
            ..NodeConfig::default()
        };
        Tree::new(Node::new("main", NodeKind::JobList, cfg))
    }

    fn leaf(id: &str) -> Node {
        Node::new(id, NodeKind::SingleNode, NodeConfig::default())
    }

    #[test]
    fn duplicate_ids_in_one_job_list_are_rejected() {
        let mut tree = job(None);
        let root = tree.root();
        let list = tree
            .add_child(root, Node::new("l", NodeKind::NodeList, NodeConfig::default()))
            .unwrap();
        tree.add_child(root, leaf("a")).unwrap();
        tree.add_child(list, leaf("a")).unwrap();

        let err = validate_tree(&tree).unwrap_err();
        assert!(err.to_string().contains("duplicate node id 'a'"), "{err}");
    }

    #[test]
    fn same_id_in_different_job_lists_is_fine() {
        let mut tree = job(None);
        let root = tree.root();
        let sub = tree
            .add_child(root, Node::new("sub", NodeKind::JobList, NodeConfig::default()))
            .unwrap();
        tree.add_child(root, leaf("a")).unwrap();
        tree.add_child(sub, leaf("a")).unwrap();

        validate_tree(&tree).unwrap();
    }

    #[test]
    fn expressions_must_reference_children() {
        let mut tree = job(Some("a & ghost"));
        let root = tree.root();
        tree.add_child(root, leaf("a")).unwrap();

        let err = validate_tree(&tree).unwrap_err();
        assert!(err.to_string().contains("ghost"), "{err}");
    }

    #[test]
    fn include_cycles_fail_toposort() {
        let a = PathBuf::from("/a.toml");
        let b = PathBuf::from("/b.toml");
        assert!(validate_include_graph(&[(a.clone(), b.clone())]).is_ok());
        assert!(validate_include_graph(&[(a.clone(), b.clone()), (b, a)]).is_err());
    }
}
