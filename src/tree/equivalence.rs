// src/tree/equivalence.rs

//! Content equivalence between nodes of two (possibly different) trees.
//!
//! - *Equivalent* (shallow): same kind, same configuration fingerprint and
//!   the same ordered child ids. This is what the differ tests before
//!   recursing; it guarantees equal child counts below an equivalent pair.
//! - *Branch-equal* (deep): equivalent at the node and at every descendant.
//!   The grafter uses it to salvage running children.

use crate::tree::{NodeKey, Tree};

pub fn equivalent(a_tree: &Tree, a: NodeKey, c_tree: &Tree, c: NodeKey) -> bool {
    let (Some(an), Some(cn)) = (a_tree.get(a), c_tree.get(c)) else {
        return false;
    };

    if an.kind != cn.kind || an.id != cn.id {
        return false;
    }
    if an.fingerprint() != cn.fingerprint() {
        return false;
    }
    if an.children().len() != cn.children().len() {
        return false;
    }

    an.children()
        .iter()
        .zip(cn.children().iter())
        .all(|(ak, ck)| match (a_tree.get(*ak), c_tree.get(*ck)) {
            (Some(x), Some(y)) => x.id == y.id,
            _ => false,
        })
}

pub fn branch_equal(a_tree: &Tree, a: NodeKey, c_tree: &Tree, c: NodeKey) -> bool {
    if !equivalent(a_tree, a, c_tree, c) {
        return false;
    }
    let (Some(an), Some(cn)) = (a_tree.get(a), c_tree.get(c)) else {
        return false;
    };
    an.children()
        .iter()
        .zip(cn.children().iter())
        .all(|(ak, ck)| branch_equal(a_tree, *ak, c_tree, *ck))
}
