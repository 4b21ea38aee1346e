// src/tree/dump.rs

//! Human-readable tree dumps for diagnostics and `--dry-run`.

use std::fmt::Write;

use crate::tree::{NodeKey, Tree};

/// Render the subtree at `key`: one line per node (indent, id, path, kind,
/// instance, value, fingerprint), followed by the registries.
pub fn render(tree: &Tree, key: NodeKey) -> String {
    let mut out = String::new();
    render_node(tree, key, 0, &mut out);
    render_registries(tree, &mut out);
    out
}

fn render_node(tree: &Tree, key: NodeKey, depth: usize, out: &mut String) {
    let Some(node) = tree.get(key) else { return };
    let _ = write!(
        out,
        "{:indent$}{} [{}] {} {} value={} fp={}",
        "",
        node.id,
        tree.path_of(key),
        node.kind,
        node.instance(),
        node.value(),
        node.fingerprint().short_hex(),
        indent = depth * 2
    );
    if node.name != node.id {
        let _ = write!(out, " name={}", node.name);
    }
    if let Some(expr) = &node.config.expression {
        let _ = write!(out, " expr=\"{expr}\"");
    }
    out.push('\n');

    for child in node.children() {
        render_node(tree, *child, depth + 1, out);
    }
}

fn render_registries(tree: &Tree, out: &mut String) {
    let g = &tree.globals;
    let _ = writeln!(out, "registries:");
    let _ = writeln!(out, "  nodes: {} by id, {} by name", g.nodes.len(), g.nodes.by_name.len());

    for (events, entry) in g.triggers.iter() {
        let _ = writeln!(out, "  trigger {} on {} <- {}", entry.node, events, entry.source);
    }
    for entry in g.connectors.iter() {
        let _ = writeln!(out, "  unresolved connector {} -> {}", entry.node, entry.target);
    }

    for job in tree.job_lists() {
        let Some(locals) = tree.get(job).and_then(|n| n.locals()) else {
            continue;
        };
        if locals.is_empty() {
            continue;
        }
        let path = tree.path_of(job);
        for entry in locals.workers.iter() {
            let plugins: Vec<&str> = entry.plugins.iter().map(|p| p.plugin.as_str()).collect();
            let _ = writeln!(out, "  [{path}] worker {} -> {}", entry.node, plugins.join(","));
        }
        for entry in locals.modifier_checkers.iter() {
            let _ = writeln!(out, "  [{path}] modifier {} uses {}", entry.node, entry.checker);
        }
    }
}
