// src/watch/event_handler.rs

//! Turning document changes into reload requests.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::engine::EngineEvent;
use crate::fs::FileSystem;
use crate::tree::{NodePath, Tree};
use crate::watch::hash::{compute_document_hash, DocumentHashes};

/// Every document a job list of the live tree was loaded from.
pub fn loaded_documents(tree: &Tree) -> BTreeSet<PathBuf> {
    tree.job_lists()
        .into_iter()
        .filter_map(|k| tree.get(k)?.job_data.as_ref()?.source.clone())
        .collect()
}

/// Directories to watch for `documents`.
pub fn document_dirs<'a>(documents: impl IntoIterator<Item = &'a PathBuf>) -> BTreeSet<PathBuf> {
    documents
        .into_iter()
        .filter_map(|d| d.parent().map(Path::to_path_buf))
        .collect()
}

/// Job lists defined by `document`, outermost first.
///
/// A document included twice defines two job lists. When a job list and one
/// of its ancestors come from the same document only the ancestor is
/// returned, since its reload covers the nested one.
pub fn jobs_for_document(tree: &Tree, document: &Path) -> Vec<NodePath> {
    let mut jobs: Vec<NodePath> = Vec::new();
    for key in tree.job_lists() {
        let defined_here = tree
            .get(key)
            .and_then(|n| n.job_data.as_ref())
            .and_then(|d| d.source.as_deref())
            .is_some_and(|s| s == document);
        if !defined_here {
            continue;
        }
        let path = tree.path_of(key);
        if !jobs.iter().any(|j| path.starts_with(j)) {
            jobs.push(path);
        }
    }
    jobs
}

/// Process one changed path reported by the watcher.
///
/// Paths that are not loaded documents, and saves that leave the content
/// unchanged, are ignored.
pub async fn process_document_change(
    fs: &dyn FileSystem,
    path: &Path,
    tree: &Arc<Mutex<Tree>>,
    hashes: &mut DocumentHashes,
    runtime_tx: &mpsc::Sender<EngineEvent>,
) {
    let Ok(document) = fs.canonicalize(path) else {
        debug!(path = %path.display(), "changed path no longer resolves; ignoring");
        return;
    };

    let jobs = {
        let tree = tree.lock().await;
        jobs_for_document(&tree, &document)
    };
    if jobs.is_empty() {
        return;
    }

    let hash = match compute_document_hash(fs, &document) {
        Ok(h) => h,
        Err(e) => {
            warn!(path = %document.display(), error = %e, "could not hash changed document");
            return;
        }
    };
    if !hashes.update(&document, hash) {
        debug!(path = %document.display(), "document content unchanged; skipping reload");
        return;
    }

    for origin in jobs {
        info!(document = %document.display(), job = %origin, "document changed; requesting reload");
        if runtime_tx
            .send(EngineEvent::ReloadRequested { origin })
            .await
            .is_err()
        {
            debug!("runtime gone; dropping reload request");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::tree::{Node, NodeConfig};
    use crate::types::NodeKind;

    fn job(id: &str, source: Option<&str>) -> Node {
        let mut node = Node::new(id, NodeKind::JobList, NodeConfig::default());
        if let Some(data) = node.job_data.as_mut() {
            data.source = source.map(PathBuf::from);
        }
        node
    }

    fn tree() -> Tree {
        let mut tree = Tree::new(job("root", None));
        let root = tree.root();
        let main = tree.add_child(root, job("main", Some("/jobs/root.toml"))).unwrap();
        tree.add_child(main, job("db", Some("/jobs/db.toml"))).unwrap();
        tree.add_child(main, job("db2", Some("/jobs/db.toml"))).unwrap();
        let inline = tree.add_child(main, job("inline", None)).unwrap();
        tree.add_child(inline, job("again", Some("/jobs/root.toml"))).unwrap();
        tree
    }

    #[test]
    fn documents_map_to_outermost_job_lists() {
        let tree = tree();
        let paths = |doc: &str| -> Vec<String> {
            jobs_for_document(&tree, Path::new(doc))
                .iter()
                .map(|p| p.to_string())
                .collect()
        };
        assert_eq!(paths("/jobs/db.toml"), ["root/main/db", "root/main/db2"]);
        assert_eq!(paths("/jobs/root.toml"), ["root/main"]);
        assert!(paths("/jobs/other.toml").is_empty());
    }

    #[test]
    fn watched_dirs_come_from_loaded_documents() {
        let docs = loaded_documents(&tree());
        assert_eq!(docs.len(), 2);
        assert_eq!(
            document_dirs(&docs).into_iter().collect::<Vec<_>>(),
            [PathBuf::from("/jobs")]
        );
    }

    #[tokio::test]
    async fn only_content_changes_request_reloads() {
        let fs = MockFileSystem::new();
        fs.add_file("/jobs/db.toml", "a");
        let tree = Arc::new(Mutex::new(tree()));
        let (tx, mut rx) = mpsc::channel(8);
        let mut hashes = DocumentHashes::new();
        hashes.seed(&fs, [&PathBuf::from("/jobs/db.toml")]);

        let path = Path::new("/jobs/db.toml");
        process_document_change(&fs, path, &tree, &mut hashes, &tx).await;
        assert!(rx.try_recv().is_err());

        fs.add_file("/jobs/db.toml", "b");
        process_document_change(&fs, path, &tree, &mut hashes, &tx).await;
        let origins: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| match e {
                EngineEvent::ReloadRequested { origin } => origin.to_string(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(origins, ["root/main/db", "root/main/db2"]);
    }
}
