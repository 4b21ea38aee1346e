// src/watch/hash.rs

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use crate::fs::FileSystem;

/// blake3 hex digest of a document's content.
pub fn compute_document_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut reader = fs
        .open_read(path)
        .with_context(|| format!("opening document for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Last seen hash per document, kept in memory for the life of the process.
#[derive(Debug, Default, Clone)]
pub struct DocumentHashes {
    hashes: HashMap<PathBuf, String>,
}

impl DocumentHashes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current hash of every document in `paths`.
    pub fn seed<'a>(&mut self, fs: &dyn FileSystem, paths: impl IntoIterator<Item = &'a PathBuf>) {
        for path in paths {
            match compute_document_hash(fs, path) {
                Ok(hash) => {
                    self.hashes.insert(path.clone(), hash);
                }
                Err(e) => debug!(path = %path.display(), error = %e, "could not hash document"),
            }
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.hashes.contains_key(path)
    }

    /// Store `hash` for `path`; `true` if it differs from the previous one.
    pub fn update(&mut self, path: &Path, hash: String) -> bool {
        match self.hashes.get(path) {
            Some(previous) if *previous == hash => false,
            _ => {
                self.hashes.insert(path.to_path_buf(), hash);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn unchanged_content_is_not_a_change() {
        let fs = MockFileSystem::new();
        let path = PathBuf::from("/jobs/root.toml");
        fs.add_file(&path, "[job]\nname = \"Root\"\n");

        let mut hashes = DocumentHashes::new();
        hashes.seed(&fs, [&path]);

        let same = compute_document_hash(&fs, &path).unwrap();
        assert!(!hashes.update(&path, same));

        fs.add_file(&path, "[job]\nname = \"Renamed\"\n");
        let edited = compute_document_hash(&fs, &path).unwrap();
        assert!(hashes.update(&path, edited.clone()));
        assert!(!hashes.update(&path, edited));
    }
}
