use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An immutable, content-addressed snapshot of a configuration tree at one
/// concrete revision.
///
/// Files are keyed by their path relative to the repository root, with `/`
/// separators on every platform. The digest covers paths and contents, so
/// two trees with equal digests are byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTree {
    revision: String,
    digest: String,
    files: BTreeMap<String, Vec<u8>>,
}

impl SourceTree {
    /// Builds a tree from a set of files, computing the content digest.
    pub fn new(revision: impl Into<String>, files: BTreeMap<String, Vec<u8>>) -> Self {
        let digest = tree_digest(&files);
        Self {
            revision: revision.into(),
            digest,
            files,
        }
    }

    /// The concrete revision this tree was materialized from.
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// SHA-256 digest over all paths and contents.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Content of one file.
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// True when at least one file lives under `prefix`.
    pub fn contains_dir(&self, prefix: &str) -> bool {
        self.files_under(prefix).next().is_some()
    }

    /// Files whose path starts with `prefix` treated as a directory.
    pub fn files_under<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a [u8])> + 'a {
        let normalized = prefix.trim_end_matches('/');
        self.files.iter().filter_map(move |(path, content)| {
            if normalized.is_empty() {
                return Some((path.as_str(), content.as_slice()));
            }
            let rest = path.strip_prefix(normalized)?;
            if rest.starts_with('/') {
                Some((path.as_str(), content.as_slice()))
            } else {
                None
            }
        })
    }
}

fn tree_digest(files: &BTreeMap<String, Vec<u8>>) -> String {
    let mut hasher = Sha256::new();
    for (path, content) in files {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(content);
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
