use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use vane_core::app::{RevisionPointer, SourceSpec};

use crate::error::SourceError;
use crate::tree::SourceTree;

/// Name of the pointer file that designates the current revision of a
/// directory-backed repository.
const REVISION_POINTER_FILE: &str = "REVISION";

/// Resolves one revision of a configuration tree into a materialized
/// snapshot.
///
/// Implementations must be thread-safe (`Send + Sync`). Resolution has no
/// side effects beyond producing the immutable snapshot.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Materializes the tree for `spec`.
    ///
    /// The returned tree covers the whole revision; `spec.path` is verified
    /// to exist so a bad declaration fails here rather than compiling to
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` on an unreachable repository, an unknown
    /// revision, or a missing path. All are transient from the caller's
    /// point of view.
    async fn resolve(&self, spec: &SourceSpec) -> Result<SourceTree, SourceError>;
}

fn ensure_path(tree: &SourceTree, spec: &SourceSpec) -> Result<(), SourceError> {
    if spec.path.is_empty() || tree.contains_dir(&spec.path) || tree.get(&spec.path).is_some() {
        Ok(())
    } else {
        Err(SourceError::path_not_found(&spec.repo, &spec.path))
    }
}

/// A source repository rooted in a local directory tree.
///
/// Layout: `<root>/<repo>/<revision>/...` holds one immutable directory per
/// revision; `<root>/<repo>/REVISION` contains the revision name a symbolic
/// pointer currently resolves to.
pub struct DirSourceRepository {
    root: PathBuf,
}

impl DirSourceRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve_revision(&self, repo_dir: &Path, spec: &SourceSpec) -> Result<String, SourceError> {
        match &spec.revision {
            RevisionPointer::Pinned(revision) => Ok(revision.clone()),
            RevisionPointer::Symbolic(_) => {
                let pointer = repo_dir.join(REVISION_POINTER_FILE);
                let raw = std::fs::read_to_string(&pointer).map_err(|_| {
                    SourceError::revision_not_found(&spec.repo, spec.revision.to_string())
                })?;
                let revision = raw.trim();
                if revision.is_empty() {
                    return Err(SourceError::revision_not_found(
                        &spec.repo,
                        spec.revision.to_string(),
                    ));
                }
                Ok(revision.to_string())
            }
        }
    }
}

#[async_trait]
impl SourceRepository for DirSourceRepository {
    async fn resolve(&self, spec: &SourceSpec) -> Result<SourceTree, SourceError> {
        let repo_dir = self.root.join(&spec.repo);
        if !repo_dir.is_dir() {
            return Err(SourceError::unreachable(
                &spec.repo,
                format!("no such directory under {}", self.root.display()),
            ));
        }

        let revision = self.resolve_revision(&repo_dir, spec)?;
        let revision_dir = repo_dir.join(&revision);
        if !revision_dir.is_dir() {
            return Err(SourceError::revision_not_found(&spec.repo, &revision));
        }

        let mut files = BTreeMap::new();
        collect_files(&revision_dir, "", &mut files)
            .map_err(|e| SourceError::unreachable(&spec.repo, e.to_string()))?;

        let tree = SourceTree::new(revision, files);
        ensure_path(&tree, spec)?;
        debug!(
            repo = %spec.repo,
            revision = %tree.revision(),
            files = tree.len(),
            "Materialized source tree"
        );
        Ok(tree)
    }
}

fn collect_files(
    dir: &Path,
    prefix: &str,
    files: &mut BTreeMap<String, Vec<u8>>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, &relative, files)?;
        } else {
            files.insert(relative, std::fs::read(&path)?);
        }
    }
    Ok(())
}

#[derive(Default)]
struct FixtureRepo {
    revisions: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    latest: Option<String>,
}

/// An in-memory source repository for tests and seeded demo environments.
#[derive(Default)]
pub struct FixtureSourceRepository {
    repos: DashMap<String, FixtureRepo>,
}

impl FixtureSourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one file to a revision, creating repo and revision as needed.
    pub fn add_file(&self, repo: &str, revision: &str, path: &str, content: &str) {
        let mut entry = self.repos.entry(repo.to_string()).or_default();
        entry
            .revisions
            .entry(revision.to_string())
            .or_default()
            .insert(path.to_string(), content.as_bytes().to_vec());
    }

    /// Points symbolic resolution at `revision`.
    pub fn set_latest(&self, repo: &str, revision: &str) {
        let mut entry = self.repos.entry(repo.to_string()).or_default();
        entry.latest = Some(revision.to_string());
    }
}

#[async_trait]
impl SourceRepository for FixtureSourceRepository {
    async fn resolve(&self, spec: &SourceSpec) -> Result<SourceTree, SourceError> {
        let repo = self
            .repos
            .get(&spec.repo)
            .ok_or_else(|| SourceError::unreachable(&spec.repo, "unknown fixture repository"))?;

        let revision = match &spec.revision {
            RevisionPointer::Pinned(revision) => revision.clone(),
            RevisionPointer::Symbolic(_) => repo.latest.clone().ok_or_else(|| {
                SourceError::revision_not_found(&spec.repo, spec.revision.to_string())
            })?,
        };

        let files = repo
            .revisions
            .get(&revision)
            .ok_or_else(|| SourceError::revision_not_found(&spec.repo, &revision))?
            .clone();

        let tree = SourceTree::new(revision, files);
        ensure_path(&tree, spec)?;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vane_core::app::{RevisionPointer, SourceSpec};

    fn spec(repo: &str, revision: RevisionPointer, path: &str) -> SourceSpec {
        SourceSpec {
            repo: repo.to_string(),
            revision,
            path: path.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fixture_pinned_resolution() {
        let repo = FixtureSourceRepository::new();
        repo.add_file("demo", "rev-1", "base/app.json", "{}");

        let tree = repo
            .resolve(&spec("demo", RevisionPointer::Pinned("rev-1".into()), "base"))
            .await
            .unwrap();
        assert_eq!(tree.revision(), "rev-1");
        assert!(tree.get("base/app.json").is_some());
    }

    #[tokio::test]
    async fn test_fixture_symbolic_follows_latest() {
        let repo = FixtureSourceRepository::new();
        repo.add_file("demo", "rev-1", "base/app.json", "{}");
        repo.add_file("demo", "rev-2", "base/app.json", "{\"v\":2}");
        repo.set_latest("demo", "rev-2");

        let tree = repo
            .resolve(&spec(
                "demo",
                RevisionPointer::Symbolic("latest".into()),
                "base",
            ))
            .await
            .unwrap();
        assert_eq!(tree.revision(), "rev-2");
    }

    #[tokio::test]
    async fn test_fixture_missing_path_fails() {
        let repo = FixtureSourceRepository::new();
        repo.add_file("demo", "rev-1", "base/app.json", "{}");

        let err = repo
            .resolve(&spec(
                "demo",
                RevisionPointer::Pinned("rev-1".into()),
                "overlays/env-b",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::PathNotFound { .. }));
    }

    #[tokio::test]
    async fn test_dir_repository_resolves_pinned_revision() {
        let root = tempfile::tempdir().unwrap();
        let rev = root.path().join("demo/rev-1/base");
        std::fs::create_dir_all(&rev).unwrap();
        std::fs::write(rev.join("app.json"), b"{}").unwrap();

        let repo = DirSourceRepository::new(root.path());
        let tree = repo
            .resolve(&spec("demo", RevisionPointer::Pinned("rev-1".into()), "base"))
            .await
            .unwrap();
        assert_eq!(tree.revision(), "rev-1");
        assert_eq!(tree.get("base/app.json"), Some(b"{}".as_slice()));
    }

    #[tokio::test]
    async fn test_dir_repository_symbolic_pointer_file() {
        let root = tempfile::tempdir().unwrap();
        let rev = root.path().join("demo/rev-7/base");
        std::fs::create_dir_all(&rev).unwrap();
        std::fs::write(rev.join("app.json"), b"{}").unwrap();
        std::fs::write(root.path().join("demo/REVISION"), b"rev-7\n").unwrap();

        let repo = DirSourceRepository::new(root.path());
        let tree = repo
            .resolve(&spec(
                "demo",
                RevisionPointer::Symbolic("head".into()),
                "base",
            ))
            .await
            .unwrap();
        assert_eq!(tree.revision(), "rev-7");
    }

    #[tokio::test]
    async fn test_dir_repository_unknown_repo_is_unreachable() {
        let root = tempfile::tempdir().unwrap();
        let repo = DirSourceRepository::new(root.path());
        let err = repo
            .resolve(&spec("ghost", RevisionPointer::Pinned("rev-1".into()), ""))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Unreachable { .. }));
    }
}
