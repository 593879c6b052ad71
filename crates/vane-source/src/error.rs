use thiserror::Error;

/// Errors from source resolution.
///
/// All variants are treated as transient by the caller: the scheduler retries
/// the fetch with exponential backoff and only then surfaces the failure on
/// the application status.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source repository '{repo}' is unreachable: {message}")]
    Unreachable { repo: String, message: String },

    #[error("Revision '{revision}' not found in repository '{repo}'")]
    RevisionNotFound { repo: String, revision: String },

    #[error("Path '{path}' not found in repository '{repo}'")]
    PathNotFound { repo: String, path: String },
}

impl SourceError {
    pub fn unreachable(repo: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable {
            repo: repo.into(),
            message: message.into(),
        }
    }

    pub fn revision_not_found(repo: impl Into<String>, revision: impl Into<String>) -> Self {
        Self::RevisionNotFound {
            repo: repo.into(),
            revision: revision.into(),
        }
    }

    pub fn path_not_found(repo: impl Into<String>, path: impl Into<String>) -> Self {
        Self::PathNotFound {
            repo: repo.into(),
            path: path.into(),
        }
    }
}
