use thiserror::Error;
use vane_core::ResourceId;

/// Errors from overlay compilation.
///
/// Compilation is deterministic over the source content, so these are not
/// retried blindly: the application stays `Degraded` with the precise
/// failure until the source changes.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Component file '{path}' is invalid: {message}")]
    InvalidComponent { path: String, message: String },

    #[error("Manifest file '{path}' is invalid: {message}")]
    InvalidManifestFile { path: String, message: String },

    #[error("Patch targets unknown resource {kind}/{name}")]
    UnresolvedPatchTarget { kind: String, name: String },

    #[error("Patch on {kind}/{name} failed: {message}")]
    PatchFailed {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Compiled set contains duplicate resource identity {id}")]
    DuplicateResource { id: ResourceId },

    #[error("Compiled resource set is empty and the policy does not allow it")]
    EmptyResourceSet,

    #[error("Base chain starting at '{path}' is cyclic or too deep")]
    BaseChainInvalid { path: String },
}

impl CompileError {
    pub fn invalid_component(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidComponent {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn invalid_manifest_file(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidManifestFile {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn unresolved_patch_target(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnresolvedPatchTarget {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn patch_failed(
        kind: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::PatchFailed {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }
}
