use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::validate_app_name;

/// Default number of revision snapshots retained per application.
pub const DEFAULT_REVISION_HISTORY_LIMIT: usize = 10;

/// Pointer into the versioned configuration source.
///
/// A symbolic pointer tracks whatever the source currently designates as
/// latest; a pinned pointer names one immutable revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionPointer {
    Symbolic(String),
    Pinned(String),
}

impl fmt::Display for RevisionPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbolic(name) => write!(f, "{name} (symbolic)"),
            Self::Pinned(rev) => write!(f, "{rev}"),
        }
    }
}

/// Where the desired state comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Repository locator understood by the configured source repository.
    pub repo: String,
    /// Revision to resolve on each cycle.
    pub revision: RevisionPointer,
    /// Path of the environment overlay inside the tree.
    pub path: String,
}

/// Where the compiled resources go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationSpec {
    /// Handle of the target environment.
    pub environment: String,
    /// Namespace compiled resources default into.
    pub namespace: String,
}

/// Ordering discipline for cascading deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationMode {
    /// Delete the parent immediately; dependents are collected afterwards.
    #[default]
    Background,
    /// Wait for dependents to disappear before finalizing the parent.
    Foreground,
}

/// Named sync flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncOptions {
    /// Create the destination namespace before applying when it is missing.
    pub create_namespace: bool,
    /// Run all creates and updates before any delete.
    pub prune_last: bool,
    /// Propagation mode used for prune deletes.
    pub propagation: PropagationMode,
}

/// Per-application reconciliation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncPolicy {
    /// Apply plans without a manual trigger.
    pub automated: bool,
    /// Delete owned live resources absent from the desired set.
    pub prune: bool,
    /// Treat observed live drift as an immediate reconcile trigger.
    pub self_heal: bool,
    /// Accept a compiled resource set with zero resources.
    pub allow_empty: bool,
    pub sync_options: SyncOptions,
    pub revision_history_limit: usize,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            automated: false,
            prune: false,
            self_heal: false,
            allow_empty: false,
            sync_options: SyncOptions::default(),
            revision_history_limit: DEFAULT_REVISION_HISTORY_LIMIT,
        }
    }
}

/// The unit registered with the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub name: String,
    pub source: SourceSpec,
    pub destination: DestinationSpec,
    #[serde(default)]
    pub sync_policy: SyncPolicy,
}

impl Application {
    /// Creates an application declaration with the default sync policy.
    ///
    /// # Errors
    ///
    /// Returns an error when the declaration fails [`Application::validate`].
    pub fn new(
        name: impl Into<String>,
        source: SourceSpec,
        destination: DestinationSpec,
    ) -> Result<Self> {
        let app = Self {
            name: name.into(),
            source,
            destination,
            sync_policy: SyncPolicy::default(),
        };
        app.validate()?;
        Ok(app)
    }

    /// Sets the sync policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    /// Validates a declaration before it enters the scheduler.
    ///
    /// Malformed declarations are rejected at registration time and never
    /// reconciled.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidAppName` for a bad name and
    /// `CoreError::MissingField` for empty required fields.
    pub fn validate(&self) -> Result<()> {
        validate_app_name(&self.name)?;
        if self.source.repo.is_empty() {
            return Err(CoreError::missing_field("source.repo"));
        }
        if self.destination.environment.is_empty() {
            return Err(CoreError::missing_field("destination.environment"));
        }
        if self.destination.namespace.is_empty() {
            return Err(CoreError::missing_field("destination.namespace"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> SourceSpec {
        SourceSpec {
            repo: "fixtures/demo".to_string(),
            revision: RevisionPointer::Symbolic("latest".to_string()),
            path: "overlays/env-b".to_string(),
        }
    }

    fn destination() -> DestinationSpec {
        DestinationSpec {
            environment: "default".to_string(),
            namespace: "demo".to_string(),
        }
    }

    #[test]
    fn test_new_validates_name() {
        assert!(Application::new("demo", source(), destination()).is_ok());
        assert!(Application::new("Bad Name", source(), destination()).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut app = Application::new("demo", source(), destination()).unwrap();
        app.destination.namespace.clear();
        assert!(app.validate().is_err());
    }

    #[test]
    fn test_policy_defaults() {
        let policy = SyncPolicy::default();
        assert!(!policy.automated);
        assert!(!policy.prune);
        assert!(!policy.self_heal);
        assert!(!policy.allow_empty);
        assert_eq!(policy.revision_history_limit, DEFAULT_REVISION_HISTORY_LIMIT);
        assert_eq!(policy.sync_options.propagation, PropagationMode::Background);
    }

    #[test]
    fn test_declaration_deserializes_with_partial_policy() {
        let app: Application = serde_json::from_value(json!({
            "name": "demo",
            "source": {
                "repo": "fixtures/demo",
                "revision": {"symbolic": "latest"},
                "path": "overlays/env-b"
            },
            "destination": {"environment": "default", "namespace": "demo"},
            "syncPolicy": {"automated": true, "prune": true}
        }))
        .unwrap();
        assert!(app.sync_policy.automated);
        assert!(app.sync_policy.prune);
        assert!(!app.sync_policy.self_heal);
        assert_eq!(
            app.sync_policy.revision_history_limit,
            DEFAULT_REVISION_HISTORY_LIMIT
        );
    }

    #[test]
    fn test_revision_pointer_serde_shape() {
        let symbolic = serde_json::to_value(RevisionPointer::Symbolic("latest".into())).unwrap();
        assert_eq!(symbolic, json!({"symbolic": "latest"}));
        let pinned = serde_json::to_value(RevisionPointer::Pinned("rev-2".into())).unwrap();
        assert_eq!(pinned, json!({"pinned": "rev-2"}));
    }
}
