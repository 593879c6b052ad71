//! The diff engine: classifies desired against live state into a plan.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use vane_cluster::LiveSnapshot;
use vane_core::app::SyncPolicy;
use vane_core::{content_hash, Manifest, PlanSummary, ResourceId};

/// Classification of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Desired but not live.
    Create,
    /// Present on both sides with differing content.
    Update,
    /// Owned and live but absent from the desired set, with prune enabled.
    Delete,
    /// Present on both sides with equal content.
    Unchanged,
    /// Absent from the desired set but prune is disabled; informational.
    DriftOnly,
}

/// One entry of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanAction {
    pub kind: ActionKind,
    pub id: ResourceId,
    /// The manifest the action operates on: the desired manifest for
    /// `Create`/`Update`, the live manifest for `Delete` (its owner
    /// references drive delete ordering), nothing otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
}

/// An ordered classification of one application's resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub app: String,
    /// Revision the desired set was compiled from, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub actions: Vec<PlanAction>,
}

impl Plan {
    /// Counts per classification; `failed` is always zero before execution.
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for action in &self.actions {
            match action.kind {
                ActionKind::Create => summary.created += 1,
                ActionKind::Update => summary.updated += 1,
                ActionKind::Delete => summary.deleted += 1,
                ActionKind::Unchanged => summary.unchanged += 1,
                ActionKind::DriftOnly => summary.drifted += 1,
            }
        }
        summary
    }

    /// True when the plan carries at least one mutating action.
    pub fn has_changes(&self) -> bool {
        self.actions.iter().any(|a| {
            matches!(
                a.kind,
                ActionKind::Create | ActionKind::Update | ActionKind::Delete
            )
        })
    }

    /// True when the plan reports informational drift.
    pub fn has_drift(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a.kind, ActionKind::DriftOnly))
    }

    /// Namespaces touched by create and update actions.
    pub fn target_namespaces(&self) -> BTreeSet<String> {
        self.actions
            .iter()
            .filter(|a| matches!(a.kind, ActionKind::Create | ActionKind::Update))
            .map(|a| a.id.namespace.clone())
            .collect()
    }
}

/// Compares a desired resource set against a live snapshot.
///
/// The live snapshot must already be scoped to `app`; resources owned by a
/// different application are skipped regardless, so a mis-scoped snapshot
/// can never produce a cross-tenant delete.
///
/// The result is deterministic: mutating actions come first in identity
/// order, informational entries after. Re-running `diff` after the returned
/// plan has been fully applied yields an all-`Unchanged` classification.
pub fn diff(
    app: &str,
    revision: Option<String>,
    desired: &[Manifest],
    live: &LiveSnapshot,
    policy: &SyncPolicy,
) -> Plan {
    let mut desired_by_id: BTreeMap<ResourceId, &Manifest> = BTreeMap::new();
    for manifest in desired {
        if let Ok(id) = manifest.id() {
            desired_by_id.insert(id, manifest);
        }
    }

    let mut mutations: Vec<PlanAction> = Vec::new();
    let mut informational: Vec<PlanAction> = Vec::new();

    for (id, manifest) in &desired_by_id {
        match live.get(id) {
            None => mutations.push(PlanAction {
                kind: ActionKind::Create,
                id: id.clone(),
                manifest: Some((*manifest).clone()),
            }),
            Some(live_manifest) => {
                if content_hash(manifest) == content_hash(live_manifest) {
                    informational.push(PlanAction {
                        kind: ActionKind::Unchanged,
                        id: id.clone(),
                        manifest: None,
                    });
                } else {
                    mutations.push(PlanAction {
                        kind: ActionKind::Update,
                        id: id.clone(),
                        manifest: Some((*manifest).clone()),
                    });
                }
            }
        }
    }

    for (id, live_manifest) in live.iter() {
        if desired_by_id.contains_key(id) {
            continue;
        }
        // never touch what this application does not own
        if live_manifest.owner() != Some(app) {
            continue;
        }
        if policy.prune {
            mutations.push(PlanAction {
                kind: ActionKind::Delete,
                id: id.clone(),
                manifest: Some(live_manifest.clone()),
            });
        } else {
            informational.push(PlanAction {
                kind: ActionKind::DriftOnly,
                id: id.clone(),
                manifest: None,
            });
        }
    }

    mutations.sort_by(|a, b| a.id.cmp(&b.id));
    informational.sort_by(|a, b| a.id.cmp(&b.id));
    mutations.extend(informational);

    let plan = Plan {
        app: app.to_string(),
        revision,
        actions: mutations,
    };
    debug!(
        app,
        created = plan.summary().created,
        updated = plan.summary().updated,
        deleted = plan.summary().deleted,
        "Computed plan"
    );
    plan
}
