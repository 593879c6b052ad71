//! The sync executor: applies a plan to the target environment under a
//! policy.
//!
//! Every action is applied independently; one resource failing never aborts
//! the rest of the plan. Retryable failures (rate limiting) back off
//! exponentially up to a bounded attempt count before the action is recorded
//! as failed in the partial result.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use vane_cluster::{ClusterBackend, ClusterError};
use vane_core::app::{PropagationMode, SyncPolicy};
use vane_core::{Manifest, PlanSummary, ResourceId};

use crate::diff::{ActionKind, Plan, PlanAction};

/// Bounds for the executor's retry and wait loops.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Attempts per action; the first attempt counts.
    pub retry_limit: u32,
    /// Delay before the second attempt; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Polls while waiting for a foreground delete's dependents.
    pub foreground_wait_attempts: u32,
    /// Delay between those polls.
    pub foreground_wait_delay: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            retry_base_delay: Duration::from_millis(200),
            foreground_wait_attempts: 10,
            foreground_wait_delay: Duration::from_millis(100),
        }
    }
}

/// One action that exhausted its attempts.
#[derive(Debug, Clone)]
pub struct ActionFailure {
    pub id: ResourceId,
    pub message: String,
}

/// Outcome of applying one plan, possibly partial.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub applied: Vec<ResourceId>,
    pub pruned: Vec<ResourceId>,
    pub failed: Vec<ActionFailure>,
    pub summary: PlanSummary,
}

impl SyncResult {
    /// True when every mutating action succeeded.
    pub fn fully_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Short human-readable failure digest for status messages.
    pub fn failure_message(&self) -> Option<String> {
        let first = self.failed.first()?;
        let suffix = if self.failed.len() > 1 {
            format!(" (+{} more)", self.failed.len() - 1)
        } else {
            String::new()
        };
        Some(format!("{}: {}{suffix}", first.id, first.message))
    }
}

#[derive(Clone, Copy)]
enum Op<'a> {
    Apply(&'a Manifest),
    Delete(&'a ResourceId, PropagationMode),
    CreateNamespace(&'a str),
}

/// Applies plans to the target environment.
///
/// The executor is the only component that mutates the environment, and it
/// only ever touches resources the plan's application owns.
pub struct SyncExecutor {
    backend: Arc<dyn ClusterBackend>,
    settings: ExecutorSettings,
}

impl SyncExecutor {
    pub fn new(backend: Arc<dyn ClusterBackend>, settings: ExecutorSettings) -> Self {
        Self { backend, settings }
    }

    /// Applies a plan under a policy, returning the (possibly partial)
    /// result.
    ///
    /// Ordering: missing namespaces are created first when the policy allows
    /// it; deletes run before creates and updates unless `prune_last` defers
    /// them to the end; with foreground propagation, dependents are removed
    /// and observed gone before their parent.
    pub async fn apply(&self, plan: &Plan, policy: &SyncPolicy) -> SyncResult {
        let mut result = SyncResult {
            summary: plan.summary(),
            ..SyncResult::default()
        };

        if policy.sync_options.create_namespace {
            self.ensure_namespaces(plan, &mut result).await;
        }

        let creates_updates: Vec<&PlanAction> = plan
            .actions
            .iter()
            .filter(|a| matches!(a.kind, ActionKind::Create | ActionKind::Update))
            .collect();
        let deletes: Vec<&PlanAction> = plan
            .actions
            .iter()
            .filter(|a| matches!(a.kind, ActionKind::Delete))
            .collect();

        if policy.sync_options.prune_last {
            self.run_creates_updates(&creates_updates, &mut result).await;
            self.run_deletes(&deletes, policy, &mut result).await;
        } else {
            self.run_deletes(&deletes, policy, &mut result).await;
            self.run_creates_updates(&creates_updates, &mut result).await;
        }

        result.summary.failed = result.failed.len();
        debug!(
            app = %plan.app,
            applied = result.applied.len(),
            pruned = result.pruned.len(),
            failed = result.failed.len(),
            "Plan applied"
        );
        result
    }

    async fn ensure_namespaces(&self, plan: &Plan, result: &mut SyncResult) {
        for namespace in plan.target_namespaces() {
            let exists = match self.backend.namespace_exists(&namespace).await {
                Ok(exists) => exists,
                Err(error) => {
                    warn!(namespace, error = %error, "Namespace check failed");
                    false
                }
            };
            if exists {
                continue;
            }
            if let Err(error) = self.execute_with_retry(Op::CreateNamespace(&namespace)).await {
                result.failed.push(ActionFailure {
                    id: ResourceId::new("Namespace", "", namespace.clone()),
                    message: error.to_string(),
                });
            }
        }
    }

    async fn run_creates_updates(&self, actions: &[&PlanAction], result: &mut SyncResult) {
        for action in actions {
            let Some(manifest) = &action.manifest else {
                continue;
            };
            match self.execute_with_retry(Op::Apply(manifest)).await {
                Ok(()) => result.applied.push(action.id.clone()),
                Err(error) => {
                    warn!(id = %action.id, error = %error, "Apply failed");
                    result.failed.push(ActionFailure {
                        id: action.id.clone(),
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    async fn run_deletes(
        &self,
        actions: &[&PlanAction],
        policy: &SyncPolicy,
        result: &mut SyncResult,
    ) {
        let propagation = policy.sync_options.propagation;
        let ordered = order_deletes(actions);

        for action in ordered {
            if propagation == PropagationMode::Foreground {
                if let Err(error) = self.wait_for_dependents(&action.id).await {
                    result.failed.push(ActionFailure {
                        id: action.id.clone(),
                        message: error.to_string(),
                    });
                    continue;
                }
            }
            match self
                .execute_with_retry(Op::Delete(&action.id, propagation))
                .await
            {
                Ok(()) => result.pruned.push(action.id.clone()),
                Err(error) => {
                    warn!(id = %action.id, error = %error, "Delete failed");
                    result.failed.push(ActionFailure {
                        id: action.id.clone(),
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    /// Polls until no live resource declares `parent` as an owner, bounded
    /// by the configured attempt count.
    async fn wait_for_dependents(&self, parent: &ResourceId) -> Result<(), ClusterError> {
        for attempt in 0..self.settings.foreground_wait_attempts {
            let live = self.backend.list_resources(None).await?;
            let blocked = live
                .iter()
                .any(|m| m.owner_references().contains(parent) && m.id().ok().as_ref() != Some(parent));
            if !blocked {
                return Ok(());
            }
            debug!(parent = %parent, attempt, "Waiting for dependents to drain");
            tokio::time::sleep(self.settings.foreground_wait_delay).await;
        }
        Err(ClusterError::internal(format!(
            "dependents of {parent} still present after bounded wait"
        )))
    }

    async fn execute_with_retry(&self, op: Op<'_>) -> Result<(), ClusterError> {
        let max_attempts = self.settings.retry_limit.max(1);
        let mut attempt = 1u32;
        loop {
            let outcome = match op {
                Op::Apply(manifest) => self.backend.apply_resource(manifest).await.map(|_| ()),
                Op::Delete(id, propagation) => {
                    match self.backend.delete_resource(id, propagation).await {
                        // already gone is what we wanted
                        Err(ClusterError::NotFound { .. }) => Ok(()),
                        other => other,
                    }
                }
                Op::CreateNamespace(name) => self.backend.create_namespace(name).await,
            };
            match outcome {
                Ok(()) => return Ok(()),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = self.settings.retry_base_delay * 2u32.pow(attempt - 1);
                    warn!(error = %error, attempt, "Retryable failure, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Orders delete actions so dependents come before the resources they
/// reference. Resources outside the delete set do not constrain the order.
fn order_deletes<'a>(actions: &[&'a PlanAction]) -> Vec<&'a PlanAction> {
    let in_set: BTreeSet<&ResourceId> = actions.iter().map(|a| &a.id).collect();
    let mut remaining: Vec<&PlanAction> = actions.to_vec();
    let mut ordered: Vec<&PlanAction> = Vec::new();

    while !remaining.is_empty() {
        let removable: Vec<usize> = (0..remaining.len())
            .filter(|&i| {
                let id = &remaining[i].id;
                // deletable now when no other remaining delete depends on it
                !remaining.iter().any(|other| {
                    other
                        .manifest
                        .as_ref()
                        .map(|m| m.owner_references().contains(id))
                        .unwrap_or(false)
                        && in_set.contains(&other.id)
                        && &other.id != id
                })
            })
            .collect();

        if removable.is_empty() {
            // reference cycle; fall back to identity order for the rest
            ordered.extend(remaining.drain(..));
            break;
        }
        ordered.extend(removable.iter().map(|&i| remaining[i]));
        // remove back-to-front so indices stay valid
        for &i in removable.iter().rev() {
            remaining.remove(i);
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use serde_json::json;
    use vane_cluster::{ClusterBackend, InMemoryCluster, LiveStateObserver};
    use vane_core::EventBroadcaster;

    fn owned(name: &str, replicas: u64) -> Manifest {
        let mut manifest = Manifest::from_value(json!({
            "kind": "Deployment",
            "metadata": {"name": name, "namespace": "default"},
            "spec": {"replicas": replicas}
        }))
        .unwrap();
        manifest.set_owner("demo");
        manifest
    }

    async fn live(cluster: &Arc<InMemoryCluster>) -> vane_cluster::LiveSnapshot {
        let observer = LiveStateObserver::new(cluster.clone(), EventBroadcaster::new_shared());
        observer.refresh().await.unwrap();
        observer.snapshot("demo")
    }

    fn executor(cluster: &Arc<InMemoryCluster>) -> SyncExecutor {
        let settings = ExecutorSettings {
            retry_base_delay: Duration::from_millis(1),
            foreground_wait_delay: Duration::from_millis(1),
            ..ExecutorSettings::default()
        };
        SyncExecutor::new(cluster.clone(), settings)
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_the_rest() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.reject_apply(
            ResourceId::new("Deployment", "default", "bad"),
            "field spec.replicas is immutable",
        );

        let desired = vec![owned("bad", 1), owned("good", 1)];
        let plan = diff(
            "demo",
            None,
            &desired,
            &live(&cluster).await,
            &SyncPolicy::default(),
        );

        let result = executor(&cluster).apply(&plan, &SyncPolicy::default()).await;
        assert_eq!(result.applied.len(), 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.summary.failed, 1);
        assert!(!result.fully_succeeded());
        assert_eq!(cluster.resource_count(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_actions_are_retried() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.induce_rate_limit(2);

        let desired = vec![owned("web", 1)];
        let plan = diff(
            "demo",
            None,
            &desired,
            &live(&cluster).await,
            &SyncPolicy::default(),
        );

        let result = executor(&cluster).apply(&plan, &SyncPolicy::default()).await;
        assert!(result.fully_succeeded());
        assert_eq!(cluster.resource_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.induce_rate_limit(10);

        let desired = vec![owned("web", 1)];
        let plan = diff(
            "demo",
            None,
            &desired,
            &live(&cluster).await,
            &SyncPolicy::default(),
        );

        let result = executor(&cluster).apply(&plan, &SyncPolicy::default()).await;
        assert_eq!(result.failed.len(), 1);
        assert_eq!(cluster.resource_count(), 0);
    }

    #[tokio::test]
    async fn test_namespace_auto_create() {
        let cluster = Arc::new(InMemoryCluster::new());
        let mut manifest = owned("web", 1);
        manifest.set_namespace("ns-b");

        let plan = diff(
            "demo",
            None,
            &[manifest],
            &live(&cluster).await,
            &SyncPolicy::default(),
        );

        // without the option the apply fails on the missing namespace
        let denied = executor(&cluster).apply(&plan, &SyncPolicy::default()).await;
        assert_eq!(denied.failed.len(), 1);

        let mut policy = SyncPolicy::default();
        policy.sync_options.create_namespace = true;
        let allowed = executor(&cluster).apply(&plan, &policy).await;
        assert!(allowed.fully_succeeded());
        assert!(cluster.namespace_exists("ns-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_foreground_prune_deletes_dependents_first() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.apply_resource(&owned("web", 1)).await.unwrap();
        let mut replica_set = Manifest::from_value(json!({
            "kind": "ReplicaSet",
            "metadata": {
                "name": "web-1",
                "namespace": "default",
                "ownerReferences": [{"kind": "Deployment", "name": "web"}]
            }
        }))
        .unwrap();
        replica_set.set_owner("demo");
        cluster.apply_resource(&replica_set).await.unwrap();

        let mut policy = SyncPolicy::default();
        policy.prune = true;
        policy.sync_options.propagation = PropagationMode::Foreground;

        let mut watch = cluster.watch_resources(Some("demo")).await.unwrap();
        let plan = diff("demo", None, &[], &live(&cluster).await, &policy);
        let result = executor(&cluster).apply(&plan, &policy).await;
        assert!(result.fully_succeeded());
        assert_eq!(cluster.resource_count(), 0);

        // the dependent's delete event arrives before the parent's
        let mut deleted_order = Vec::new();
        while deleted_order.len() < 2 {
            if let vane_cluster::ClusterChange::Deleted { id, .. } = watch.recv().await.unwrap() {
                deleted_order.push(id.kind.clone());
            }
        }
        assert_eq!(deleted_order, vec!["ReplicaSet", "Deployment"]);
    }
}
