//! Event broadcaster for the controller-wide event bus.
//!
//! The `EventBroadcaster` is the channel through which the live-state
//! observer reports resource changes and the engine reports status
//! transitions. It uses tokio's broadcast channel for multi-producer,
//! multi-consumer messaging; the scheduler subscribes to drive self-heal
//! triggers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::ids::ResourceId;
use crate::status::{HealthStatusCode, SyncStatusCode};

/// Default buffer size for the broadcast channel.
/// Slow receivers drop the oldest events beyond this limit.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Kind of live resource change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Applied,
    Deleted,
}

/// A change observed in the target environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChanged {
    /// Owning application, when the resource carries an ownership marker.
    pub owner: Option<String>,
    pub id: ResourceId,
    pub change: ChangeKind,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// An application status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChanged {
    pub app: String,
    pub sync: SyncStatusCode,
    pub health: HealthStatusCode,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Unified event type carried on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControllerEvent {
    Resource(ResourceChanged),
    Status(StatusChanged),
}

/// Broadcaster for controller events.
///
/// Thread-safe and cheap to clone; multiple subscribers receive every event
/// sent after they subscribed.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<ControllerEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new broadcaster with custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new broadcaster wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event;
    /// 0 if there are none.
    pub fn send(&self, event: ControllerEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    /// Send a resource-change event.
    pub fn send_resource_changed(
        &self,
        owner: Option<String>,
        id: ResourceId,
        change: ChangeKind,
    ) -> usize {
        self.send(ControllerEvent::Resource(ResourceChanged {
            owner,
            id,
            change,
            timestamp: OffsetDateTime::now_utc(),
        }))
    }

    /// Send a status-transition event.
    pub fn send_status_changed(
        &self,
        app: impl Into<String>,
        sync: SyncStatusCode,
        health: HealthStatusCode,
    ) -> usize {
        self.send(ControllerEvent::Status(StatusChanged {
            app: app.into(),
            sync,
            health,
            timestamp: OffsetDateTime::now_utc(),
        }))
    }

    /// Subscribe to events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_resource_event() {
        let broadcaster = EventBroadcaster::new();
        let mut receiver = broadcaster.subscribe();

        let id = ResourceId::new("Deployment", "prod", "web");
        broadcaster.send_resource_changed(Some("demo".to_string()), id.clone(), ChangeKind::Applied);

        match receiver.recv().await.unwrap() {
            ControllerEvent::Resource(event) => {
                assert_eq!(event.owner.as_deref(), Some("demo"));
                assert_eq!(event.id, id);
                assert_eq!(event.change, ChangeKind::Applied);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_send_without_subscribers_returns_zero() {
        let broadcaster = EventBroadcaster::new();
        let sent = broadcaster.send_status_changed(
            "demo",
            SyncStatusCode::Synced,
            HealthStatusCode::Healthy,
        );
        assert_eq!(sent, 0);
    }

    #[test]
    fn test_subscriber_count() {
        let broadcaster = EventBroadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);
        let _r1 = broadcaster.subscribe();
        let _r2 = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);
    }
}
