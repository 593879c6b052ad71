pub mod app;
pub mod canonical;
pub mod error;
pub mod events;
pub mod ids;
pub mod manifest;
pub mod status;

pub use app::{
    Application, DestinationSpec, PropagationMode, RevisionPointer, SourceSpec, SyncOptions,
    SyncPolicy,
};
pub use canonical::{canonicalize, content_hash};
pub use error::{CoreError, Result};
pub use events::{ChangeKind, ControllerEvent, EventBroadcaster, ResourceChanged, StatusChanged};
pub use ids::{ResourceId, validate_app_name};
pub use manifest::{Manifest, OWNER_LABEL};
pub use status::{AppStatus, HealthStatusCode, PlanSummary, SyncStatusCode};
