use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Sync state of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatusCode {
    /// Desired and live state match and the last plan fully succeeded.
    Synced,
    /// Drift exists, or a plan is computed but not applied.
    OutOfSync,
    /// A reconciliation cycle is in flight.
    Progressing,
    /// Compile failed, an apply partially failed, or a health probe is failing.
    Degraded,
}

impl SyncStatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "Synced",
            Self::OutOfSync => "OutOfSync",
            Self::Progressing => "Progressing",
            Self::Degraded => "Degraded",
        }
    }
}

impl fmt::Display for SyncStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Health of a resource or of an application as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatusCode {
    Healthy,
    Unhealthy,
    Unknown,
    Missing,
}

impl HealthStatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::Unhealthy => "Unhealthy",
            Self::Unknown => "Unknown",
            Self::Missing => "Missing",
        }
    }

    fn severity(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Unknown => 1,
            Self::Missing => 2,
            Self::Unhealthy => 3,
        }
    }

    /// Folds two health values into the worse of the two.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for HealthStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counts of plan actions, kept on the application status after each cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub drifted: usize,
    pub failed: usize,
}

impl PlanSummary {
    /// True when the plan carried no create/update/delete work.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0 && self.failed == 0
    }
}

/// Current status of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    pub sync: SyncStatusCode,
    pub health: HealthStatusCode,
    /// Concrete revision the last cycle compiled from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Human-readable detail for OutOfSync/Degraded states.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_plan: Option<PlanSummary>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<OffsetDateTime>,
}

impl Default for AppStatus {
    fn default() -> Self {
        Self {
            sync: SyncStatusCode::OutOfSync,
            health: HealthStatusCode::Unknown,
            revision: None,
            message: None,
            last_plan: None,
            last_synced_at: None,
            last_cycle_at: None,
        }
    }
}
