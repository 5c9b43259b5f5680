//! Health classification shared by all collaborators

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Health of a single subsystem, or of the whole engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Combine subsystem states.
    ///
    /// Healthy only if every input is healthy; unhealthy if any is unhealthy;
    /// degraded otherwise. An empty input is healthy.
    pub fn aggregate<I>(statuses: I) -> HealthStatus
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        let mut overall = HealthStatus::Healthy;
        for status in statuses {
            match status {
                HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
                HealthStatus::Degraded => overall = HealthStatus::Degraded,
                HealthStatus::Healthy => {},
            }
        }
        overall
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Collaborator-reported health with free-form details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl ServiceHealth {
    pub fn new(status: HealthStatus) -> Self {
        Self {
            status,
            details: Map::new(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(HealthStatus::Healthy)
    }

    pub fn degraded() -> Self {
        Self::new(HealthStatus::Degraded)
    }

    pub fn unhealthy() -> Self {
        Self::new(HealthStatus::Unhealthy)
    }

    /// Attach a detail entry
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}
