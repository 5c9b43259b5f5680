//! Service status aggregation

use chrono::{DateTime, Utc};
use serde::Serialize;

use voice_dialogue_core::{HealthStatus, ServiceHealth};

/// Per-subsystem health as reported by each collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsystemStatuses {
    pub stt: ServiceHealth,
    pub llm: ServiceHealth,
    pub tts: ServiceHealth,
}

/// Engine-wide status snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub overall: HealthStatus,
    pub services: SubsystemStatuses,
    /// Free orchestrator permits at snapshot time
    pub available_permits: usize,
    pub max_concurrent: usize,
    pub timestamp: DateTime<Utc>,
}

impl ServiceStatus {
    pub fn new(services: SubsystemStatuses, available_permits: usize, max_concurrent: usize) -> Self {
        let overall = HealthStatus::aggregate([
            services.stt.status,
            services.llm.status,
            services.tts.status,
        ]);
        Self {
            overall,
            services,
            available_permits,
            max_concurrent,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_follows_worst_subsystem() {
        let status = ServiceStatus::new(
            SubsystemStatuses {
                stt: ServiceHealth::healthy(),
                llm: ServiceHealth::degraded(),
                tts: ServiceHealth::healthy(),
            },
            5,
            5,
        );
        assert_eq!(status.overall, HealthStatus::Degraded);

        let status = ServiceStatus::new(
            SubsystemStatuses {
                stt: ServiceHealth::unhealthy(),
                llm: ServiceHealth::degraded(),
                tts: ServiceHealth::healthy(),
            },
            5,
            5,
        );
        assert_eq!(status.overall, HealthStatus::Unhealthy);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["overall"], "unhealthy");
        assert_eq!(json["services"]["llm"]["status"], "degraded");
    }
}
