//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

use crate::websocket::registry::ConnectionRegistry;

/// Coarse server state reported to probes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Accepting upgrades.
    Ok,
    /// Shutdown has fired; live connections are being torn down.
    Draining,
}

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Server state.
    pub status: HealthStatus,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live WebSocket connections.
    pub connections: usize,
    /// Connections accepted since start.
    pub accepted_total: u64,
}

/// Snapshot the registry into a health response.
pub fn health_check(
    start_time: Instant,
    registry: &ConnectionRegistry,
    shutting_down: bool,
) -> HealthResponse {
    HealthResponse {
        status: if shutting_down {
            HealthStatus::Draining
        } else {
            HealthStatus::Ok
        },
        uptime_secs: start_time.elapsed().as_secs(),
        connections: registry.count(),
        accepted_total: registry.accepted_total(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn fresh_registry_is_ok_and_empty() {
        let registry = ConnectionRegistry::new();
        let resp = health_check(Instant::now(), &registry, false);
        assert_eq!(resp.status, HealthStatus::Ok);
        assert_eq!(resp.connections, 0);
        assert_eq!(resp.accepted_total, 0);
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_counts_from_start() {
        let start = Instant::now().checked_sub(Duration::from_secs(60)).unwrap();
        let resp = health_check(start, &ConnectionRegistry::new(), false);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn draining_serializes_lowercase() {
        let resp = health_check(Instant::now(), &ConnectionRegistry::new(), true);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "draining");
        assert!(parsed["uptime_secs"].is_number());
    }
}
