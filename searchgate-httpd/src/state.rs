//! Application state shared across handlers.

use searchgate_service::{Gateway, GatewayMetrics, HealthMonitor};
use std::sync::Arc;
use std::time::Instant;

/// Everything a handler needs, built once at startup.
pub struct AppState {
    /// The request pipeline.
    pub gateway: Gateway,
    /// Latest background probe results.
    pub health: Arc<HealthMonitor>,
    /// Instrument registry, shared with the gateway.
    pub metrics: Arc<GatewayMetrics>,
    /// Process start, for the uptime stat.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(gateway: Gateway, health: Arc<HealthMonitor>, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            gateway,
            health,
            metrics,
            started_at: Instant::now(),
        }
    }

    /// Seconds since startup.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("gateway", &self.gateway)
            .field("uptime_secs", &self.uptime_secs())
            .finish_non_exhaustive()
    }
}
