//! Background health probes and aggregated status.
//!
//! A spawned task probes both engine adapters and the shared cache tier on
//! a fixed interval; handlers read the most recent snapshot, never probing
//! inline. Aggregation: both engines up → healthy; one engine or the
//! shared cache down → degraded; both engines down → unhealthy. Readiness
//! is healthy ∨ degraded.

use crate::cache::RemoteCache;
use crate::engine::EngineAdapter;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Aggregated service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Probe result for one component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub healthy: bool,
}

/// Snapshot served by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub components: Vec<ComponentHealth>,
}

/// Periodic prober over the adapters and the shared cache.
pub struct HealthMonitor {
    simple: Arc<dyn EngineAdapter>,
    complex: Arc<dyn EngineAdapter>,
    l2: Option<Arc<dyn RemoteCache>>,
    interval: Duration,
    snapshot: RwLock<Vec<ComponentHealth>>,
}

impl HealthMonitor {
    pub fn new(
        simple: Arc<dyn EngineAdapter>,
        complex: Arc<dyn EngineAdapter>,
        l2: Option<Arc<dyn RemoteCache>>,
        interval: Duration,
    ) -> Self {
        Self {
            simple,
            complex,
            l2,
            interval,
            snapshot: RwLock::new(Vec::new()),
        }
    }

    /// Run one probe round and store the snapshot.
    pub async fn probe_once(&self) {
        let mut components = vec![
            ComponentHealth {
                name: "engine.simple".to_string(),
                healthy: self.simple.health().await,
            },
            ComponentHealth {
                name: "engine.complex".to_string(),
                healthy: self.complex.health().await,
            },
        ];
        if let Some(l2) = &self.l2 {
            components.push(ComponentHealth {
                name: "cache.l2".to_string(),
                healthy: l2.ping().await,
            });
        }

        for component in &components {
            if !component.healthy {
                tracing::warn!(component = %component.name, "health probe failed");
            }
        }
        *self.snapshot.write() = components;
    }

    /// Spawn the probe loop. The first round runs immediately so readiness
    /// reflects reality shortly after startup.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.probe_once().await;
                tokio::time::sleep(self.interval).await;
            }
        })
    }

    /// The latest snapshot, aggregated.
    pub fn report(&self) -> HealthReport {
        let components = self.snapshot.read().clone();
        let status = aggregate(&components);
        HealthReport { status, components }
    }

    /// Whether the service should accept traffic.
    pub fn ready(&self) -> bool {
        !matches!(self.report().status, HealthState::Unhealthy)
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("interval", &self.interval)
            .field("snapshot", &*self.snapshot.read())
            .finish()
    }
}

fn aggregate(components: &[ComponentHealth]) -> HealthState {
    // Probes pending: act degraded rather than lie in either direction.
    if components.is_empty() {
        return HealthState::Degraded;
    }

    let engines_down = components
        .iter()
        .filter(|c| c.name.starts_with("engine.") && !c.healthy)
        .count();
    let engines_total = components
        .iter()
        .filter(|c| c.name.starts_with("engine."))
        .count();
    if engines_total > 0 && engines_down == engines_total {
        return HealthState::Unhealthy;
    }
    if components.iter().any(|c| !c.healthy) {
        return HealthState::Degraded;
    }
    HealthState::Healthy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineContext, EngineKind};
    use crate::error::Result;
    use async_trait::async_trait;
    use searchgate_protocol::{
        SearchRequest, SearchResponse, SuggestRequest, SuggestResponse,
    };

    #[derive(Debug)]
    struct ProbeOnly {
        kind: EngineKind,
        healthy: bool,
    }

    #[async_trait]
    impl EngineAdapter for ProbeOnly {
        fn kind(&self) -> EngineKind {
            self.kind
        }

        async fn search(
            &self,
            _ctx: &EngineContext,
            _request: &SearchRequest,
        ) -> Result<SearchResponse> {
            unreachable!("health tests never search")
        }

        async fn suggest(
            &self,
            _ctx: &EngineContext,
            _request: &SuggestRequest,
        ) -> Result<SuggestResponse> {
            unreachable!("health tests never suggest")
        }

        async fn filter_by_ids(
            &self,
            _ctx: &EngineContext,
            _request: &SearchRequest,
            _ids: &[String],
        ) -> Result<SearchResponse> {
            unreachable!("health tests never filter")
        }

        async fn health(&self) -> bool {
            self.healthy
        }
    }

    fn monitor(simple_up: bool, complex_up: bool) -> HealthMonitor {
        HealthMonitor::new(
            Arc::new(ProbeOnly {
                kind: EngineKind::Simple,
                healthy: simple_up,
            }),
            Arc::new(ProbeOnly {
                kind: EngineKind::Complex,
                healthy: complex_up,
            }),
            None,
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_all_up_is_healthy() {
        let monitor = monitor(true, true);
        monitor.probe_once().await;
        let report = monitor.report();
        assert_eq!(report.status, HealthState::Healthy);
        assert_eq!(report.components.len(), 2);
        assert!(monitor.ready());
    }

    #[tokio::test]
    async fn test_one_engine_down_is_degraded_but_ready() {
        let monitor = monitor(true, false);
        monitor.probe_once().await;
        assert_eq!(monitor.report().status, HealthState::Degraded);
        assert!(monitor.ready());
    }

    #[tokio::test]
    async fn test_both_engines_down_is_unhealthy() {
        let monitor = monitor(false, false);
        monitor.probe_once().await;
        assert_eq!(monitor.report().status, HealthState::Unhealthy);
        assert!(!monitor.ready());
    }

    #[tokio::test]
    async fn test_l2_outage_degrades() {
        use crate::cache::MemoryRemoteCache;
        let l2 = Arc::new(MemoryRemoteCache::new());
        l2.set_failing(true);
        let monitor = HealthMonitor::new(
            Arc::new(ProbeOnly {
                kind: EngineKind::Simple,
                healthy: true,
            }),
            Arc::new(ProbeOnly {
                kind: EngineKind::Complex,
                healthy: true,
            }),
            Some(l2),
            Duration::from_secs(30),
        );
        monitor.probe_once().await;
        let report = monitor.report();
        assert_eq!(report.status, HealthState::Degraded);
        assert!(report
            .components
            .iter()
            .any(|c| c.name == "cache.l2" && !c.healthy));
    }

    #[test]
    fn test_pending_probes_read_as_degraded() {
        let monitor = monitor(true, true);
        assert_eq!(monitor.report().status, HealthState::Degraded);
        assert!(monitor.ready());
    }

    #[test]
    fn test_health_state_wire_form() {
        assert_eq!(
            serde_json::to_string(&HealthState::Degraded).unwrap(),
            r#""degraded""#
        );
    }
}
