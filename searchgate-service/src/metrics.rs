//! Request counters, cache statistics, and latency histograms.
//!
//! All instruments live on a per-process registry owned by the composition
//! root; the daemon renders it in text exposition format on `GET /metrics`.

use crate::cache::CacheTier;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Latency buckets in seconds, tuned to the gateway's SLOs (simple P50
/// ≤ 100 ms, complex P50 ≤ 300 ms, deadline ceiling 2 s).
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.3, 0.5, 0.7, 1.0, 2.0, 5.0,
];

/// Gateway instrument set.
pub struct GatewayMetrics {
    registry: Registry,

    requests_total: IntCounterVec,
    errors_total: IntCounterVec,
    cache_hits_total: IntCounterVec,
    cache_misses_total: IntCounter,
    cache_faults_total: IntCounter,
    stale_serves_total: IntCounter,
    fallbacks_total: IntCounter,
    request_duration_seconds: HistogramVec,
    l1_entries: IntGauge,
    l1_size_hint_bytes: IntGauge,
}

impl GatewayMetrics {
    /// Build and register every instrument.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("searchgate_requests_total", "Requests by endpoint, tenant, and classification"),
            &["endpoint", "tenant", "classification"],
        )?;
        let errors_total = IntCounterVec::new(
            Opts::new("searchgate_errors_total", "Errors by endpoint and code"),
            &["endpoint", "code"],
        )?;
        let cache_hits_total = IntCounterVec::new(
            Opts::new("searchgate_cache_hits_total", "Cache hits by tier"),
            &["tier"],
        )?;
        let cache_misses_total = IntCounter::new(
            "searchgate_cache_misses_total",
            "Cache misses across both tiers",
        )?;
        let cache_faults_total = IntCounter::new(
            "searchgate_cache_faults_total",
            "Swallowed shared-cache failures",
        )?;
        let stale_serves_total = IntCounter::new(
            "searchgate_stale_serves_total",
            "Expired cache entries served by the fallback path",
        )?;
        let fallbacks_total = IntCounter::new(
            "searchgate_fallbacks_total",
            "Requests answered by the deadline fallback chain",
        )?;
        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "searchgate_request_duration_seconds",
                "Handler-boundary latency by classification",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["classification"],
        )?;
        let l1_entries = IntGauge::new(
            "searchgate_cache_l1_entries",
            "Entries currently resident in the in-process cache",
        )?;
        let l1_size_hint_bytes = IntGauge::new(
            "searchgate_cache_l1_size_hint_bytes",
            "Approximate bytes held by the in-process cache",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(cache_misses_total.clone()))?;
        registry.register(Box::new(cache_faults_total.clone()))?;
        registry.register(Box::new(stale_serves_total.clone()))?;
        registry.register(Box::new(fallbacks_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(l1_entries.clone()))?;
        registry.register(Box::new(l1_size_hint_bytes.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            errors_total,
            cache_hits_total,
            cache_misses_total,
            cache_faults_total,
            stale_serves_total,
            fallbacks_total,
            request_duration_seconds,
            l1_entries,
            l1_size_hint_bytes,
        })
    }

    /// Count a handled request.
    pub fn record_request(&self, endpoint: &str, tenant: &str, classification: &str) {
        self.requests_total
            .with_label_values(&[endpoint, tenant, classification])
            .inc();
    }

    /// Count a request that surfaced an error envelope.
    pub fn record_error(&self, endpoint: &str, code: &str) {
        self.errors_total.with_label_values(&[endpoint, code]).inc();
    }

    /// Count a cache hit on the given tier.
    pub fn record_cache_hit(&self, tier: CacheTier) {
        self.cache_hits_total
            .with_label_values(&[tier.as_str()])
            .inc();
    }

    /// Count a full cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses_total.inc();
    }

    /// Count a swallowed L2 failure.
    pub fn record_cache_fault(&self) {
        self.cache_faults_total.inc();
    }

    /// Count an expired entry served by the fallback path.
    pub fn record_stale_serve(&self) {
        self.stale_serves_total.inc();
    }

    /// Count a deadline fallback.
    pub fn record_fallback(&self) {
        self.fallbacks_total.inc();
    }

    /// Observe handler-boundary latency.
    pub fn observe_latency(&self, classification: &str, seconds: f64) {
        self.request_duration_seconds
            .with_label_values(&[classification])
            .observe(seconds);
    }

    /// Publish the current L1 entry count.
    pub fn set_l1_entries(&self, entries: usize) {
        self.l1_entries.set(entries as i64);
    }

    /// Publish the approximate L1 footprint.
    pub fn set_l1_size_hint(&self, bytes: usize) {
        self.l1_size_hint_bytes.set(bytes as i64);
    }

    /// Render every instrument in text exposition format.
    pub fn encode_text(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "metrics encoding failed");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl std::fmt::Debug for GatewayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayMetrics").finish_non_exhaustive()
    }
}
