//! Request pipeline core for the searchgate routing gateway.
//!
//! This crate implements the gateway's request pipeline: tenant resolution
//! and authorization, deterministic fingerprinting, two-level cache
//! lookup/fill, query classification, engine dispatch under a deadline,
//! hybrid merge, partial-result fallback, and response assembly.
//!
//! # Architecture
//!
//! - [`Gateway`]: composition root and entry point for search, suggest,
//!   and explain
//! - [`engine::EngineAdapter`]: capability trait over the two backing
//!   engines
//! - [`dispatch::Dispatcher`]: plan execution, deadlines, fallback
//! - [`cache::TieredCache`]: L1 LRU + optional shared L2
//! - [`classify`]: pure request classification
//! - [`tenant`]: header resolution, ACL injection, routing memo
//! - [`metrics`] / [`health`]: observability surfaces
//!
//! # Example
//!
//! ```ignore
//! use searchgate_service::{Gateway, GatewayConfig};
//!
//! let gateway = Gateway::new(simple, complex, l2, routing, metrics, GatewayConfig::default());
//! let response = gateway.search(Some("t1"), None, &request).await?;
//! ```

pub mod cache;
pub mod classify;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod health;
pub mod metrics;
pub mod tenant;

pub use cache::{CacheConfig, MemoryRemoteCache, RemoteCache, TieredCache};
pub use classify::{classify, ClassifierConfig};
pub use dispatch::{DispatchConfig, Dispatcher};
pub use engine::{
    ComplexAdapter, ComplexEngineConfig, EngineAdapter, EngineContext, EngineKind, SimpleAdapter,
    SimpleEngineConfig,
};
pub use error::{GatewayError, Result};
pub use health::{HealthMonitor, HealthReport, HealthState};
pub use metrics::GatewayMetrics;
pub use tenant::{
    apply_authorization, resolve_tenant, Claims, ResolverConfig, RoutingSource, RoutingStrategy,
    RoutingTable, StaticRoutingSource,
};

use crate::cache::CacheTier;
use searchgate_protocol::{
    CacheStrategy, Classification, EstimatedCost, ExplainResponse, ExplainRouting, Performance,
    QueryDebug, QueryType, SearchRequest, SearchResponse, SuggestRequest, SuggestResponse,
    TenantRouting,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cache TTL policy applied by the handler, not the cache.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    /// Hit count at or below which a result is "small".
    pub small_result_max_hits: usize,
    /// TTL for small result sets (longest).
    pub small_result_ttl: Duration,
    /// TTL for simple responses.
    pub simple_ttl: Duration,
    /// TTL for everything else (shortest).
    pub default_ttl: Duration,
    /// Fixed TTL for suggest responses.
    pub suggest_ttl: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            small_result_max_hits: 3,
            small_result_ttl: Duration::from_secs(600),
            simple_ttl: Duration::from_secs(300),
            default_ttl: Duration::from_secs(120),
            suggest_ttl: Duration::from_secs(300),
        }
    }
}

/// Gateway configuration: one struct per concern, all defaultable.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub classifier: ClassifierConfig,
    pub dispatch: DispatchConfig,
    pub cache: CacheConfig,
    pub resolver: ResolverConfig,
    pub ttl: TtlPolicy,
    pub shared_index: SharedIndexName,
}

/// Name of the shared index, defaulted so `GatewayConfig::default()` works.
#[derive(Debug, Clone)]
pub struct SharedIndexName(pub String);

impl Default for SharedIndexName {
    fn default() -> Self {
        Self("search-shared".to_string())
    }
}

/// The gateway: orchestrates the pipeline for `/search`, `/suggest`, and
/// `/explain`.
pub struct Gateway {
    classifier: ClassifierConfig,
    resolver: ResolverConfig,
    ttl: TtlPolicy,
    routing: RoutingTable,
    cache: Arc<TieredCache>,
    dispatcher: Dispatcher,
    metrics: Arc<GatewayMetrics>,
}

impl Gateway {
    /// Assemble the pipeline. All handles come from the caller so startup
    /// owns construction and teardown.
    pub fn new(
        simple: Arc<dyn EngineAdapter>,
        complex: Arc<dyn EngineAdapter>,
        l2: Option<Arc<dyn RemoteCache>>,
        routing_source: Arc<dyn RoutingSource>,
        metrics: Arc<GatewayMetrics>,
        config: GatewayConfig,
    ) -> Self {
        let cache = Arc::new(TieredCache::new(&config.cache, l2));
        let dispatcher = Dispatcher::new(simple, complex, config.dispatch);
        let routing = RoutingTable::new(routing_source, config.shared_index.0.clone());
        Self {
            classifier: config.classifier,
            resolver: config.resolver,
            ttl: config.ttl,
            routing,
            cache,
            dispatcher,
            metrics,
        }
    }

    /// The tiered cache, for the stats surface and admin operations.
    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    /// The instrument set this gateway records into.
    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    /// Full `/search` pipeline.
    ///
    /// Strict order: resolve tenant → authorize → fingerprint → cache read
    /// → classify → dispatch under deadline → conditional cache write →
    /// assemble → record. A cache hit short-circuits after the read with
    /// `performance.cached = true` and `took_ms` measured here, not at
    /// production time.
    pub async fn search(
        &self,
        tenant_header: Option<&str>,
        bearer: Option<&str>,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        let tenant = resolve_tenant(tenant_header)?;
        let claims = decode_claims(bearer)?;
        request
            .validate()
            .map_err(GatewayError::bad_request)?;

        let effective = apply_authorization(request, &tenant, &claims, &self.resolver)?;
        let fingerprint = fingerprint::search_fingerprint(&tenant, &effective);

        let lookup = self.cache.get(&fingerprint).await;
        if lookup.l2_fault {
            self.metrics.record_cache_fault();
        }
        if let Some(value) = lookup.value {
            match serde_json::from_value::<SearchResponse>((*value).clone()) {
                Ok(mut response) => {
                    self.metrics
                        .record_cache_hit(lookup.tier.unwrap_or(CacheTier::L1));
                    self.metrics.record_request("search", &tenant, "cache");
                    response.performance.cached = true;
                    response.performance.took_ms = elapsed_ms(started);
                    tracing::info!(
                        %tenant,
                        fingerprint,
                        elapsed_ms = response.performance.took_ms,
                        "search served from cache"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    tracing::warn!(fingerprint, error = %e, "dropping malformed cache entry");
                    self.cache.delete(&fingerprint).await;
                }
            }
        }
        self.metrics.record_cache_miss();

        let classification = classify(&effective, &self.classifier);
        let routing = self.routing.routing(&tenant);

        let outcome = self
            .dispatcher
            .dispatch(
                &classification,
                &tenant,
                &routing.index_name,
                &effective,
                &fingerprint,
                &self.cache,
            )
            .await?;

        if outcome.timed_out {
            self.metrics.record_fallback();
        }
        if outcome.served_stale {
            self.metrics.record_stale_serve();
        }

        let mut response = outcome.response;
        response.performance = Performance {
            took_ms: elapsed_ms(started),
            engine: outcome.engine.to_string(),
            cached: false,
            partial: outcome.partial,
        };
        response.debug = Some(QueryDebug {
            query_classification: classification.clone(),
            cache_key: fingerprint.clone(),
            tenant_routing: TenantRouting {
                index: routing.index_name.clone(),
                strategy: routing.strategy.as_str().to_string(),
            },
        });

        if classification.cacheable && !outcome.partial {
            if let Ok(value) = serde_json::to_value(&response) {
                let ttl = self.ttl_for(&classification, &response);
                let write = self.cache.set(&fingerprint, Arc::new(value), ttl).await;
                if write.l2_fault {
                    self.metrics.record_cache_fault();
                }
            }
        }

        let label = classification.query_type.as_str();
        self.metrics.record_request("search", &tenant, label);
        self.metrics
            .observe_latency(label, started.elapsed().as_secs_f64());
        self.metrics.set_l1_entries(self.cache.l1().len());
        tracing::info!(
            %tenant,
            fingerprint,
            classification = label,
            engine = outcome.engine,
            partial = outcome.partial,
            elapsed_ms = response.performance.took_ms,
            "search completed"
        );

        Ok(response)
    }

    /// `/suggest` pipeline: same skeleton as search, always routed to the
    /// simple adapter, fixed cache TTL. A timed-out completion degrades to
    /// an empty partial list rather than an error.
    pub async fn suggest(
        &self,
        tenant_header: Option<&str>,
        bearer: Option<&str>,
        request: &SuggestRequest,
    ) -> Result<SuggestResponse> {
        let started = Instant::now();
        let tenant = resolve_tenant(tenant_header)?;
        let claims = decode_claims(bearer)?;
        if !claims.permits_tenant(&tenant) {
            return Err(GatewayError::Forbidden {
                message: format!("token does not grant access to tenant '{tenant}'"),
            });
        }
        request
            .validate()
            .map_err(GatewayError::bad_request)?;

        let fingerprint = fingerprint::suggest_fingerprint(&tenant, request);

        let lookup = self.cache.get(&fingerprint).await;
        if lookup.l2_fault {
            self.metrics.record_cache_fault();
        }
        if let Some(value) = lookup.value {
            if let Ok(mut response) = serde_json::from_value::<SuggestResponse>((*value).clone()) {
                self.metrics
                    .record_cache_hit(lookup.tier.unwrap_or(CacheTier::L1));
                self.metrics.record_request("suggest", &tenant, "cache");
                response.performance.cached = true;
                response.performance.took_ms = elapsed_ms(started);
                return Ok(response);
            }
            self.cache.delete(&fingerprint).await;
        }
        self.metrics.record_cache_miss();

        let routing = self.routing.routing(&tenant);
        let ctx = EngineContext::new(
            tenant.clone(),
            routing.index_name.clone(),
            self.dispatcher.clamp_timeout(None),
        );

        let mut response = match self.dispatcher.simple_adapter().suggest(&ctx, request).await {
            Ok(response) => response,
            Err(GatewayError::Timeout { .. }) => {
                self.metrics.record_fallback();
                SuggestResponse {
                    suggestions: Vec::new(),
                    performance: Performance {
                        took_ms: 0,
                        engine: "fallback".to_string(),
                        cached: false,
                        partial: true,
                    },
                }
            }
            Err(other) => return Err(other),
        };

        let partial = response.performance.partial;
        response.performance.took_ms = elapsed_ms(started);
        response.performance.cached = false;

        if !partial {
            if let Ok(value) = serde_json::to_value(&response) {
                let write = self
                    .cache
                    .set(&fingerprint, Arc::new(value), self.ttl.suggest_ttl)
                    .await;
                if write.l2_fault {
                    self.metrics.record_cache_fault();
                }
            }
        }

        self.metrics.record_request("suggest", &tenant, "suggest");
        self.metrics
            .observe_latency("suggest", started.elapsed().as_secs_f64());
        Ok(response)
    }

    /// `/explain` pipeline: classification, routing, and cache strategy for
    /// a request — without touching the cache or any engine.
    pub async fn explain(
        &self,
        tenant_header: Option<&str>,
        bearer: Option<&str>,
        request: &SearchRequest,
    ) -> Result<ExplainResponse> {
        let tenant = resolve_tenant(tenant_header)?;
        let claims = decode_claims(bearer)?;
        request
            .validate()
            .map_err(GatewayError::bad_request)?;

        let effective = apply_authorization(request, &tenant, &claims, &self.resolver)?;
        let classification = classify(&effective, &self.classifier);
        let fingerprint = fingerprint::search_fingerprint(&tenant, &effective);
        let routing = self.routing.routing(&tenant);

        let ttl_seconds = if classification.cacheable {
            match classification.query_type {
                QueryType::Simple => self.ttl.simple_ttl.as_secs(),
                _ => self.ttl.default_ttl.as_secs(),
            }
        } else {
            0
        };

        self.metrics
            .record_request("explain", &tenant, classification.query_type.as_str());

        Ok(ExplainResponse {
            routing: ExplainRouting {
                engine: classification.query_type.as_str().to_string(),
                index: routing.index_name.clone(),
                reason: match routing.strategy {
                    tenant::IndexStrategy::Shared => {
                        "tenant routes to the shared index".to_string()
                    }
                    tenant::IndexStrategy::Dedicated => {
                        "tenant is marked for a dedicated index".to_string()
                    }
                },
            },
            estimated_cost: EstimatedCost {
                complexity_score: classification.complexity_score,
                expected_latency_ms: classification.estimated_latency_ms,
            },
            cache_strategy: CacheStrategy {
                cacheable: classification.cacheable,
                key: fingerprint,
                ttl_seconds,
            },
            classification,
        })
    }

    fn ttl_for(&self, classification: &Classification, response: &SearchResponse) -> Duration {
        if response.hits.len() <= self.ttl.small_result_max_hits {
            self.ttl.small_result_ttl
        } else if classification.query_type == QueryType::Simple {
            self.ttl.simple_ttl
        } else {
            self.ttl.default_ttl
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("cache", &self.cache)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

fn decode_claims(bearer: Option<&str>) -> Result<Claims> {
    match bearer {
        Some(token) => Claims::from_bearer(token),
        None => Ok(Claims::default()),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
