//! Plan execution under a wall-clock deadline.
//!
//! The dispatcher owns the concurrency and timeout discipline: it starts
//! the deadline clock when engine work begins, hands every engine call the
//! remaining budget, and turns deadline expiry into a fallback result —
//! never an error. Non-timeout engine failures propagate unchanged so the
//! handler can map them.

use crate::cache::TieredCache;
use crate::engine::{EngineAdapter, EngineContext};
use crate::error::{GatewayError, Result};
use searchgate_protocol::{
    Classification, Hit, PageInfo, QueryType, SearchRequest, SearchResponse, TotalHits,
    TotalRelation, DEFAULT_TIMEOUT_MS, MAX_PAGE_SIZE, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Deadline applied when the request carries no `timeout_ms`.
    pub default_timeout_ms: u64,
    /// Clamp bounds for the requested deadline.
    pub min_timeout_ms: u64,
    pub max_timeout_ms: u64,
    /// Page-size multiplier for the complex call of a hybrid plan.
    pub hybrid_overfetch_factor: usize,
    /// Budget for the degraded plan after the main deadline fires.
    pub fallback_timeout: Duration,
    /// Page-size ceiling for the degraded plan.
    pub fallback_page_size: usize,
    /// Indexed fields whose exact-match filters trigger the hybrid
    /// id-pruning pass.
    pub hybrid_filter_fields: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            min_timeout_ms: MIN_TIMEOUT_MS,
            max_timeout_ms: MAX_TIMEOUT_MS,
            hybrid_overfetch_factor: 3,
            fallback_timeout: Duration::from_millis(200),
            fallback_page_size: 10,
            hybrid_filter_fields: vec![
                "entity".to_string(),
                "status".to_string(),
                "facets.category".to_string(),
            ],
        }
    }
}

/// What the dispatcher produced, and how.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub response: SearchResponse,
    /// Engine label for `performance.engine`.
    pub engine: &'static str,
    /// Whether this is a fallback result.
    pub partial: bool,
    /// Whether the deadline fired.
    pub timed_out: bool,
    /// Whether an expired cache entry was served.
    pub served_stale: bool,
}

impl DispatchOutcome {
    fn full(response: SearchResponse, engine: &'static str) -> Self {
        Self {
            response,
            engine,
            partial: false,
            timed_out: false,
            served_stale: false,
        }
    }
}

/// Executes classified plans against the two engine adapters.
pub struct Dispatcher {
    simple: Arc<dyn EngineAdapter>,
    complex: Arc<dyn EngineAdapter>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        simple: Arc<dyn EngineAdapter>,
        complex: Arc<dyn EngineAdapter>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            simple,
            complex,
            config,
        }
    }

    /// The simple adapter, for the suggest path.
    pub fn simple_adapter(&self) -> &Arc<dyn EngineAdapter> {
        &self.simple
    }

    /// The complex adapter, for health probing.
    pub fn complex_adapter(&self) -> &Arc<dyn EngineAdapter> {
        &self.complex
    }

    /// Clamp the requested deadline into the configured range.
    pub fn clamp_timeout(&self, requested: Option<u64>) -> Duration {
        let ms = requested
            .unwrap_or(self.config.default_timeout_ms)
            .clamp(self.config.min_timeout_ms, self.config.max_timeout_ms);
        Duration::from_millis(ms)
    }

    /// Execute the classified plan under the request deadline.
    ///
    /// Deadline expiry cancels in-flight engine work (the plan future is
    /// dropped) and runs the fallback chain; it never returns an error.
    /// Other engine failures propagate to the handler.
    pub async fn dispatch(
        &self,
        classification: &Classification,
        tenant: &str,
        index: &str,
        request: &SearchRequest,
        fingerprint: &str,
        cache: &TieredCache,
    ) -> Result<DispatchOutcome> {
        let budget = self.clamp_timeout(request.options.timeout_ms);
        let deadline = Instant::now() + budget;

        let plan = self.run_plan(classification.query_type, tenant, index, request, deadline);
        match tokio::time::timeout(budget, plan).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(GatewayError::Timeout { elapsed_ms })) => {
                tracing::debug!(tenant, fingerprint, elapsed_ms, "engine call timed out");
                Ok(self.fallback(tenant, index, request, fingerprint, cache).await)
            }
            Err(_elapsed) => {
                tracing::debug!(
                    tenant,
                    fingerprint,
                    budget_ms = budget.as_millis() as u64,
                    "deadline fired, cancelling plan"
                );
                Ok(self.fallback(tenant, index, request, fingerprint, cache).await)
            }
            Ok(Err(other)) => Err(other),
        }
    }

    async fn run_plan(
        &self,
        query_type: QueryType,
        tenant: &str,
        index: &str,
        request: &SearchRequest,
        deadline: Instant,
    ) -> Result<DispatchOutcome> {
        match query_type {
            QueryType::Simple => {
                let ctx = EngineContext::new(tenant, index, remaining(deadline)?);
                let response = self.simple.search(&ctx, request).await?;
                Ok(DispatchOutcome::full(response, "simple"))
            }
            QueryType::Complex => {
                let ctx = EngineContext::new(tenant, index, remaining(deadline)?);
                let response = self.complex.search(&ctx, request).await?;
                Ok(DispatchOutcome::full(response, "complex"))
            }
            QueryType::Hybrid => self.hybrid(tenant, index, request, deadline).await,
        }
    }

    /// Hybrid plan: complex ranking pruned by simple exact-match filters.
    ///
    /// The complex engine is asked for an overfetched window. If the
    /// request carries at least one exact-match filter on a configured
    /// indexed field, the simple engine re-checks the returned ids and the
    /// lists are intersected in complex order, truncated to the requested
    /// page. Without such a filter the complex result stands alone.
    async fn hybrid(
        &self,
        tenant: &str,
        index: &str,
        request: &SearchRequest,
        deadline: Instant,
    ) -> Result<DispatchOutcome> {
        let requested = request.page.size.min(MAX_PAGE_SIZE);

        let mut overfetched = request.clone();
        overfetched.page.size = requested.saturating_mul(self.config.hybrid_overfetch_factor);

        let ctx = EngineContext::new(tenant, index, remaining(deadline)?);
        let complex_response = self.complex.search(&ctx, &overfetched).await?;

        let has_prunable_filter = request.filters.iter().any(|(field, value)| {
            value.is_exact() && self.config.hybrid_filter_fields.contains(field)
        });
        if !has_prunable_filter || complex_response.hits.is_empty() {
            let response = truncate_window(complex_response, requested);
            return Ok(DispatchOutcome::full(response, "complex"));
        }

        let ids: Vec<String> = complex_response
            .hits
            .iter()
            .map(|hit| hit.id.clone())
            .collect();

        let ctx = EngineContext::new(tenant, index, remaining(deadline)?);
        let simple_response = self.simple.filter_by_ids(&ctx, request, &ids).await?;
        let surviving: HashSet<&str> = simple_response
            .hits
            .iter()
            .map(|hit| hit.id.as_str())
            .collect();

        // Complex order carries through the intersection, so the engine's
        // relevance ranking (and its tie-breaks) are preserved verbatim.
        let window_truncated = complex_response.page.has_more;
        let complex_relation = complex_response.total.relation;
        let facets = complex_response.facets;
        let intersected: Vec<Hit> = complex_response
            .hits
            .into_iter()
            .filter(|hit| surviving.contains(hit.id.as_str()))
            .collect();

        let overflow = intersected.len() > requested;
        let matched = intersected.len() as u64;
        let hits: Vec<Hit> = intersected.into_iter().take(requested).collect();

        let relation = if window_truncated || complex_relation == TotalRelation::Gte {
            // The overfetch window did not see every complex match, so the
            // intersection count is only a floor.
            TotalRelation::Gte
        } else {
            TotalRelation::Eq
        };

        let response = SearchResponse {
            hits,
            total: TotalHits {
                value: matched,
                relation,
            },
            page: PageInfo {
                size: requested,
                cursor: None,
                has_more: overflow || window_truncated,
            },
            facets,
            performance: searchgate_protocol::Performance {
                took_ms: 0,
                engine: "hybrid".to_string(),
                cached: false,
                partial: false,
            },
            debug: None,
            error: None,
        };
        Ok(DispatchOutcome::full(response, "hybrid"))
    }

    /// Fallback chain after deadline expiry. Never errors.
    async fn fallback(
        &self,
        tenant: &str,
        index: &str,
        request: &SearchRequest,
        fingerprint: &str,
        cache: &TieredCache,
    ) -> DispatchOutcome {
        // 1. Any same-key cache entry, fresh or expired.
        if let Some(value) = cache.get_stale(fingerprint) {
            if let Ok(mut response) = serde_json::from_value::<SearchResponse>((*value).clone()) {
                response.performance.partial = true;
                response.total.relation = TotalRelation::Gte;
                tracing::debug!(tenant, fingerprint, "serving cached entry as fallback");
                return DispatchOutcome {
                    response,
                    engine: "cache",
                    partial: true,
                    timed_out: true,
                    served_stale: true,
                };
            }
        }

        // 2. Degraded plan: structured filters only, tiny page, tight budget.
        let mut degraded = request.clone();
        degraded.q = None;
        degraded.page.size = degraded.page.size.min(self.config.fallback_page_size);
        degraded.page.cursor = None;

        let ctx = EngineContext::new(tenant, index, self.config.fallback_timeout);
        let attempt = tokio::time::timeout(
            self.config.fallback_timeout,
            self.simple.search(&ctx, &degraded),
        )
        .await;

        if let Ok(Ok(mut response)) = attempt {
            response.total.relation = TotalRelation::Gte;
            response.performance.partial = true;
            return DispatchOutcome {
                response,
                engine: "fallback",
                partial: true,
                timed_out: true,
                served_stale: false,
            };
        }

        // 3. Empty lower-bound result.
        DispatchOutcome {
            response: SearchResponse::empty_partial(
                request.page.size.min(self.config.fallback_page_size),
                "fallback",
            ),
            engine: "fallback",
            partial: true,
            timed_out: true,
            served_stale: false,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("simple", &self.simple)
            .field("complex", &self.complex)
            .field("config", &self.config)
            .finish()
    }
}

/// Budget left before `deadline`; `Timeout` once exhausted.
fn remaining(deadline: Instant) -> Result<Duration> {
    let now = Instant::now();
    if now >= deadline {
        return Err(GatewayError::Timeout { elapsed_ms: 0 });
    }
    Ok(deadline - now)
}

fn truncate_window(mut response: SearchResponse, size: usize) -> SearchResponse {
    if response.hits.len() > size {
        response.hits.truncate(size);
        response.page.has_more = true;
    }
    response.page.size = size;
    response
}
