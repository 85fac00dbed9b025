//! Engine adapters.
//!
//! Both backing engines sit behind one capability set — search, suggest,
//! filter-by-ids, health — and the dispatcher is polymorphic over exactly
//! that set. Adapters own the translation between the uniform request and
//! each engine's native wire format; by the time a request reaches an
//! adapter, the tenant filter and any ACL filters are already present.

mod complex;
mod simple;

pub use complex::{ComplexAdapter, ComplexEngineConfig};
pub use simple::{SimpleAdapter, SimpleEngineConfig};

use crate::error::Result;
use async_trait::async_trait;
use searchgate_protocol::{SearchRequest, SearchResponse, SuggestRequest, SuggestResponse};
use std::time::Duration;

/// Which engine an adapter fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Key-value / prefix engine: exact filters, typeahead, low latency.
    Simple,
    /// Full-text / faceted engine: scoring, highlighting, aggregations.
    Complex,
}

impl EngineKind {
    /// Stable label for metrics, logs, and `performance.engine`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Simple => "simple",
            EngineKind::Complex => "complex",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call context every engine operation carries.
///
/// `timeout` is the remaining request budget at the moment the call is
/// issued; adapters must not exceed it.
#[derive(Debug, Clone)]
pub struct EngineContext {
    /// Tenant the call is scoped to.
    pub tenant: String,
    /// Index the tenant routes to.
    pub index: String,
    /// Remaining deadline budget for this call.
    pub timeout: Duration,
}

impl EngineContext {
    pub fn new(tenant: impl Into<String>, index: impl Into<String>, timeout: Duration) -> Self {
        Self {
            tenant: tenant.into(),
            index: index.into(),
            timeout,
        }
    }
}

/// Uniform interface over the backing engines.
#[async_trait]
pub trait EngineAdapter: Send + Sync + std::fmt::Debug {
    /// Which engine this adapter fronts.
    fn kind(&self) -> EngineKind;

    /// Execute a search. The request is already tenant-scoped.
    async fn search(&self, ctx: &EngineContext, request: &SearchRequest)
        -> Result<SearchResponse>;

    /// Typeahead completion. Only meaningful on the simple engine; the
    /// complex adapter may answer with an empty candidate list.
    async fn suggest(
        &self,
        ctx: &EngineContext,
        request: &SuggestRequest,
    ) -> Result<SuggestResponse>;

    /// Re-run the request's exact-match filters restricted to `ids`,
    /// returning the surviving subset. Hybrid-plan support.
    async fn filter_by_ids(
        &self,
        ctx: &EngineContext,
        request: &SearchRequest,
        ids: &[String],
    ) -> Result<SearchResponse>;

    /// Cheap liveness probe. Used by the health monitor only; the
    /// dispatcher never consults it per request.
    async fn health(&self) -> bool;
}
