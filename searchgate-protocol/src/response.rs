//! Search, suggest, and explain response types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ErrorEnvelope;

/// Search response envelope.
///
/// Returned by `POST /search` for both full and partial results. A partial
/// result (deadline fallback) is still a 200; `performance.partial` and
/// `total.relation` carry the degradation signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Matching documents, best first.
    pub hits: Vec<Hit>,

    /// Total hit count with its relation to the true count.
    pub total: TotalHits,

    /// Pagination state for the returned window.
    pub page: PageInfo,

    /// Facet buckets, present when the complex engine aggregated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<BTreeMap<String, FacetResult>>,

    /// Execution metadata. Always present.
    pub performance: Performance,

    /// Pipeline internals, present when debug output is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<QueryDebug>,

    /// Error envelope for degraded responses that still carry hits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl SearchResponse {
    /// An empty result set.
    ///
    /// `relation` is `gte` because an empty fallback is a lower bound, not a
    /// statement that nothing matched.
    pub fn empty_partial(size: usize, engine: impl Into<String>) -> Self {
        Self {
            hits: Vec::new(),
            total: TotalHits {
                value: 0,
                relation: TotalRelation::Gte,
            },
            page: PageInfo {
                size,
                cursor: None,
                has_more: false,
            },
            facets: None,
            performance: Performance {
                took_ms: 0,
                engine: engine.into(),
                cached: false,
                partial: true,
            },
            debug: None,
            error: None,
        }
    }

    /// Ids of the returned hits, in response order.
    pub fn hit_ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }
}

/// A single returned document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Document identifier, unique within the tenant's index.
    pub id: String,

    /// The (possibly projected) document body.
    pub source: serde_json::Value,

    /// Relevance score. Absent for pure filter matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Field → highlighted fragments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<BTreeMap<String, Vec<String>>>,
}

impl Hit {
    /// Create a hit with a score and no highlight.
    pub fn new(id: impl Into<String>, source: serde_json::Value, score: Option<f64>) -> Self {
        Self {
            id: id.into(),
            source,
            score,
            highlight: None,
        }
    }
}

/// Total hit count and whether it is exact or a lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    pub relation: TotalRelation,
}

impl TotalHits {
    /// An exact total.
    pub fn exact(value: u64) -> Self {
        Self {
            value,
            relation: TotalRelation::Eq,
        }
    }

    /// A lower-bound total (truncated or partial result).
    pub fn at_least(value: u64) -> Self {
        Self {
            value,
            relation: TotalRelation::Gte,
        }
    }
}

/// Relation of `total.value` to the true match count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalRelation {
    /// Exact count.
    Eq,
    /// Lower bound (partial result or engine truncation).
    Gte,
}

/// Pagination state for the returned window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Page size actually served (after clamping).
    pub size: usize,
    /// Cursor for the next window; absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    /// Whether more results exist past this window.
    pub has_more: bool,
}

/// One facet: ordered buckets of key → count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetResult {
    pub buckets: Vec<FacetBucket>,
}

/// A single facet bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetBucket {
    pub key: String,
    pub count: u64,
}

/// Execution metadata attached to every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// Wall-clock time at the handler boundary, in milliseconds. On a cache
    /// hit this measures the hit, not the original production.
    pub took_ms: u64,
    /// Which engine produced the hits: `simple`, `complex`, `hybrid`,
    /// `cache`, `fallback`, or `error`.
    pub engine: String,
    /// Whether this response came from the response cache.
    pub cached: bool,
    /// Whether the dispatcher surfaced a fallback result.
    pub partial: bool,
}

/// Pipeline internals surfaced when debug output is requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDebug {
    pub query_classification: Classification,
    pub cache_key: String,
    pub tenant_routing: TenantRouting,
}

/// Per-tenant routing summary for debug output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRouting {
    pub index: String,
    pub strategy: String,
}

/// Outcome of query classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub complexity_score: f64,
    pub cacheable: bool,
    pub estimated_latency_ms: u64,
    pub reason: String,
}

/// Engine route chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Simple,
    Complex,
    Hybrid,
}

impl QueryType {
    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Simple => "simple",
            QueryType::Complex => "complex",
            QueryType::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggest response: completion candidates plus execution metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub suggestions: Vec<Suggestion>,
    pub performance: Performance,
}

/// A single typeahead candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Completed text.
    pub text: String,
    /// Match quality, engine-defined.
    pub score: f64,
    /// Where the completion came from (e.g. the entity type).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Response for `POST /explain`: what the gateway *would* do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub classification: Classification,
    pub routing: ExplainRouting,
    pub estimated_cost: EstimatedCost,
    pub cache_strategy: CacheStrategy,
}

/// Engine and index the dispatcher would use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainRouting {
    pub engine: String,
    pub index: String,
    pub reason: String,
}

/// Advisory cost estimate from classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatedCost {
    pub complexity_score: f64,
    pub expected_latency_ms: u64,
}

/// How the gateway would cache the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStrategy {
    pub cacheable: bool,
    pub key: String,
    pub ttl_seconds: u64,
}
