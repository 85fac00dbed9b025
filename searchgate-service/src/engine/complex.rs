//! Adapter for the complex (full-text / faceted) engine.
//!
//! Translates the uniform request into the engine's native search DSL:
//! boosted multi-field text queries with phrase / prefix / fuzzy /
//! cross-field modes picked from the shape of `q`, term and range filters,
//! sorting, highlighting, and facet aggregations (configured term facets
//! plus a date histogram and an amount range ladder). Pagination is
//! from/size behind the opaque cursor.

use super::simple::placeholder_performance;
use super::{EngineAdapter, EngineContext, EngineKind};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use searchgate_protocol::{
    decode_cursor, encode_cursor, FacetBucket, FacetResult, FilterValue, Hit, PageInfo,
    SearchRequest, SearchResponse, SortOrder, SuggestRequest, SuggestResponse, TotalHits,
    TotalRelation, MAX_PAGE_SIZE,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Complex-engine adapter configuration.
#[derive(Debug, Clone)]
pub struct ComplexEngineConfig {
    /// Base URL of the engine, e.g. `http://fulltext-engine:9200`.
    pub endpoint: String,
    /// Hard ceiling on any single engine call.
    pub request_timeout: Duration,
    /// Retries on connection errors (never on timeouts).
    pub retry: u32,
    /// Bearer token presented to the engine, when it requires one.
    pub auth_token: Option<String>,
    /// Boosted fields searched by text queries, `field^boost` form.
    pub text_fields: Vec<String>,
    /// Fields faceted on every complex search.
    pub facet_fields: Vec<String>,
    /// Field for the date histogram facet.
    pub date_histogram_field: String,
    /// Calendar interval of the date histogram.
    pub date_histogram_interval: String,
    /// Numeric field for the amount range facet.
    pub amount_field: String,
    /// Ascending bucket boundaries for the amount facet.
    pub amount_ranges: Vec<f64>,
    /// Highlight fragment size in characters.
    pub highlight_fragment_size: u32,
    /// Highlight fragments per field.
    pub highlight_fragments: u32,
}

impl Default for ComplexEngineConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9200".to_string(),
            request_timeout: Duration::from_secs(2),
            retry: 1,
            auth_token: None,
            text_fields: vec![
                "title^3".to_string(),
                "body".to_string(),
                "customer_name^2".to_string(),
                "keywords^2".to_string(),
            ],
            facet_fields: vec![
                "entity".to_string(),
                "status".to_string(),
                "facets.category".to_string(),
            ],
            date_histogram_field: "dates.created_at".to_string(),
            date_histogram_interval: "month".to_string(),
            amount_field: "numeric.amount".to_string(),
            amount_ranges: vec![100.0, 1_000.0, 10_000.0],
            highlight_fragment_size: 150,
            highlight_fragments: 3,
        }
    }
}

/// Reqwest-backed adapter for the complex engine.
pub struct ComplexAdapter {
    client: reqwest::Client,
    config: ComplexEngineConfig,
}

impl ComplexAdapter {
    pub fn new(client: reqwest::Client, config: ComplexEngineConfig) -> Self {
        Self { client, config }
    }

    async fn execute(&self, index: &str, body: &Value, timeout: Duration) -> Result<FtResponse> {
        let url = format!(
            "{}/{index}/_search",
            self.config.endpoint.trim_end_matches('/')
        );
        let timeout = timeout.min(self.config.request_timeout);

        let mut attempts = 0;
        loop {
            let mut builder = self.client.post(&url).timeout(timeout).json(body);
            if let Some(token) = &self.config.auth_token {
                builder = builder.bearer_auth(token);
            }
            let result = builder.send().await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<FtResponse>().await.map_err(|e| {
                            GatewayError::engine("complex", format!("malformed response: {e}"))
                        });
                    }
                    let message = response.text().await.unwrap_or_default();
                    return Err(GatewayError::engine(
                        "complex",
                        format!("status {status}: {message}"),
                    ));
                }
                Err(e) if e.is_timeout() => {
                    return Err(GatewayError::Timeout {
                        elapsed_ms: timeout.as_millis() as u64,
                    });
                }
                Err(e) if e.is_connect() && attempts < self.config.retry => {
                    attempts += 1;
                    tracing::debug!(%url, attempt = attempts, "complex engine connect retry");
                }
                Err(e) => {
                    return Err(GatewayError::engine("complex", e.to_string()));
                }
            }
        }
    }
}

impl std::fmt::Debug for ComplexAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplexAdapter")
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

#[async_trait]
impl EngineAdapter for ComplexAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Complex
    }

    async fn search(
        &self,
        ctx: &EngineContext,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        let (body, from, size) = build_search_body(request, None, &self.config)?;
        let raw = self.execute(&ctx.index, &body, ctx.timeout).await?;
        Ok(translate_response(raw, from, size))
    }

    async fn suggest(
        &self,
        _ctx: &EngineContext,
        _request: &SuggestRequest,
    ) -> Result<SuggestResponse> {
        // Typeahead is the simple engine's specialty; the gateway never
        // routes suggest here.
        Ok(SuggestResponse {
            suggestions: Vec::new(),
            performance: placeholder_performance("complex"),
        })
    }

    async fn filter_by_ids(
        &self,
        ctx: &EngineContext,
        request: &SearchRequest,
        ids: &[String],
    ) -> Result<SearchResponse> {
        let (body, from, size) = build_search_body(request, Some(ids), &self.config)?;
        let raw = self.execute(&ctx.index, &body, ctx.timeout).await?;
        Ok(translate_response(raw, from, size))
    }

    async fn health(&self) -> bool {
        let url = format!("{}/_cluster/ping", self.config.endpoint.trim_end_matches('/'));
        matches!(
            self.client
                .get(&url)
                .timeout(Duration::from_secs(1))
                .send()
                .await,
            Ok(response) if response.status().is_success()
        )
    }
}

/// Shape of the free-text query, picked from its markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryMode {
    /// Quoted → exact phrase.
    Phrase,
    /// `*` present → wildcard query string.
    Wildcard,
    /// Trailing `~` → fuzzy matching.
    Fuzzy,
    /// Several words → cross-field relevance.
    CrossFields,
    /// Single term → best-fields with prefix expansion.
    Prefix,
}

fn query_mode(q: &str) -> QueryMode {
    if q.matches('"').count() >= 2 {
        QueryMode::Phrase
    } else if q.contains('*') {
        QueryMode::Wildcard
    } else if q.split_whitespace().any(|w| w.ends_with('~')) {
        QueryMode::Fuzzy
    } else if q.split_whitespace().count() > 1 {
        QueryMode::CrossFields
    } else {
        QueryMode::Prefix
    }
}

/// Build the native search body plus the resolved (from, size) window.
fn build_search_body(
    request: &SearchRequest,
    ids: Option<&[String]>,
    config: &ComplexEngineConfig,
) -> Result<(Value, u64, usize)> {
    let from = match &request.page.cursor {
        Some(cursor) => {
            decode_cursor("complex", cursor)
                .map_err(|e| GatewayError::bad_request(e.to_string()))?
                .offset
        }
        None => 0,
    };
    let size = match ids {
        Some(ids) => ids.len().max(1),
        // Overfetched hybrid windows may exceed a page; cap generously.
        None => request.page.size.min(MAX_PAGE_SIZE * 3),
    };

    let mut must = Vec::new();
    if let Some(q) = request.free_text() {
        must.push(text_query(q, config));
    }

    let mut filter = Vec::new();
    for (field, value) in &request.filters {
        filter.push(match value {
            FilterValue::Scalar(v) => json!({"term": {field: v}}),
            FilterValue::Terms(vs) => json!({"terms": {field: vs}}),
            FilterValue::Range(r) => {
                let mut bounds = Map::new();
                for (name, bound) in [("gte", &r.gte), ("lte", &r.lte), ("gt", &r.gt), ("lt", &r.lt)]
                {
                    if let Some(bound) = bound {
                        bounds.insert(name.to_string(), bound.clone());
                    }
                }
                json!({"range": {field: bounds}})
            }
        });
    }
    if let Some(ids) = ids {
        filter.push(json!({"ids": {"values": ids}}));
    }

    let mut body = Map::new();
    body.insert(
        "query".to_string(),
        json!({"bool": {"must": must, "filter": filter}}),
    );
    body.insert("from".to_string(), json!(from));
    body.insert("size".to_string(), json!(size));
    body.insert("track_total_hits".to_string(), json!(true));

    if !request.sort.is_empty() {
        let sort: Vec<Value> = request
            .sort
            .iter()
            .map(|key| {
                let order = match key.order {
                    SortOrder::Asc => "asc",
                    SortOrder::Desc => "desc",
                };
                json!({&key.field: {"order": order}})
            })
            .collect();
        body.insert("sort".to_string(), Value::Array(sort));
    }

    if let Some(fields) = &request.fields {
        body.insert(
            "_source".to_string(),
            json!(fields.iter().collect::<Vec<_>>()),
        );
    }

    if request.options.highlight {
        let fields: Map<String, Value> = config
            .text_fields
            .iter()
            .map(|f| (strip_boost(f).to_string(), json!({})))
            .collect();
        body.insert(
            "highlight".to_string(),
            json!({
                "fields": fields,
                "fragment_size": config.highlight_fragment_size,
                "number_of_fragments": config.highlight_fragments,
            }),
        );
    }

    body.insert("aggs".to_string(), build_aggs(config));

    Ok((Value::Object(body), from, size))
}

fn text_query(q: &str, config: &ComplexEngineConfig) -> Value {
    match query_mode(q) {
        QueryMode::Phrase => {
            let phrase = q.trim_matches('"');
            json!({"multi_match": {
                "query": phrase,
                "fields": config.text_fields,
                "type": "phrase",
            }})
        }
        QueryMode::Wildcard => json!({"query_string": {
            "query": q,
            "fields": config.text_fields,
            "analyze_wildcard": true,
        }}),
        QueryMode::Fuzzy => {
            let stripped: String = q
                .split_whitespace()
                .map(|w| w.trim_end_matches('~'))
                .collect::<Vec<_>>()
                .join(" ");
            json!({"multi_match": {
                "query": stripped,
                "fields": config.text_fields,
                "fuzziness": "AUTO",
            }})
        }
        QueryMode::CrossFields => json!({"multi_match": {
            "query": q,
            "fields": config.text_fields,
            "type": "cross_fields",
            "operator": "and",
        }}),
        QueryMode::Prefix => json!({"multi_match": {
            "query": q,
            "fields": config.text_fields,
            "type": "bool_prefix",
        }}),
    }
}

fn build_aggs(config: &ComplexEngineConfig) -> Value {
    let mut aggs = Map::new();
    for field in &config.facet_fields {
        aggs.insert(field.clone(), json!({"terms": {"field": field, "size": 20}}));
    }
    aggs.insert(
        config.date_histogram_field.clone(),
        json!({"date_histogram": {
            "field": config.date_histogram_field,
            "calendar_interval": config.date_histogram_interval,
        }}),
    );
    let ranges: Vec<Value> = amount_ranges(&config.amount_ranges);
    aggs.insert(
        config.amount_field.clone(),
        json!({"range": {"field": config.amount_field, "ranges": ranges}}),
    );
    Value::Object(aggs)
}

fn amount_ranges(bounds: &[f64]) -> Vec<Value> {
    let mut ranges = Vec::with_capacity(bounds.len() + 1);
    let mut previous: Option<f64> = None;
    for &bound in bounds {
        ranges.push(match previous {
            Some(from) => json!({"from": from, "to": bound}),
            None => json!({"to": bound}),
        });
        previous = Some(bound);
    }
    if let Some(from) = previous {
        ranges.push(json!({"from": from}));
    }
    ranges
}

fn strip_boost(field: &str) -> &str {
    field.split('^').next().unwrap_or(field)
}

// ---- native response ----

#[derive(Debug, Deserialize)]
struct FtResponse {
    hits: FtHits,
    #[serde(default)]
    aggregations: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct FtHits {
    total: FtTotal,
    hits: Vec<FtHit>,
}

#[derive(Debug, Deserialize)]
struct FtTotal {
    value: u64,
    #[serde(default = "default_relation")]
    relation: String,
}

fn default_relation() -> String {
    "eq".to_string()
}

#[derive(Debug, Deserialize)]
struct FtHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Value,
    #[serde(default)]
    highlight: Option<BTreeMap<String, Vec<String>>>,
}

fn translate_response(raw: FtResponse, from: u64, size: usize) -> SearchResponse {
    let returned = raw.hits.hits.len() as u64;
    let total_value = raw.hits.total.value;
    let relation = if raw.hits.total.relation == "gte" {
        TotalRelation::Gte
    } else {
        TotalRelation::Eq
    };
    let has_more = from + returned < total_value;

    let facets = raw.aggregations.map(translate_aggregations);

    SearchResponse {
        hits: raw
            .hits
            .hits
            .into_iter()
            .map(|hit| Hit {
                id: hit.id,
                source: hit.source,
                score: hit.score,
                highlight: hit.highlight,
            })
            .collect(),
        total: TotalHits {
            value: total_value,
            relation,
        },
        page: PageInfo {
            size,
            cursor: has_more.then(|| encode_cursor("complex", from + returned)),
            has_more,
        },
        facets,
        performance: placeholder_performance("complex"),
        debug: None,
        error: None,
    }
}

fn translate_aggregations(aggregations: Map<String, Value>) -> BTreeMap<String, FacetResult> {
    let mut facets = BTreeMap::new();
    for (name, agg) in aggregations {
        let Some(buckets) = agg.get("buckets").and_then(Value::as_array) else {
            continue;
        };
        let buckets = buckets
            .iter()
            .filter_map(|bucket| {
                let count = bucket.get("doc_count")?.as_u64()?;
                let key = bucket
                    .get("key_as_string")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| match bucket.get("key")? {
                        Value::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    })?;
                Some(FacetBucket { key, count })
            })
            .collect();
        facets.insert(name, FacetResult { buckets });
    }
    facets
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchgate_protocol::{RangeFilter, SortKey};

    fn config() -> ComplexEngineConfig {
        ComplexEngineConfig::default()
    }

    #[test]
    fn test_query_mode_selection() {
        assert_eq!(query_mode(r#""exact phrase""#), QueryMode::Phrase);
        assert_eq!(query_mode("acme*"), QueryMode::Wildcard);
        assert_eq!(query_mode("acme~"), QueryMode::Fuzzy);
        assert_eq!(query_mode("overdue invoice payment"), QueryMode::CrossFields);
        assert_eq!(query_mode("acme"), QueryMode::Prefix);
    }

    #[test]
    fn test_build_body_bool_query() {
        let mut request = SearchRequest::with_query("overdue invoice payment")
            .with_filter("entity", FilterValue::terms(["order", "invoice"]))
            .with_filter(
                "numeric.amount",
                FilterValue::Range(RangeFilter {
                    gte: Some(serde_json::json!(1000)),
                    ..RangeFilter::default()
                }),
            );
        request.sort.push(SortKey {
            field: "dates.created_at".to_string(),
            order: SortOrder::Desc,
        });
        request.options.highlight = true;

        let (body, from, size) = build_search_body(&request, None, &config()).unwrap();
        assert_eq!(from, 0);
        assert_eq!(size, 20);

        let bool_query = &body["query"]["bool"];
        assert_eq!(
            bool_query["must"][0]["multi_match"]["type"],
            json!("cross_fields")
        );
        let filters = bool_query["filter"].as_array().unwrap();
        assert_eq!(filters.len(), 2);
        assert!(filters.iter().any(|f| f.get("terms").is_some()));
        assert!(filters.iter().any(|f| f.get("range").is_some()));

        assert_eq!(body["sort"][0]["dates.created_at"]["order"], json!("desc"));
        assert_eq!(body["highlight"]["fragment_size"], json!(150));
        // Boost markers never reach highlight field names.
        assert!(body["highlight"]["fields"].get("title").is_some());
        assert!(body["highlight"]["fields"].get("title^3").is_none());
        // Aggregations always requested.
        assert!(body["aggs"].get("entity").is_some());
        assert!(body["aggs"].get("dates.created_at").is_some());
        assert!(body["aggs"].get("numeric.amount").is_some());
    }

    #[test]
    fn test_build_body_phrase_mode() {
        let request = SearchRequest::with_query(r#""acme corp""#);
        let (body, _, _) = build_search_body(&request, None, &config()).unwrap();
        assert_eq!(
            body["query"]["bool"]["must"][0]["multi_match"]["type"],
            json!("phrase")
        );
        assert_eq!(
            body["query"]["bool"]["must"][0]["multi_match"]["query"],
            json!("acme corp")
        );
    }

    #[test]
    fn test_build_body_ids_restriction() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let request = SearchRequest::default();
        let (body, _, size) = build_search_body(&request, Some(ids.as_slice()), &config()).unwrap();
        assert_eq!(size, 2);
        let filters = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filters[0]["ids"]["values"], json!(["a", "b"]));
    }

    #[test]
    fn test_build_body_cursor() {
        let mut request = SearchRequest::default();
        request.page.cursor = Some(encode_cursor("complex", 40));
        let (body, from, _) = build_search_body(&request, None, &config()).unwrap();
        assert_eq!(from, 40);
        assert_eq!(body["from"], json!(40));

        request.page.cursor = Some("garbage!".to_string());
        assert!(build_search_body(&request, None, &config()).is_err());
    }

    #[test]
    fn test_amount_range_ladder() {
        let ranges = amount_ranges(&[100.0, 1000.0]);
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0], json!({"to": 100.0}));
        assert_eq!(ranges[1], json!({"from": 100.0, "to": 1000.0}));
        assert_eq!(ranges[2], json!({"from": 1000.0}));
    }

    #[test]
    fn test_translate_response() {
        let raw: FtResponse = serde_json::from_value(json!({
            "hits": {
                "total": {"value": 42, "relation": "eq"},
                "hits": [
                    {"_id": "d1", "_score": 3.2, "_source": {"title": "Overdue invoice"},
                     "highlight": {"title": ["<em>Overdue</em> invoice"]}},
                    {"_id": "d2", "_score": 1.4, "_source": {"title": "Payment plan"}}
                ]
            },
            "aggregations": {
                "entity": {"buckets": [
                    {"key": "invoice", "doc_count": 30},
                    {"key": "order", "doc_count": 12}
                ]},
                "dates.created_at": {"buckets": [
                    {"key": 1706745600000u64, "key_as_string": "2024-02", "doc_count": 7}
                ]}
            }
        }))
        .unwrap();

        let response = translate_response(raw, 0, 20);
        assert_eq!(response.hit_ids(), vec!["d1", "d2"]);
        assert_eq!(response.total, TotalHits::exact(42));
        assert!(response.page.has_more);
        assert!(response.hits[0].highlight.is_some());

        let facets = response.facets.unwrap();
        assert_eq!(facets["entity"].buckets[0].key, "invoice");
        assert_eq!(facets["entity"].buckets[0].count, 30);
        // Histogram buckets prefer the string form of the key.
        assert_eq!(facets["dates.created_at"].buckets[0].key, "2024-02");
    }

    #[test]
    fn test_translate_response_gte_relation() {
        let raw: FtResponse = serde_json::from_value(json!({
            "hits": {"total": {"value": 10000, "relation": "gte"}, "hits": []}
        }))
        .unwrap();
        let response = translate_response(raw, 0, 20);
        assert_eq!(response.total.relation, TotalRelation::Gte);
    }
}
