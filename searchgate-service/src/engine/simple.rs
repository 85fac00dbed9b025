//! Adapter for the simple (key-value / prefix) engine.
//!
//! The simple engine serves exact-match filters, prefix free-text, and
//! small result windows with low latency. It has no highlighting and no
//! relevance features beyond prefix scoring. Suggestions are prefix
//! completions over a title-like field plus an optional denormalized
//! customer-name field.

use super::{EngineAdapter, EngineContext, EngineKind};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use searchgate_protocol::{
    decode_cursor, encode_cursor, FilterValue, Hit, PageInfo, SearchRequest, SearchResponse,
    SortOrder, SuggestRequest, SuggestResponse, Suggestion, TotalHits, TotalRelation,
    MAX_PAGE_SIZE,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Simple-engine adapter configuration.
#[derive(Debug, Clone)]
pub struct SimpleEngineConfig {
    /// Base URL of the engine, e.g. `http://kv-engine:7700`.
    pub endpoint: String,
    /// Hard ceiling on any single engine call.
    pub request_timeout: Duration,
    /// Retries on connection errors (never on timeouts).
    pub retry: u32,
    /// Bearer token presented to the engine, when it requires one.
    pub auth_token: Option<String>,
    /// Field completed by suggestions.
    pub suggest_title_field: String,
    /// Denormalized customer-name field also completed, when configured.
    pub suggest_customer_field: Option<String>,
    /// Sort applied when the request has none.
    pub default_sort_field: String,
}

impl Default for SimpleEngineConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:7700".to_string(),
            request_timeout: Duration::from_secs(2),
            retry: 1,
            auth_token: None,
            suggest_title_field: "title".to_string(),
            suggest_customer_field: Some("customer_name".to_string()),
            default_sort_field: "updated_at".to_string(),
        }
    }
}

/// Reqwest-backed adapter for the simple engine.
pub struct SimpleAdapter {
    client: reqwest::Client,
    config: SimpleEngineConfig,
}

impl SimpleAdapter {
    pub fn new(client: reqwest::Client, config: SimpleEngineConfig) -> Self {
        Self { client, config }
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<R> {
        let url = format!("{}{path}", self.config.endpoint.trim_end_matches('/'));
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
                        return response.json::<R>().await.map_err(|e| {
                            GatewayError::engine("simple", format!("malformed response: {e}"))
                        });
                    }
                    let message = response.text().await.unwrap_or_default();
                    return Err(GatewayError::engine(
                        "simple",
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
                    tracing::debug!(%url, attempt = attempts, "simple engine connect retry");
                }
                Err(e) => {
                    return Err(GatewayError::engine("simple", e.to_string()));
                }
            }
        }
    }
}

impl std::fmt::Debug for SimpleAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleAdapter")
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

#[async_trait]
impl EngineAdapter for SimpleAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Simple
    }

    async fn search(
        &self,
        ctx: &EngineContext,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        let native = build_query(ctx, request, None, &self.config)?;
        let raw: KvQueryResponse = self.post("/v1/query", &native, ctx.timeout).await?;
        Ok(translate_response(raw, native.limit, native.offset))
    }

    async fn suggest(
        &self,
        ctx: &EngineContext,
        request: &SuggestRequest,
    ) -> Result<SuggestResponse> {
        let mut fields = vec![self.config.suggest_title_field.clone()];
        if let Some(customer) = &self.config.suggest_customer_field {
            fields.push(customer.clone());
        }
        let native = KvCompleteRequest {
            index: ctx.index.clone(),
            tenant: ctx.tenant.clone(),
            prefix: request.prefix.clone(),
            fields,
            contexts: request.entity.clone(),
            limit: request.limit,
        };
        let raw: KvCompleteResponse = self.post("/v1/complete", &native, ctx.timeout).await?;
        Ok(SuggestResponse {
            suggestions: raw
                .completions
                .into_iter()
                .map(|c| Suggestion {
                    text: c.text,
                    score: c.score,
                    context: c.context,
                })
                .collect(),
            performance: placeholder_performance("simple"),
        })
    }

    async fn filter_by_ids(
        &self,
        ctx: &EngineContext,
        request: &SearchRequest,
        ids: &[String],
    ) -> Result<SearchResponse> {
        let native = build_query(ctx, request, Some(ids), &self.config)?;
        let raw: KvQueryResponse = self.post("/v1/query", &native, ctx.timeout).await?;
        Ok(translate_response(raw, native.limit, native.offset))
    }

    async fn health(&self) -> bool {
        let url = format!("{}/v1/ping", self.config.endpoint.trim_end_matches('/'));
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

// ---- native wire format ----

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KvQueryRequest {
    index: String,
    tenant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
    filters: Vec<KvFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    sort: Vec<KvSort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<String>>,
    limit: usize,
    offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum KvFilter {
    Eq {
        field: String,
        value: serde_json::Value,
    },
    In {
        field: String,
        values: Vec<serde_json::Value>,
    },
    Range {
        field: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        gte: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lte: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        gt: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lt: Option<serde_json::Value>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KvSort {
    field: String,
    desc: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct KvQueryResponse {
    items: Vec<KvItem>,
    total: u64,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct KvItem {
    id: String,
    #[serde(default)]
    doc: serde_json::Value,
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct KvCompleteRequest {
    index: String,
    tenant: String,
    prefix: String,
    fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    contexts: Vec<String>,
    limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct KvCompleteResponse {
    completions: Vec<KvCompletion>,
}

#[derive(Debug, Clone, Deserialize)]
struct KvCompletion {
    text: String,
    score: f64,
    #[serde(default)]
    context: Option<String>,
}

/// Translate the uniform request into the engine's native query.
///
/// With `ids` present this becomes an id-restricted filter pass: the free
/// text is dropped and the window covers every candidate id.
fn build_query(
    ctx: &EngineContext,
    request: &SearchRequest,
    ids: Option<&[String]>,
    config: &SimpleEngineConfig,
) -> Result<KvQueryRequest> {
    let offset = match &request.page.cursor {
        Some(cursor) if ids.is_none() => {
            decode_cursor("simple", cursor)
                .map_err(|e| GatewayError::bad_request(e.to_string()))?
                .offset
        }
        _ => 0,
    };

    let filters = request
        .filters
        .iter()
        .map(|(field, value)| match value {
            FilterValue::Scalar(v) => KvFilter::Eq {
                field: field.clone(),
                value: v.clone(),
            },
            FilterValue::Terms(vs) => KvFilter::In {
                field: field.clone(),
                values: vs.clone(),
            },
            FilterValue::Range(r) => KvFilter::Range {
                field: field.clone(),
                gte: r.gte.clone(),
                lte: r.lte.clone(),
                gt: r.gt.clone(),
                lt: r.lt.clone(),
            },
        })
        .collect();

    let sort = if request.sort.is_empty() {
        vec![KvSort {
            field: config.default_sort_field.clone(),
            desc: true,
        }]
    } else {
        request
            .sort
            .iter()
            .map(|key| KvSort {
                field: key.field.clone(),
                desc: key.order == SortOrder::Desc,
            })
            .collect()
    };

    let limit = match ids {
        Some(ids) => ids.len().max(1),
        None => request.page.size.min(MAX_PAGE_SIZE),
    };

    Ok(KvQueryRequest {
        index: ctx.index.clone(),
        tenant: ctx.tenant.clone(),
        prefix: if ids.is_none() {
            request.free_text().map(str::to_string)
        } else {
            None
        },
        filters,
        ids: ids.map(<[String]>::to_vec),
        sort,
        fields: request.fields.as_ref().map(|f| f.iter().cloned().collect()),
        limit,
        offset,
    })
}

fn translate_response(raw: KvQueryResponse, limit: usize, offset: u64) -> SearchResponse {
    let returned = raw.items.len() as u64;
    let has_more = offset + returned < raw.total;
    let relation = if raw.truncated {
        TotalRelation::Gte
    } else {
        TotalRelation::Eq
    };

    SearchResponse {
        hits: raw
            .items
            .into_iter()
            .map(|item| Hit::new(item.id, item.doc, item.score))
            .collect(),
        total: TotalHits {
            value: raw.total,
            relation,
        },
        page: PageInfo {
            size: limit,
            cursor: has_more.then(|| encode_cursor("simple", offset + returned)),
            has_more,
        },
        facets: None,
        performance: placeholder_performance("simple"),
        debug: None,
        error: None,
    }
}

/// Adapters return placeholder performance; the gateway overwrites it with
/// handler-boundary measurements.
pub(crate) fn placeholder_performance(engine: &str) -> searchgate_protocol::Performance {
    searchgate_protocol::Performance {
        took_ms: 0,
        engine: engine.to_string(),
        cached: false,
        partial: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchgate_protocol::RangeFilter;

    fn ctx() -> EngineContext {
        EngineContext::new("t1", "search-shared", Duration::from_millis(500))
    }

    fn config() -> SimpleEngineConfig {
        SimpleEngineConfig::default()
    }

    #[test]
    fn test_build_query_filters_and_prefix() {
        let request = SearchRequest::with_query("acm")
            .with_filter("status", FilterValue::scalar("active"))
            .with_filter("entity", FilterValue::terms(["customer"]))
            .with_filter(
                "amount",
                FilterValue::Range(RangeFilter {
                    gte: Some(serde_json::json!(10)),
                    ..RangeFilter::default()
                }),
            );

        let native = build_query(&ctx(), &request, None, &config()).unwrap();
        assert_eq!(native.tenant, "t1");
        assert_eq!(native.index, "search-shared");
        assert_eq!(native.prefix.as_deref(), Some("acm"));
        assert_eq!(native.filters.len(), 3);
        assert_eq!(native.limit, 20);
        assert_eq!(native.offset, 0);
        // Default sort applied when the request has none.
        assert_eq!(native.sort[0].field, "updated_at");
    }

    #[test]
    fn test_build_query_id_restriction_drops_prefix() {
        let request = SearchRequest::with_query("acme")
            .with_filter("status", FilterValue::scalar("active"));
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let native = build_query(&ctx(), &request, Some(ids.as_slice()), &config()).unwrap();
        assert!(native.prefix.is_none());
        assert_eq!(native.ids.as_deref(), Some(&ids[..]));
        assert_eq!(native.limit, 3);
    }

    #[test]
    fn test_build_query_cursor_roundtrip() {
        let mut request = SearchRequest::default().with_page_size(10);
        request.page.cursor = Some(encode_cursor("simple", 30));
        let native = build_query(&ctx(), &request, None, &config()).unwrap();
        assert_eq!(native.offset, 30);
    }

    #[test]
    fn test_build_query_foreign_cursor_rejected() {
        let mut request = SearchRequest::default();
        request.page.cursor = Some(encode_cursor("complex", 30));
        let err = build_query(&ctx(), &request, None, &config()).unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest { .. }));
    }

    #[test]
    fn test_build_query_clamps_oversize_page() {
        let request = SearchRequest::default().with_page_size(5000);
        let native = build_query(&ctx(), &request, None, &config()).unwrap();
        assert_eq!(native.limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_translate_response_pagination() {
        let raw = KvQueryResponse {
            items: vec![
                KvItem {
                    id: "a".to_string(),
                    doc: serde_json::json!({"title": "A"}),
                    score: None,
                },
                KvItem {
                    id: "b".to_string(),
                    doc: serde_json::json!({"title": "B"}),
                    score: None,
                },
            ],
            total: 5,
            truncated: false,
        };
        let response = translate_response(raw, 2, 0);
        assert_eq!(response.hit_ids(), vec!["a", "b"]);
        assert_eq!(response.total, TotalHits::exact(5));
        assert!(response.page.has_more);

        let cursor = response.page.cursor.unwrap();
        assert_eq!(decode_cursor("simple", &cursor).unwrap().offset, 2);
    }

    #[test]
    fn test_translate_response_truncated_total_is_lower_bound() {
        let raw = KvQueryResponse {
            items: vec![],
            total: 100,
            truncated: true,
        };
        let response = translate_response(raw, 10, 0);
        assert_eq!(response.total.relation, TotalRelation::Gte);
    }

    #[test]
    fn test_native_filter_wire_form() {
        let filter = KvFilter::Range {
            field: "amount".to_string(),
            gte: Some(serde_json::json!(10)),
            lte: None,
            gt: None,
            lt: None,
        };
        let json = serde_json::to_string(&filter).unwrap();
        assert!(json.contains(r#""op":"range""#));
        assert!(!json.contains("lte"));
    }
}
