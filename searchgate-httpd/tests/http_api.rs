//! Integration tests for the HTTP surface, driven through the router with
//! scripted engine adapters.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use searchgate_httpd::{build_router, AppState};
use searchgate_protocol::{
    Hit, PageInfo, Performance, SearchRequest, SearchResponse, SuggestRequest, SuggestResponse,
    Suggestion, TotalHits,
};
use searchgate_service::{
    EngineAdapter, EngineContext, EngineKind, Gateway, GatewayConfig, GatewayError, GatewayMetrics,
    HealthMonitor, Result as ServiceResult, StaticRoutingSource,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Scripted engine for router tests.
#[derive(Debug)]
struct FixedEngine {
    kind: EngineKind,
    hits: Vec<&'static str>,
    fail_search: bool,
    healthy: bool,
}

impl FixedEngine {
    fn simple() -> Self {
        Self {
            kind: EngineKind::Simple,
            hits: vec!["doc-1", "doc-2"],
            fail_search: false,
            healthy: true,
        }
    }

    fn complex() -> Self {
        Self {
            kind: EngineKind::Complex,
            hits: vec!["doc-9"],
            fail_search: false,
            healthy: true,
        }
    }
}

#[async_trait]
impl EngineAdapter for FixedEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    async fn search(
        &self,
        _ctx: &EngineContext,
        _request: &SearchRequest,
    ) -> ServiceResult<SearchResponse> {
        if self.fail_search {
            return Err(GatewayError::engine(self.kind.as_str(), "unknown sort field"));
        }
        Ok(SearchResponse {
            hits: self
                .hits
                .iter()
                .map(|id| Hit::new(*id, serde_json::json!({"title": *id}), Some(1.0)))
                .collect(),
            total: TotalHits::exact(self.hits.len() as u64),
            page: PageInfo {
                size: self.hits.len().max(1),
                cursor: None,
                has_more: false,
            },
            facets: None,
            performance: Performance {
                took_ms: 0,
                engine: self.kind.as_str().to_string(),
                cached: false,
                partial: false,
            },
            debug: None,
            error: None,
        })
    }

    async fn suggest(
        &self,
        _ctx: &EngineContext,
        request: &SuggestRequest,
    ) -> ServiceResult<SuggestResponse> {
        Ok(SuggestResponse {
            suggestions: vec![Suggestion {
                text: format!("{}me corp", request.prefix),
                score: 0.8,
                context: Some("customer".to_string()),
            }],
            performance: Performance {
                took_ms: 0,
                engine: "simple".to_string(),
                cached: false,
                partial: false,
            },
        })
    }

    async fn filter_by_ids(
        &self,
        ctx: &EngineContext,
        request: &SearchRequest,
        ids: &[String],
    ) -> ServiceResult<SearchResponse> {
        let mut response = self.search(ctx, request).await?;
        response.hits.retain(|hit| ids.iter().any(|id| id == &hit.id));
        Ok(response)
    }

    async fn health(&self) -> bool {
        self.healthy
    }
}

async fn app_with(simple: FixedEngine, complex: FixedEngine) -> Router {
    let simple: Arc<dyn EngineAdapter> = Arc::new(simple);
    let complex: Arc<dyn EngineAdapter> = Arc::new(complex);
    let metrics = Arc::new(GatewayMetrics::new().unwrap());

    let gateway = Gateway::new(
        simple.clone(),
        complex.clone(),
        None,
        Arc::new(StaticRoutingSource::default()),
        metrics.clone(),
        GatewayConfig::default(),
    );
    let health = Arc::new(HealthMonitor::new(
        simple,
        complex,
        None,
        Duration::from_secs(30),
    ));
    health.probe_once().await;

    build_router(Arc::new(AppState::new(gateway, health, metrics)), false)
}

async fn app() -> Router {
    app_with(FixedEngine::simple(), FixedEngine::complex()).await
}

fn post_json(uri: &str, tenant: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(tenant) = tenant {
        builder = builder.header("x-tenant-id", tenant);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_search_simple_filter_roundtrip() {
    let app = app().await;
    let body = r#"{"filters":{"entity":["customer"],"status":["active"]},"page":{"size":10}}"#;

    let response = app
        .clone()
        .oneshot(post_json("/search", Some("t1"), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = body_json(response).await;
    assert_eq!(first["performance"]["cached"], serde_json::json!(false));
    assert_eq!(first["performance"]["engine"], serde_json::json!("simple"));
    assert_eq!(first["hits"][0]["id"], serde_json::json!("doc-1"));

    // Second identical call hits the cache with the same ids.
    let response = app
        .oneshot(post_json("/search", Some("t1"), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let second = body_json(response).await;
    assert_eq!(second["performance"]["cached"], serde_json::json!(true));
    assert_eq!(second["hits"], first["hits"]);
    assert_eq!(second["total"], first["total"]);
}

#[tokio::test]
async fn test_search_missing_tenant_is_400_envelope() {
    let app = app().await;
    let response = app
        .oneshot(post_json("/search", None, "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], serde_json::json!("MISSING_TENANT_ID"));
}

#[tokio::test]
async fn test_search_malformed_body_is_400_envelope() {
    let app = app().await;
    let response = app
        .oneshot(post_json("/search", Some("t1"), "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], serde_json::json!("BAD_REQUEST"));
}

#[tokio::test]
async fn test_search_zero_page_size_rejected() {
    let app = app().await;
    let response = app
        .oneshot(post_json("/search", Some("t1"), r#"{"page":{"size":0}}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_engine_error_is_500_with_error_shape() {
    let mut complex = FixedEngine::complex();
    complex.fail_search = true;
    let app = app_with(FixedEngine::simple(), complex).await;

    // Highlight forces the complex engine, which is scripted to fail.
    let body = r#"{"q":"overdue invoice","options":{"highlight":true}}"#;
    let response = app
        .oneshot(post_json("/search", Some("t1"), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["performance"]["engine"], serde_json::json!("error"));
    assert_eq!(body["hits"], serde_json::json!([]));
    assert_eq!(body["error"]["code"], serde_json::json!("ENGINE_ERROR"));
}

#[tokio::test]
async fn test_suggest_roundtrip() {
    let app = app().await;
    let response = app
        .oneshot(post_json(
            "/suggest",
            Some("t1"),
            r#"{"prefix":"ac","entity":["customer"],"limit":5}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["suggestions"][0]["text"], serde_json::json!("acme corp"));
}

#[tokio::test]
async fn test_suggest_invalid_prefix_rejected() {
    let app = app().await;
    let response = app
        .oneshot(post_json("/suggest", Some("t1"), r#"{"prefix":""}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_explain_does_not_dispatch() {
    let mut complex = FixedEngine::complex();
    complex.fail_search = true;
    let mut simple = FixedEngine::simple();
    simple.fail_search = true;
    let app = app_with(simple, complex).await;

    // Both engines would fail; explain succeeds because it calls neither.
    let body = r#"{"q":"technology","filters":{"status":"active","entity":"customer"}}"#;
    let response = app
        .oneshot(post_json("/explain", Some("t1"), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["classification"]["type"].is_string());
    assert_eq!(body["cache_strategy"]["cacheable"], serde_json::json!(true));
    assert!(body["cache_strategy"]["key"]
        .as_str()
        .unwrap()
        .starts_with("search:t1:"));
    assert!(body["estimated_cost"]["expected_latency_ms"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = app().await;

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], serde_json::json!("healthy"));

    let response = app
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ready_503_when_both_engines_down() {
    let mut simple = FixedEngine::simple();
    simple.healthy = false;
    let mut complex = FixedEngine::complex();
    complex.healthy = false;
    let app = app_with(simple, complex).await;

    let response = app
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = app().await;

    // Generate one request worth of counters first.
    app.clone()
        .oneshot(post_json(
            "/search",
            Some("t1"),
            r#"{"filters":{"status":["active"]}}"#,
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("searchgate_requests_total"));
    assert!(text.contains("searchgate_request_duration_seconds"));
}
