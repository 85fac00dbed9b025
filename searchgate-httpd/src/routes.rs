//! HTTP route handlers and router configuration.
//!
//! The handlers here are the single point where pipeline errors become
//! status codes and envelopes. Deadline expiry never reaches this layer as
//! an error; it arrives as a 200 partial response from the dispatcher.

use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use searchgate_protocol::{
    ErrorCode, ErrorEnvelope, PageInfo, Performance, SearchRequest, SearchResponse, SuggestRequest,
    TotalHits, TENANT_HEADER,
};
use searchgate_service::{GatewayError, HealthState};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Build the application router.
pub fn build_router(state: Arc<AppState>, cors: bool) -> Router {
    let mut router = Router::new()
        .route("/search", post(search))
        .route("/suggest", post(suggest))
        .route("/explain", post(explain))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Handle `POST /search`.
async fn search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(&state, "search", rejection),
    };
    let tenant = header_str(&headers, TENANT_HEADER);
    let bearer = extract_bearer_token(&headers);

    match state.gateway.search(tenant, bearer.as_deref(), &request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(&state, "search", e),
    }
}

/// Handle `POST /suggest`.
async fn suggest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<SuggestRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(&state, "suggest", rejection),
    };
    let tenant = header_str(&headers, TENANT_HEADER);
    let bearer = extract_bearer_token(&headers);

    match state
        .gateway
        .suggest(tenant, bearer.as_deref(), &request)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(&state, "suggest", e),
    }
}

/// Handle `POST /explain`.
async fn explain(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(&state, "explain", rejection),
    };
    let tenant = header_str(&headers, TENANT_HEADER);
    let bearer = extract_bearer_token(&headers);

    match state
        .gateway
        .explain(tenant, bearer.as_deref(), &request)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(&state, "explain", e),
    }
}

/// Health report body.
#[derive(Serialize)]
struct HealthBody {
    status: HealthState,
    components: Vec<searchgate_service::health::ComponentHealth>,
    version: &'static str,
    uptime_secs: u64,
}

/// Handle `GET /health`.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthBody> {
    let report = state.health.report();
    Json(HealthBody {
        status: report.status,
        components: report.components,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
    })
}

/// Handle `GET /ready`. 200 while healthy or degraded, 503 otherwise.
async fn ready(State(state): State<Arc<AppState>>) -> Response {
    let report = state.health.report();
    let body = Json(serde_json::json!({"status": report.status}));
    if state.health.ready() {
        (StatusCode::OK, body).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}

/// Handle `GET /metrics`.
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let l1 = state.gateway.cache().l1();
    state.metrics.set_l1_entries(l1.len());
    state.metrics.set_l1_size_hint(l1.size_hint_bytes());
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode_text(),
    )
        .into_response()
}

/// Map a body rejection to the 400 envelope.
fn bad_body(state: &AppState, endpoint: &'static str, rejection: JsonRejection) -> Response {
    state
        .metrics
        .record_error(endpoint, &ErrorCode::BadRequest.to_string());
    let envelope = ErrorEnvelope::new(
        ErrorCode::BadRequest,
        format!("malformed request body: {rejection}"),
    );
    (StatusCode::BAD_REQUEST, Json(envelope)).into_response()
}

/// Convert a pipeline error into a status code and envelope.
///
/// Engine errors on the search path additionally carry the empty-hits
/// response shape so clients always find `hits` and `performance`.
fn error_response(state: &AppState, endpoint: &'static str, err: GatewayError) -> Response {
    let code = err.error_code();
    state.metrics.record_error(endpoint, &code.to_string());

    let status =
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let envelope = ErrorEnvelope::new(code, err.to_string());

    if status.is_server_error() {
        tracing::error!(endpoint, error = %err, "request failed");
    } else {
        tracing::debug!(endpoint, error = %err, "request rejected");
    }

    if endpoint == "search" && code == ErrorCode::EngineError {
        let body = SearchResponse {
            hits: Vec::new(),
            total: TotalHits::exact(0),
            page: PageInfo {
                size: 0,
                cursor: None,
                has_more: false,
            },
            facets: None,
            performance: Performance {
                took_ms: 0,
                engine: "error".to_string(),
                cached: false,
                partial: false,
            },
            debug: None,
            error: Some(envelope),
        };
        return (status, Json(body)).into_response();
    }

    (status, Json(envelope)).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Extract a bearer token with HTTP-standard tolerance: case-insensitive
/// scheme, surrounding whitespace trimmed.
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let lowered = auth.to_ascii_lowercase();
    if lowered.starts_with("bearer ") {
        Some(auth[7..].trim().to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token_standard() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def.ghi".to_string()));
    }

    #[test]
    fn test_extract_bearer_token_case_and_whitespace() {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_static("  bearer   abc.def.ghi  "),
        );
        assert_eq!(extract_bearer_token(&headers), Some("abc.def.ghi".to_string()));
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_extract_bearer_token_missing() {
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }
}
