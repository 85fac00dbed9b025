//! searchgate HTTP daemon entry point.
//!
//! Wires the engine adapters, the optional shared cache tier, and the
//! gateway pipeline, then serves the HTTP surface.
//!
//! # Example
//!
//! ```bash
//! searchgate-httpd \
//!   --simple-endpoint http://kv-engine:7700 \
//!   --complex-endpoint http://fulltext-engine:9200 \
//!   --listen 0.0.0.0:8080
//! ```

use clap::Parser;
use searchgate_httpd::l2::HttpKvCache;
use searchgate_httpd::{build_router, AppState};
use searchgate_service::{
    CacheConfig, ClassifierConfig, ComplexAdapter, ComplexEngineConfig, DispatchConfig,
    EngineAdapter, Gateway, GatewayConfig, GatewayMetrics, HealthMonitor, RemoteCache,
    ResolverConfig, SimpleAdapter, SimpleEngineConfig, StaticRoutingSource, TtlPolicy,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// searchgate routing gateway daemon.
#[derive(Parser, Debug)]
#[command(name = "searchgate-httpd")]
#[command(about = "Multi-tenant search routing gateway")]
struct Args {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "SEARCHGATE_LISTEN")]
    listen: SocketAddr,

    /// Simple (key-value / prefix) engine endpoint
    #[arg(long, env = "SEARCHGATE_SIMPLE_ENDPOINT")]
    simple_endpoint: String,

    /// Simple engine per-call timeout ceiling in milliseconds
    #[arg(long, default_value = "2000", env = "SEARCHGATE_SIMPLE_TIMEOUT_MS")]
    simple_timeout_ms: u64,

    /// Simple engine retries on connection errors
    #[arg(long, default_value = "1", env = "SEARCHGATE_SIMPLE_RETRY")]
    simple_retry: u32,

    /// Bearer token for the simple engine, when it requires one
    #[arg(long, env = "SEARCHGATE_SIMPLE_AUTH_TOKEN")]
    simple_auth_token: Option<String>,

    /// Complex (full-text / faceted) engine endpoint
    #[arg(long, env = "SEARCHGATE_COMPLEX_ENDPOINT")]
    complex_endpoint: String,

    /// Complex engine per-call timeout ceiling in milliseconds
    #[arg(long, default_value = "2000", env = "SEARCHGATE_COMPLEX_TIMEOUT_MS")]
    complex_timeout_ms: u64,

    /// Complex engine retries on connection errors
    #[arg(long, default_value = "1", env = "SEARCHGATE_COMPLEX_RETRY")]
    complex_retry: u32,

    /// Bearer token for the complex engine, when it requires one
    #[arg(long, env = "SEARCHGATE_COMPLEX_AUTH_TOKEN")]
    complex_auth_token: Option<String>,

    /// Maximum L1 cache entries
    #[arg(long, default_value = "10000", env = "SEARCHGATE_CACHE_L1_MAX_ENTRIES")]
    cache_l1_max_entries: usize,

    /// Default L1 TTL in milliseconds
    #[arg(long, default_value = "300000", env = "SEARCHGATE_CACHE_L1_DEFAULT_TTL_MS")]
    cache_l1_default_ttl_ms: u64,

    /// Consult and write the shared L2 cache
    #[arg(long, env = "SEARCHGATE_CACHE_L2_ENABLED")]
    cache_l2_enabled: bool,

    /// Shared L2 cache endpoint
    #[arg(long, env = "SEARCHGATE_CACHE_L2_ENDPOINT")]
    cache_l2_endpoint: Option<String>,

    /// Classifier: score at or below which filter-only requests are simple
    #[arg(long, default_value = "2.0", env = "SEARCHGATE_CLASSIFIER_SIMPLE_THRESHOLD")]
    classifier_simple_threshold: f64,

    /// Classifier: score at or above which requests are complex
    #[arg(long, default_value = "5.0", env = "SEARCHGATE_CLASSIFIER_COMPLEX_THRESHOLD")]
    classifier_complex_threshold: f64,

    /// Classifier: free-text length that forces complex and blocks caching
    #[arg(long, default_value = "120", env = "SEARCHGATE_CLASSIFIER_LONG_QUERY_CHARS")]
    classifier_long_query_chars: usize,

    /// Classifier: page size that forces complex and blocks caching
    #[arg(long, default_value = "100", env = "SEARCHGATE_CLASSIFIER_LARGE_PAGE_SIZE")]
    classifier_large_page_size: usize,

    /// Default per-request deadline in milliseconds
    #[arg(long, default_value = "700", env = "SEARCHGATE_DISPATCH_DEFAULT_TIMEOUT_MS")]
    dispatch_default_timeout_ms: u64,

    /// Lower clamp bound for request deadlines in milliseconds
    #[arg(long, default_value = "50", env = "SEARCHGATE_DISPATCH_MIN_TIMEOUT_MS")]
    dispatch_min_timeout_ms: u64,

    /// Upper clamp bound for request deadlines in milliseconds
    #[arg(long, default_value = "2000", env = "SEARCHGATE_DISPATCH_MAX_TIMEOUT_MS")]
    dispatch_max_timeout_ms: u64,

    /// Page-size multiplier for the complex call of a hybrid plan
    #[arg(long, default_value = "3", env = "SEARCHGATE_DISPATCH_HYBRID_OVERFETCH_FACTOR")]
    dispatch_hybrid_overfetch_factor: usize,

    /// Budget for the degraded fallback plan in milliseconds
    #[arg(long, default_value = "200", env = "SEARCHGATE_DISPATCH_FALLBACK_TIMEOUT_MS")]
    dispatch_fallback_timeout_ms: u64,

    /// Name of the shared index
    #[arg(long, default_value = "search-shared", env = "SEARCHGATE_SHARED_INDEX")]
    shared_index: String,

    /// Tenants routed to dedicated indexes (comma separated)
    #[arg(long, value_delimiter = ',', env = "SEARCHGATE_DEDICATED_TENANTS")]
    dedicated_tenants: Vec<String>,

    /// Background health probe interval in milliseconds
    #[arg(long, default_value = "15000", env = "SEARCHGATE_HEALTH_PROBE_INTERVAL_MS")]
    health_probe_interval_ms: u64,

    /// Allow cross-origin requests
    #[arg(long, env = "SEARCHGATE_CORS_ENABLED")]
    cors_enabled: bool,
}

impl Args {
    fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            classifier: ClassifierConfig {
                simple_threshold: self.classifier_simple_threshold,
                complex_threshold: self.classifier_complex_threshold,
                long_query_chars: self.classifier_long_query_chars,
                large_page_size: self.classifier_large_page_size,
                ..ClassifierConfig::default()
            },
            dispatch: DispatchConfig {
                default_timeout_ms: self.dispatch_default_timeout_ms,
                min_timeout_ms: self.dispatch_min_timeout_ms,
                max_timeout_ms: self.dispatch_max_timeout_ms,
                hybrid_overfetch_factor: self.dispatch_hybrid_overfetch_factor,
                fallback_timeout: Duration::from_millis(self.dispatch_fallback_timeout_ms),
                ..DispatchConfig::default()
            },
            cache: CacheConfig {
                l1_max_entries: self.cache_l1_max_entries,
                l1_default_ttl: Duration::from_millis(self.cache_l1_default_ttl_ms),
            },
            resolver: ResolverConfig::default(),
            ttl: TtlPolicy::default(),
            shared_index: searchgate_service::SharedIndexName(self.shared_index.clone()),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("searchgate_httpd=info".parse().expect("valid directive"))
                .add_directive("searchgate_service=info".parse().expect("valid directive"))
                .add_directive("tower_http=info".parse().expect("valid directive")),
        )
        .init();

    let args = Args::parse();

    info!(
        listen = %args.listen,
        simple = %args.simple_endpoint,
        complex = %args.complex_endpoint,
        l2_enabled = args.cache_l2_enabled,
        "starting searchgate"
    );

    let http_client = reqwest::Client::builder()
        .pool_max_idle_per_host(16)
        .build()
        .expect("failed to build HTTP client");

    let simple: Arc<dyn EngineAdapter> = Arc::new(SimpleAdapter::new(
        http_client.clone(),
        SimpleEngineConfig {
            endpoint: args.simple_endpoint.clone(),
            request_timeout: Duration::from_millis(args.simple_timeout_ms),
            retry: args.simple_retry,
            auth_token: args.simple_auth_token.clone(),
            ..SimpleEngineConfig::default()
        },
    ));
    let complex: Arc<dyn EngineAdapter> = Arc::new(ComplexAdapter::new(
        http_client.clone(),
        ComplexEngineConfig {
            endpoint: args.complex_endpoint.clone(),
            request_timeout: Duration::from_millis(args.complex_timeout_ms),
            retry: args.complex_retry,
            auth_token: args.complex_auth_token.clone(),
            ..ComplexEngineConfig::default()
        },
    ));

    let l2: Option<Arc<dyn RemoteCache>> = match (args.cache_l2_enabled, &args.cache_l2_endpoint) {
        (true, Some(endpoint)) => Some(Arc::new(HttpKvCache::new(
            http_client,
            endpoint.clone(),
            Duration::from_millis(250),
        ))),
        (true, None) => {
            tracing::warn!("L2 enabled but no endpoint configured; running without L2");
            None
        }
        _ => None,
    };

    let metrics = Arc::new(GatewayMetrics::new().expect("failed to build metrics registry"));
    let routing = Arc::new(StaticRoutingSource::new(
        args.shared_index.clone(),
        args.dedicated_tenants.clone(),
    ));

    let gateway = Gateway::new(
        simple.clone(),
        complex.clone(),
        l2.clone(),
        routing,
        metrics.clone(),
        args.gateway_config(),
    );

    let health = Arc::new(HealthMonitor::new(
        simple,
        complex,
        l2,
        Duration::from_millis(args.health_probe_interval_ms),
    ));
    let prober = health.clone().spawn();

    let state = Arc::new(AppState::new(gateway, health, metrics));
    let app = build_router(state, args.cors_enabled);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .expect("failed to bind listen address");
    info!(address = %args.listen, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    prober.abort();
    info!("shut down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
