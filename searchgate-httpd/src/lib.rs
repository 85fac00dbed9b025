//! HTTP daemon for the searchgate routing gateway.
//!
//! A standalone server that fronts the two backing search engines for many
//! tenants. The pipeline itself lives in `searchgate-service`; this crate
//! adds the transport: routing, extraction, status mapping, and the
//! observability endpoints.
//!
//! # Endpoints
//!
//! - `POST /search` — execute a search (tenant header required)
//! - `POST /suggest` — typeahead completion (tenant header required)
//! - `POST /explain` — classification and cache strategy, no engine calls
//! - `GET /health` — aggregated component health
//! - `GET /ready` — 200 while status is healthy or degraded
//! - `GET /metrics` — text exposition of counters and histograms

pub mod l2;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
