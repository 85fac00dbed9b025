//! Wire contract for the searchgate routing gateway.
//!
//! This crate defines the request/response envelope shared by the gateway
//! daemon, its clients, and the service layer. These types are used by:
//!
//! - The HTTP daemon (`searchgate-httpd`) for body deserialization
//! - The pipeline core (`searchgate-service`) for classification, caching,
//!   and dispatch
//! - Gateway clients that want typed requests instead of raw JSON
//!
//! # Envelope overview
//!
//! A search request carries an optional free-text query `q`, structured
//! filters (scalar, terms, or range — see [`FilterValue`]), sort keys, a
//! field projection, a page descriptor with an opaque cursor, and options
//! that do not alter the result set (timeout, strict mode, highlight).
//!
//! The tenant identifier is **never** part of the body; it travels in the
//! [`TENANT_HEADER`] transport header and is injected by the gateway.
//!
//! # Example
//!
//! ```rust
//! use searchgate_protocol::{SearchRequest, FilterValue};
//!
//! let request = SearchRequest::with_query("overdue invoice")
//!     .with_filter("entity", FilterValue::terms(["order", "invoice"]))
//!     .with_page_size(25);
//! assert!(request.validate().is_ok());
//! ```

mod cursor;
mod error;
mod request;
mod response;

pub use cursor::{decode_cursor, encode_cursor, CursorError, PageCursor};
pub use error::{ErrorCode, ErrorEnvelope};
pub use request::{
    FilterValue, PageRequest, RangeFilter, SearchOptions, SearchRequest, SortKey, SortOrder,
    SuggestRequest,
};
pub use response::{
    CacheStrategy, Classification, EstimatedCost, ExplainResponse, ExplainRouting, FacetBucket,
    FacetResult, Hit, PageInfo, Performance, QueryDebug, QueryType, SearchResponse, SuggestResponse,
    Suggestion, TenantRouting, TotalHits, TotalRelation,
};

/// Transport header carrying the tenant identifier. Required on search paths.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Default page size when the request omits `page.size`.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page size an adapter will serve; larger requests are clamped.
pub const MAX_PAGE_SIZE: usize = 100;

/// Default per-request deadline in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 700;

/// Lower clamp bound for `options.timeout_ms`.
pub const MIN_TIMEOUT_MS: u64 = 50;

/// Upper clamp bound for `options.timeout_ms`.
pub const MAX_TIMEOUT_MS: u64 = 2_000;

/// Longest accepted suggest prefix, in characters.
pub const SUGGEST_PREFIX_MAX_CHARS: usize = 50;

/// Default number of suggestions returned.
pub const DEFAULT_SUGGEST_LIMIT: usize = 10;

/// Largest number of suggestions a request may ask for.
pub const MAX_SUGGEST_LIMIT: usize = 20;
