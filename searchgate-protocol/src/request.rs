//! Search and suggest request types.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    DEFAULT_PAGE_SIZE, DEFAULT_SUGGEST_LIMIT, MAX_SUGGEST_LIMIT, SUGGEST_PREFIX_MAX_CHARS,
};

/// Search request body.
///
/// This is the main request type for the `POST /search` and `POST /explain`
/// endpoints. All fields are optional; an empty body is a valid request and
/// yields a tenant-scoped default listing.
///
/// # Semantics
///
/// - **`q`**: free-text query. Quoting marks a phrase, `*` a wildcard, and a
///   trailing `~` a fuzzy term; the gateway classifies on these markers but
///   leaves interpretation to the engines.
/// - **`filters`**: field → scalar, array, or range (see [`FilterValue`]).
///   Maps use [`BTreeMap`] so serialization is key-ordered by code point,
///   which the fingerprint relies on.
/// - **`options`**: knobs that do not alter the result set (`timeout_ms`,
///   `strict`) or toggle engine features (`highlight`, `suggest`). Options
///   never participate in cache keys except for the feature toggles that
///   change response shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,

    /// Structured filters: field path → scalar | terms | range.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, FilterValue>,

    /// Ordered sort keys. Empty means the engine's default sort.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortKey>,

    /// Projection: set of field paths to return in `hits[].source`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeSet<String>>,

    /// Page descriptor.
    #[serde(default)]
    pub page: PageRequest,

    /// Request options.
    #[serde(default)]
    pub options: SearchOptions,
}

impl SearchRequest {
    /// Create a request with only a free-text query.
    pub fn with_query(q: impl Into<String>) -> Self {
        Self {
            q: Some(q.into()),
            ..Self::default()
        }
    }

    /// Add a filter, replacing any previous filter on the same field.
    pub fn with_filter(mut self, field: impl Into<String>, value: FilterValue) -> Self {
        self.filters.insert(field.into(), value);
        self
    }

    /// Set the page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page.size = size;
        self
    }

    /// Set the request deadline.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.options.timeout_ms = Some(timeout_ms);
        self
    }

    /// The trimmed free-text query, if non-empty.
    pub fn free_text(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Validate the request shape once, at the edge.
    ///
    /// Checks that filter values are well-formed (scalars are JSON scalars,
    /// term arrays hold scalars, ranges carry at least one bound) and that
    /// the page size is positive. Page sizes above the adapter maximum are
    /// *not* an error here; adapters clamp them.
    pub fn validate(&self) -> Result<(), String> {
        if self.page.size == 0 {
            return Err("page.size must be at least 1".to_string());
        }
        for (field, value) in &self.filters {
            value.validate(field)?;
        }
        for key in &self.sort {
            if key.field.trim().is_empty() {
                return Err("sort field must be non-empty".to_string());
            }
        }
        Ok(())
    }
}

/// A single filter value: scalar equality, a terms set, or a bounded range.
///
/// Serialized untagged, so request bodies stay natural:
///
/// ```json
/// {"status": "active", "entity": ["order", "invoice"], "amount": {"gte": 1000}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Range with at least one bound.
    Range(RangeFilter),
    /// Match any of the given values.
    Terms(Vec<serde_json::Value>),
    /// Exact match on a single scalar.
    Scalar(serde_json::Value),
}

impl FilterValue {
    /// A terms filter from string values.
    pub fn terms<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterValue::Terms(
            values
                .into_iter()
                .map(|v| serde_json::Value::String(v.into()))
                .collect(),
        )
    }

    /// A scalar filter from a string value.
    pub fn scalar(value: impl Into<String>) -> Self {
        FilterValue::Scalar(serde_json::Value::String(value.into()))
    }

    /// Whether this filter is an exact match (scalar or terms), as opposed
    /// to a range.
    pub fn is_exact(&self) -> bool {
        !matches!(self, FilterValue::Range(_))
    }

    /// The match values of an exact filter, normalized to a list.
    pub fn exact_values(&self) -> Option<Vec<serde_json::Value>> {
        match self {
            FilterValue::Scalar(v) => Some(vec![v.clone()]),
            FilterValue::Terms(vs) => Some(vs.clone()),
            FilterValue::Range(_) => None,
        }
    }

    fn validate(&self, field: &str) -> Result<(), String> {
        match self {
            FilterValue::Scalar(v) => {
                if v.is_object() || v.is_array() || v.is_null() {
                    return Err(format!("filter '{field}' must be a scalar value"));
                }
            }
            FilterValue::Terms(vs) => {
                if vs.is_empty() {
                    return Err(format!("filter '{field}' terms array is empty"));
                }
                if vs.iter().any(|v| v.is_object() || v.is_array() || v.is_null()) {
                    return Err(format!("filter '{field}' terms must be scalars"));
                }
            }
            FilterValue::Range(r) => {
                if r.gte.is_none() && r.lte.is_none() && r.gt.is_none() && r.lt.is_none() {
                    return Err(format!("filter '{field}' range has no bounds"));
                }
            }
        }
        Ok(())
    }
}

/// Range filter bounds. At least one must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<serde_json::Value>,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    /// Field path to sort on.
    pub field: String,
    /// Sort direction.
    #[serde(default)]
    pub order: SortOrder,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Page descriptor: size plus an opaque cursor from a previous response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of hits per page.
    #[serde(default = "default_page_size")]
    pub size: usize,
    /// Opaque continuation cursor. Engine-private; never inspect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            size: DEFAULT_PAGE_SIZE,
            cursor: None,
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Request options that tune execution without changing the result set,
/// plus engine feature toggles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Return highlight fragments for matching hits.
    #[serde(default)]
    pub highlight: bool,
    /// Attach did-you-mean style suggestions to the response.
    #[serde(default)]
    pub suggest: bool,
    /// Per-request deadline in milliseconds; clamped server-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Reject rather than degrade on partial failures.
    #[serde(default)]
    pub strict: bool,
}

/// Suggest (typeahead) request body for `POST /suggest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestRequest {
    /// Prefix to complete. 1 to 50 characters.
    pub prefix: String,
    /// Restrict suggestions to these entity types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity: Vec<String>,
    /// Maximum suggestions to return. 1 to 20.
    #[serde(default = "default_suggest_limit")]
    pub limit: usize,
}

fn default_suggest_limit() -> usize {
    DEFAULT_SUGGEST_LIMIT
}

impl SuggestRequest {
    /// Create a suggest request for a prefix with defaults.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entity: Vec::new(),
            limit: DEFAULT_SUGGEST_LIMIT,
        }
    }

    /// Validate prefix length and limit bounds.
    pub fn validate(&self) -> Result<(), String> {
        let chars = self.prefix.chars().count();
        if chars == 0 || chars > SUGGEST_PREFIX_MAX_CHARS {
            return Err(format!(
                "prefix must be 1..={SUGGEST_PREFIX_MAX_CHARS} characters"
            ));
        }
        if self.limit == 0 || self.limit > MAX_SUGGEST_LIMIT {
            return Err(format!("limit must be 1..={MAX_SUGGEST_LIMIT}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let json = r#"{
            "q": "overdue invoice payment",
            "filters": {
                "entity": ["order", "invoice"],
                "status": "active",
                "numeric.amount": {"gte": 1000}
            },
            "sort": [{"field": "dates.created_at", "order": "desc"}],
            "page": {"size": 25},
            "options": {"highlight": true, "timeout_ms": 500}
        }"#;

        let parsed: SearchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.free_text(), Some("overdue invoice payment"));
        assert_eq!(parsed.filters.len(), 3);
        assert!(matches!(
            parsed.filters.get("entity"),
            Some(FilterValue::Terms(vs)) if vs.len() == 2
        ));
        assert!(matches!(
            parsed.filters.get("status"),
            Some(FilterValue::Scalar(_))
        ));
        assert!(matches!(
            parsed.filters.get("numeric.amount"),
            Some(FilterValue::Range(r)) if r.gte.is_some()
        ));
        assert_eq!(parsed.sort[0].order, SortOrder::Desc);
        assert_eq!(parsed.page.size, 25);
        assert!(parsed.options.highlight);
        assert_eq!(parsed.options.timeout_ms, Some(500));
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_empty_body_defaults() {
        let parsed: SearchRequest = serde_json::from_str("{}").unwrap();
        assert!(parsed.free_text().is_none());
        assert!(parsed.filters.is_empty());
        assert_eq!(parsed.page.size, DEFAULT_PAGE_SIZE);
        assert!(!parsed.options.highlight);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_blank_query_is_not_free_text() {
        let request = SearchRequest::with_query("   ");
        assert!(request.free_text().is_none());
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let request = SearchRequest::default().with_page_size(0);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_range_without_bounds_rejected() {
        let request = SearchRequest::default()
            .with_filter("amount", FilterValue::Range(RangeFilter::default()));
        let err = request.validate().unwrap_err();
        assert!(err.contains("no bounds"));
    }

    #[test]
    fn test_nested_scalar_rejected() {
        let request = SearchRequest::default().with_filter(
            "meta",
            FilterValue::Scalar(serde_json::json!({"nested": true})),
        );
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_empty_terms_rejected() {
        let request =
            SearchRequest::default().with_filter("entity", FilterValue::Terms(Vec::new()));
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_filter_exact_values() {
        let scalar = FilterValue::scalar("active");
        assert!(scalar.is_exact());
        assert_eq!(scalar.exact_values().unwrap().len(), 1);

        let range = FilterValue::Range(RangeFilter {
            gte: Some(serde_json::json!(10)),
            ..RangeFilter::default()
        });
        assert!(!range.is_exact());
        assert!(range.exact_values().is_none());
    }

    #[test]
    fn test_unknown_range_key_parses_as_scalar_and_fails_validation() {
        // {"approx": 5} is not a range; the untagged enum lands on Scalar,
        // and scalar validation rejects the object.
        let json = r#"{"filters": {"amount": {"approx": 5}}}"#;
        let parsed: SearchRequest = serde_json::from_str(json).unwrap();
        assert!(parsed.validate().is_err());
    }

    #[test]
    fn test_suggest_request_bounds() {
        assert!(SuggestRequest::new("ac").validate().is_ok());
        assert!(SuggestRequest::new("").validate().is_err());
        assert!(SuggestRequest::new("x".repeat(51)).validate().is_err());

        let mut req = SuggestRequest::new("acme");
        req.limit = 0;
        assert!(req.validate().is_err());
        req.limit = 21;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_suggest_default_limit() {
        let parsed: SuggestRequest = serde_json::from_str(r#"{"prefix": "ac"}"#).unwrap();
        assert_eq!(parsed.limit, DEFAULT_SUGGEST_LIMIT);
        assert!(parsed.entity.is_empty());
    }

    #[test]
    fn test_request_roundtrip_preserves_filters() {
        let request = SearchRequest::with_query("acme")
            .with_filter("entity", FilterValue::terms(["customer"]))
            .with_filter("status", FilterValue::scalar("active"));
        let json = serde_json::to_string(&request).unwrap();
        let parsed: SearchRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request);
    }
}
