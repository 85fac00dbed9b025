//! Deterministic, tenant-prefixed request fingerprints.
//!
//! A fingerprint identifies a request for caching. It hashes only the
//! fields that alter the result set — `{q, filters, sort, fields,
//! page.size, page.cursor}` — so deadline or strict-mode changes never
//! invalidate a cached response. Canonical form: maps ordered by code
//! point (request maps and `serde_json::Map` are both BTree-backed),
//! arrays in given order, nulls elided, numbers collapsed to a single
//! decimal form. The canonical bytes feed a 128-bit xxh3 digest.

use searchgate_protocol::{SearchRequest, SuggestRequest};
use serde_json::{json, Value};
use xxhash_rust::xxh3::xxh3_128;

/// Fingerprint for a `/search` request: `search:<tenant>:<hex>`.
pub fn search_fingerprint(tenant: &str, request: &SearchRequest) -> String {
    let subset = json!({
        "q": request.free_text(),
        "filters": request.filters,
        "sort": request.sort,
        "fields": request.fields,
        "size": request.page.size,
        "cursor": request.page.cursor,
    });
    format!("search:{tenant}:{}", digest(subset))
}

/// Fingerprint for a `/suggest` request: `suggest:<tenant>:<hex>`.
///
/// Hashes the full body including the `entity` restriction, so suggestion
/// caches for different entity sets do not collide.
pub fn suggest_fingerprint(tenant: &str, request: &SuggestRequest) -> String {
    let subset = json!({
        "prefix": request.prefix,
        "entity": request.entity,
        "limit": request.limit,
    });
    format!("suggest:{tenant}:{}", digest(subset))
}

/// The tenant prefix of a namespaced cache key.
pub fn key_tenant(key: &str) -> Option<&str> {
    let mut parts = key.splitn(3, ':');
    let _namespace = parts.next()?;
    parts.next()
}

fn digest(mut subset: Value) -> String {
    canonicalize(&mut subset);
    // Value serialization is infallible for tree-shaped data.
    let bytes = serde_json::to_vec(&subset).unwrap_or_default();
    format!("{:032x}", xxh3_128(&bytes))
}

/// Normalize a JSON tree in place: drop null members, collapse whole-number
/// floats to integers.
fn canonicalize(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                canonicalize(v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                canonicalize(v);
            }
        }
        Value::Number(n) => {
            if n.is_f64() {
                if let Some(f) = n.as_f64() {
                    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e18 {
                        *value = Value::Number((f as i64).into());
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchgate_protocol::{FilterValue, RangeFilter, SortKey, SortOrder};

    fn request_a() -> SearchRequest {
        SearchRequest::with_query("acme")
            .with_filter("entity", FilterValue::terms(["customer"]))
            .with_filter("status", FilterValue::scalar("active"))
    }

    #[test]
    fn test_tenant_prefix() {
        let key = search_fingerprint("t1", &request_a());
        assert!(key.starts_with("search:t1:"));
        assert_eq!(key_tenant(&key), Some("t1"));

        let key = suggest_fingerprint("t2", &SuggestRequest::new("ac"));
        assert!(key.starts_with("suggest:t2:"));
    }

    #[test]
    fn test_distinct_tenants_distinct_keys() {
        let request = request_a();
        assert_ne!(
            search_fingerprint("t1", &request),
            search_fingerprint("t2", &request)
        );
    }

    #[test]
    fn test_invariant_under_key_order() {
        // Build the same request from JSON with filters in two orders.
        let a: SearchRequest = serde_json::from_str(
            r#"{"q":"acme","filters":{"entity":["customer"],"status":"active"}}"#,
        )
        .unwrap();
        let b: SearchRequest = serde_json::from_str(
            r#"{"filters":{"status":"active","entity":["customer"]},"q":"acme"}"#,
        )
        .unwrap();
        assert_eq!(search_fingerprint("t1", &a), search_fingerprint("t1", &b));
    }

    #[test]
    fn test_options_do_not_affect_fingerprint() {
        let base = request_a();
        let mut tweaked = base.clone();
        tweaked.options.timeout_ms = Some(50);
        tweaked.options.strict = true;
        assert_eq!(
            search_fingerprint("t1", &base),
            search_fingerprint("t1", &tweaked)
        );
    }

    #[test]
    fn test_result_shaping_fields_do_affect_fingerprint() {
        let base = request_a();

        let mut sized = base.clone();
        sized.page.size = 50;
        assert_ne!(
            search_fingerprint("t1", &base),
            search_fingerprint("t1", &sized)
        );

        let mut sorted = base.clone();
        sorted.sort.push(SortKey {
            field: "dates.created_at".to_string(),
            order: SortOrder::Desc,
        });
        assert_ne!(
            search_fingerprint("t1", &base),
            search_fingerprint("t1", &sorted)
        );
    }

    #[test]
    fn test_absent_and_blank_query_equal() {
        let absent = SearchRequest::default();
        let blank = SearchRequest::with_query("  ");
        assert_eq!(
            search_fingerprint("t1", &absent),
            search_fingerprint("t1", &blank)
        );
    }

    #[test]
    fn test_number_normalization() {
        let a = SearchRequest::default().with_filter(
            "amount",
            FilterValue::Range(RangeFilter {
                gte: Some(serde_json::json!(1000)),
                ..RangeFilter::default()
            }),
        );
        let b = SearchRequest::default().with_filter(
            "amount",
            FilterValue::Range(RangeFilter {
                gte: Some(serde_json::json!(1000.0)),
                ..RangeFilter::default()
            }),
        );
        assert_eq!(search_fingerprint("t1", &a), search_fingerprint("t1", &b));
    }

    #[test]
    fn test_suggest_entity_affects_key() {
        let mut a = SuggestRequest::new("ac");
        let mut b = SuggestRequest::new("ac");
        a.entity = vec!["customer".to_string()];
        b.entity = vec!["order".to_string()];
        assert_ne!(
            suggest_fingerprint("t1", &a),
            suggest_fingerprint("t1", &b)
        );
    }

    #[test]
    fn test_fingerprint_is_stable() {
        // Same input, two invocations.
        let request = request_a();
        assert_eq!(
            search_fingerprint("t1", &request),
            search_fingerprint("t1", &request)
        );
    }
}
