//! Query classification.
//!
//! Classification is a pure function of request shape: it picks the engine
//! route (simple, complex, or hybrid), decides whether the response may be
//! cached, and attaches an advisory latency estimate. It never errors; any
//! syntactically valid request classifies.

use searchgate_protocol::{Classification, FilterValue, QueryType, SearchRequest};

/// Classifier thresholds and weights.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Score at or below which a filter-only request stays simple.
    pub simple_threshold: f64,
    /// Residual boundary between simple and complex.
    pub mid_threshold: f64,
    /// Score at or above which a request is complex outright.
    pub complex_threshold: f64,
    /// Free-text length (chars) that forces the complex engine and blocks
    /// caching.
    pub long_query_chars: usize,
    /// Word count that forces the complex engine.
    pub long_query_words: usize,
    /// Page size that forces the complex engine and blocks caching.
    pub large_page_size: usize,
    /// Page size that contributes to the score.
    pub page_size_score_threshold: usize,
    /// Base latency estimates per route, in milliseconds.
    pub base_latency_simple_ms: u64,
    pub base_latency_hybrid_ms: u64,
    pub base_latency_complex_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            simple_threshold: 2.0,
            mid_threshold: 3.5,
            complex_threshold: 5.0,
            long_query_chars: 120,
            long_query_words: 5,
            large_page_size: 100,
            page_size_score_threshold: 50,
            base_latency_simple_ms: 50,
            base_latency_hybrid_ms: 150,
            base_latency_complex_ms: 200,
        }
    }
}

/// Classify a request. Deterministic: equal inputs yield equal output.
pub fn classify(request: &SearchRequest, config: &ClassifierConfig) -> Classification {
    let score = complexity_score(request, config);
    let (query_type, reason) = decide(request, score, config);
    let cacheable = is_cacheable(request, config);

    let base = match query_type {
        QueryType::Simple => config.base_latency_simple_ms,
        QueryType::Hybrid => config.base_latency_hybrid_ms,
        QueryType::Complex => config.base_latency_complex_ms,
    };
    let estimated_latency_ms = (base as f64 * (1.0 + score / 20.0)) as u64;

    Classification {
        query_type,
        complexity_score: score,
        cacheable,
        estimated_latency_ms,
        reason,
    }
}

/// Additive complexity score, rounded to one decimal.
fn complexity_score(request: &SearchRequest, config: &ClassifierConfig) -> f64 {
    let mut score = 0.0;

    if let Some(q) = request.free_text() {
        score += 1.0;
        score += 0.2 * word_count(q).min(10) as f64;
        if has_phrase(q) {
            score += 1.5;
        }
        if q.contains('*') {
            score += 1.0;
        }
        if has_fuzzy(q) {
            score += 1.0;
        }
    }

    score += 0.5 * request.filters.len().min(5) as f64;
    for value in request.filters.values() {
        match value {
            FilterValue::Range(_) => score += 0.5,
            FilterValue::Terms(_) => score += 0.25,
            FilterValue::Scalar(_) => {}
        }
    }

    for key in &request.sort {
        score += 0.3;
        if is_text_sort_field(&key.field) {
            score += 0.5;
        }
    }

    if request.page.size >= config.large_page_size {
        score += 2.5;
    } else if request.page.size > config.page_size_score_threshold {
        score += 1.0;
    }
    if request.options.highlight {
        score += 1.0;
    }
    if request.options.suggest {
        score += 1.0;
    }

    (score * 10.0).round() / 10.0
}

/// Decision rules, applied in order.
fn decide(
    request: &SearchRequest,
    score: f64,
    config: &ClassifierConfig,
) -> (QueryType, String) {
    let q = request.free_text();
    let has_features = request.options.highlight || request.options.suggest;

    // 1. Cheap filter-only lookups stay on the simple engine.
    if score <= config.simple_threshold
        && q.is_none()
        && request.filters.len() <= 2
        && !has_features
    {
        return (
            QueryType::Simple,
            "exact-match filters within simple budget".to_string(),
        );
    }

    // 2. Outright complex by score.
    if score >= config.complex_threshold {
        return (
            QueryType::Complex,
            format!("complexity score {score} at or above threshold"),
        );
    }

    // 3. Features only the complex engine implements.
    if let Some(reason) = complex_only_feature(request, q, config) {
        return (QueryType::Complex, reason);
    }

    // 4. Text relevance plus structured pruning.
    if q.is_some() && !request.filters.is_empty() {
        return (
            QueryType::Hybrid,
            "free text with structured filters".to_string(),
        );
    }

    // 5. Residual split on the mid threshold.
    if score < config.mid_threshold {
        (QueryType::Simple, "low residual score".to_string())
    } else {
        (QueryType::Complex, "high residual score".to_string())
    }
}

fn complex_only_feature(
    request: &SearchRequest,
    q: Option<&str>,
    config: &ClassifierConfig,
) -> Option<String> {
    if request.options.highlight {
        return Some("highlighting requires the complex engine".to_string());
    }
    if request.options.suggest {
        return Some("inline suggestions require the complex engine".to_string());
    }
    if let Some(q) = q {
        if has_phrase(q) {
            return Some("phrase query".to_string());
        }
        if has_fuzzy(q) && q.len() > 10 {
            return Some("long fuzzy query".to_string());
        }
        if word_count(q) >= config.long_query_words {
            return Some("long multi-word query".to_string());
        }
    }
    if request.filters.keys().any(|field| field.contains('.')) {
        return Some("nested filter path".to_string());
    }
    if request.page.size >= config.large_page_size {
        return Some("very large page".to_string());
    }
    None
}

/// Cacheability gate: time-sensitive ranges, very long queries, and very
/// large pages are not worth storing.
fn is_cacheable(request: &SearchRequest, config: &ClassifierConfig) -> bool {
    for (field, value) in &request.filters {
        let time_like = field.to_ascii_lowercase().contains("date");
        if time_like && matches!(value, FilterValue::Range(_)) {
            return false;
        }
    }
    if let Some(q) = request.free_text() {
        if q.chars().count() > config.long_query_chars {
            return false;
        }
    }
    if request.page.size >= config.large_page_size {
        return false;
    }
    true
}

fn word_count(q: &str) -> usize {
    q.split_whitespace().count()
}

fn has_phrase(q: &str) -> bool {
    q.matches('"').count() >= 2
}

fn has_fuzzy(q: &str) -> bool {
    q.split_whitespace().any(|w| w.ends_with('~'))
}

fn is_text_sort_field(field: &str) -> bool {
    let lowered = field.to_ascii_lowercase();
    !(lowered == "_score"
        || lowered.starts_with("numeric.")
        || lowered.starts_with("dates.")
        || lowered.ends_with("_at")
        || lowered.ends_with("count")
        || lowered.ends_with("amount"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchgate_protocol::{RangeFilter, SortKey, SortOrder};

    fn config() -> ClassifierConfig {
        ClassifierConfig::default()
    }

    #[test]
    fn test_filter_only_request_is_simple() {
        let request = SearchRequest::default()
            .with_filter("entity", FilterValue::terms(["customer"]))
            .with_filter("status", FilterValue::terms(["active"]))
            .with_page_size(10);
        let c = classify(&request, &config());
        assert_eq!(c.query_type, QueryType::Simple);
        assert!(c.cacheable);
    }

    #[test]
    fn test_text_with_filters_is_hybrid() {
        let request = SearchRequest::with_query("acme")
            .with_filter("entity", FilterValue::terms(["customer"]))
            .with_filter("status", FilterValue::terms(["active"]));
        let c = classify(&request, &config());
        assert_eq!(c.query_type, QueryType::Hybrid);
    }

    #[test]
    fn test_highlight_forces_complex() {
        let mut request = SearchRequest::with_query("overdue invoice payment")
            .with_filter("entity", FilterValue::terms(["order", "invoice"]));
        request.options.highlight = true;
        let c = classify(&request, &config());
        assert_eq!(c.query_type, QueryType::Complex);
    }

    #[test]
    fn test_phrase_forces_complex() {
        let request = SearchRequest::with_query(r#""exact phrase here""#);
        let c = classify(&request, &config());
        assert_eq!(c.query_type, QueryType::Complex);
    }

    #[test]
    fn test_long_multiword_query_forces_complex() {
        let request = SearchRequest::with_query("one two three four five six");
        let c = classify(&request, &config());
        assert_eq!(c.query_type, QueryType::Complex);
    }

    #[test]
    fn test_nested_filter_path_forces_complex() {
        let request = SearchRequest::default()
            .with_filter(
                "numeric.amount",
                FilterValue::Range(RangeFilter {
                    gte: Some(serde_json::json!(1000)),
                    ..RangeFilter::default()
                }),
            )
            .with_filter("entity", FilterValue::terms(["order"]))
            .with_filter("status", FilterValue::scalar("open"));
        let c = classify(&request, &config());
        assert_eq!(c.query_type, QueryType::Complex);
    }

    #[test]
    fn test_very_large_page_forces_complex_and_blocks_cache() {
        let request = SearchRequest::default()
            .with_filter("entity", FilterValue::terms(["customer"]))
            .with_page_size(150);
        let c = classify(&request, &config());
        assert_eq!(c.query_type, QueryType::Complex);
        assert!(!c.cacheable);
    }

    #[test]
    fn test_date_range_blocks_cache() {
        let request = SearchRequest::default()
            .with_filter("entity", FilterValue::terms(["order"]))
            .with_filter(
                "dates.created_at",
                FilterValue::Range(RangeFilter {
                    gte: Some(serde_json::json!("2026-01-01")),
                    ..RangeFilter::default()
                }),
            );
        let c = classify(&request, &config());
        assert!(!c.cacheable);

        // A scalar date filter does not block caching; only ranges do.
        let request = SearchRequest::default()
            .with_filter("dates.created_at", FilterValue::scalar("2026-01-01"));
        assert!(classify(&request, &config()).cacheable);
    }

    #[test]
    fn test_long_free_text_blocks_cache() {
        let request = SearchRequest::with_query("lorem ".repeat(40));
        let c = classify(&request, &config());
        assert!(!c.cacheable);
    }

    #[test]
    fn test_deterministic() {
        let request = SearchRequest::with_query("technology")
            .with_filter("status", FilterValue::scalar("active"))
            .with_filter("entity", FilterValue::scalar("customer"));
        let a = classify(&request, &config());
        let b = classify(&request, &config());
        assert_eq!(a, b);
        assert!(a.cacheable);
        assert!(a.estimated_latency_ms > 0);
    }

    #[test]
    fn test_score_rounded_to_one_decimal() {
        let request = SearchRequest::with_query("acme corp")
            .with_filter("status", FilterValue::scalar("active"));
        let c = classify(&request, &config());
        let rescaled = c.complexity_score * 10.0;
        assert!((rescaled - rescaled.round()).abs() < 1e-9);
    }

    #[test]
    fn test_text_sort_weighs_more_than_numeric_sort() {
        let base = SearchRequest::with_query("acme");
        let mut text_sort = base.clone();
        text_sort.sort.push(SortKey {
            field: "title".to_string(),
            order: SortOrder::Asc,
        });
        let mut numeric_sort = base.clone();
        numeric_sort.sort.push(SortKey {
            field: "numeric.amount".to_string(),
            order: SortOrder::Asc,
        });
        let text_score = classify(&text_sort, &config()).complexity_score;
        let numeric_score = classify(&numeric_sort, &config()).complexity_score;
        assert!(text_score > numeric_score);
    }

    #[test]
    fn test_estimated_latency_scales_with_score() {
        let light = classify(&SearchRequest::with_query("a"), &config());
        let heavy = classify(
            &SearchRequest::with_query("a b c d e f g h")
                .with_filter("x", FilterValue::scalar("1")),
            &config(),
        );
        assert!(heavy.complexity_score > light.complexity_score);
    }

    #[test]
    fn test_empty_request_is_simple_listing() {
        let c = classify(&SearchRequest::default(), &config());
        assert_eq!(c.query_type, QueryType::Simple);
        assert!(c.cacheable);
    }
}
