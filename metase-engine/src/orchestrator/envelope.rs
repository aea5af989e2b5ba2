//! JSON response envelope of the search endpoint.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::RankedResult;

/// Full search response: metadata plus merged records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Request echo and response statistics.
    pub meta: ResponseMeta,
    /// Merged records in rank order.
    pub records: Vec<RankedResult>,
}

/// `meta` block of a [`SearchResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// What was asked.
    pub request: RequestMeta,
    /// What was produced.
    pub response: ResponseStats,
}

/// Echo of the effective request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Query text.
    pub query: String,
    /// Effective per-source record count after clamping.
    pub max_results_per_source: usize,
    /// Sources queried.
    pub sources: Vec<String>,
}

/// Statistics of the produced response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseStats {
    /// Wall-clock time spent, rounded to milliseconds.
    pub duration_seconds: f64,
    /// Number of merged records.
    pub merged_record_count: usize,
    /// Per-source statistics.
    pub per_source: BTreeMap<String, SourceStats>,
}

/// Statistics of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    /// Merged records this source contributed to.
    pub record_count: usize,
    /// The source's own result page for the query.
    pub canonical_search_url: String,
}

/// Seconds in `duration`, rounded to milliseconds.
pub fn rounded_seconds(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0).round() / 1000.0
}

/// Number of merged records whose sources include `source`.
pub fn record_count(records: &[RankedResult], source: &str) -> usize {
    records
        .iter()
        .filter(|r| r.sources.iter().any(|s| s == source))
        .count()
}
