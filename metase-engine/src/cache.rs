//! In-memory cache for merged search responses.
//!
//! Keyed by the normalised query text, the sorted source set and the query
//! options. Uses [`moka`] for async-friendly caching with a TTL and
//! automatic eviction. Each [`MetaSearch`](crate::MetaSearch) owns its cache.

use std::time::Duration;

use moka::future::Cache;

use crate::orchestrator::envelope::SearchResponse;
use crate::types::{Query, RecentDays};

/// Maximum number of cached responses.
const MAX_CACHE_ENTRIES: u64 = 256;

/// Composite cache key: normalised query plus every option that changes
/// the response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    sources: Vec<String>,
    max_results_per_source: usize,
    recent_days: Option<RecentDays>,
    site_filter: Option<String>,
}

impl CacheKey {
    /// Build a key for `query` run against `sources`.
    ///
    /// The query text is lowercased and trimmed, and the source list is
    /// sorted, so `[Bing, Baidu]` and `[Baidu, Bing]` share an entry.
    pub fn new(query: &Query, sources: &[String]) -> Self {
        let mut sources = sources.to_vec();
        sources.sort();
        sources.dedup();
        Self {
            query: query.text.trim().to_lowercase(),
            sources,
            max_results_per_source: query.max_results_per_source(),
            recent_days: query.recent_days,
            site_filter: query.site_filter.clone(),
        }
    }
}

/// TTL-bounded response cache.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<CacheKey, SearchResponse>,
}

impl ResponseCache {
    /// A cache holding responses for `ttl`, or `None` when `ttl` is zero.
    pub fn with_ttl(ttl: Duration) -> Option<Self> {
        if ttl.is_zero() {
            return None;
        }
        Some(Self {
            inner: Cache::builder()
                .max_capacity(MAX_CACHE_ENTRIES)
                .time_to_live(ttl)
                .build(),
        })
    }

    /// Cached response for `key`, if present and fresh.
    pub async fn get(&self, key: &CacheKey) -> Option<SearchResponse> {
        self.inner.get(key).await
    }

    /// Store a response.
    pub async fn insert(&self, key: CacheKey, response: SearchResponse) {
        self.inner.insert(key, response).await;
    }
}
