//! Core search orchestrator: distributed fan-out, gather, merge, rank.
//!
//! # Pipeline
//!
//! 1. Pick the requested sources (all registered ones by default)
//! 2. For each source, concurrently:
//!    - build its page fetches and push one signed page RPC per page onto
//!      the [`WorkQueue`], each to a randomly chosen eligible slave
//!    - gather the pages under a [`GatherTask`] with early stop
//!    - concatenate the extracted records, truncated to the per-source limit
//!    - for `fake_url` sources, publish the unresolved records as an interim
//!      result, then resolve every URL through a second gathered round of
//!      `url` RPCs
//! 3. Gather all sources under one more [`GatherTask`]
//! 4. Score by position and importance, merge by URL, normalise, and pack
//!    the response envelope
//!
//! Every failure is contained to the fetch or source it happened in: the
//! slot stays empty and the search carries on with what arrived.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::envelope::{
    record_count, rounded_seconds, RequestMeta, ResponseMeta, ResponseStats, SearchResponse,
    SourceStats,
};
use super::merge::Merger;
use super::scoring::score_records;
use crate::cache::{CacheKey, ResponseCache};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::gather::{EarlyStop, GatherTask};
use crate::http;
use crate::queue::WorkQueue;
use crate::router::DispatchRouter;
use crate::signing::Signer;
use crate::slave::SlaveClient;
use crate::source::{SourceAdapter, SourceRegistry};
use crate::types::{FetchDescriptor, Query, RawResult};

struct Shared {
    registry: Arc<SourceRegistry>,
    router: DispatchRouter,
    queue: WorkQueue,
    client: SlaveClient,
    timeout: Duration,
    early_stop: Option<EarlyStop>,
    cache: Option<ResponseCache>,
}

/// The metasearch orchestrator. Cloning yields another handle to the same
/// worker pool, router and cache.
#[derive(Clone)]
pub struct MetaSearch {
    shared: Arc<Shared>,
}

impl MetaSearch {
    /// Build an orchestrator from configuration.
    ///
    /// Must be called from within a tokio runtime: the worker pool is
    /// started immediately.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Http`] if the RPC client cannot be built.
    pub fn from_config(
        config: &EngineConfig,
        registry: Arc<SourceRegistry>,
        router: DispatchRouter,
    ) -> Result<Self> {
        let rpc = http::build_rpc_client(config.timeout(), config.max_clients)?;
        let client = SlaveClient::new(rpc, Signer::new(config.api_secret.clone()), config.api_version);
        Ok(Self {
            shared: Arc::new(Shared {
                registry,
                router,
                queue: WorkQueue::start(config.max_clients),
                client,
                timeout: config.timeout(),
                early_stop: config.early_stop.policy(),
                cache: ResponseCache::with_ttl(Duration::from_secs(config.cache_ttl_seconds)),
            }),
        })
    }

    /// The registered sources.
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.shared.registry
    }

    /// Run `query` against its sources and return the merged response.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownSource`] if the query names a source that
    /// is not registered. Fetch failures never fail the search.
    pub async fn search(&self, query: Query) -> Result<SearchResponse> {
        let started = Instant::now();
        let sources = self.select_sources(&query)?;

        let key = self
            .shared
            .cache
            .as_ref()
            .map(|_| CacheKey::new(&query, &sources));
        if let (Some(cache), Some(key)) = (&self.shared.cache, &key) {
            if let Some(mut hit) = cache.get(key).await {
                tracing::debug!("search cache hit");
                // The key is case- and order-insensitive; echo this request.
                hit.meta.request.query = query.text.clone();
                for (name, stats) in hit.meta.response.per_source.iter_mut() {
                    if let Some(adapter) = self.shared.registry.get(name) {
                        stats.canonical_search_url = adapter.search_url(&query);
                    }
                }
                hit.meta.request.sources = sources;
                return Ok(hit);
            }
        }

        tracing::trace!(query = %query.text, ?sources, "search started");
        let query = Arc::new(query);
        let gather: GatherTask<Vec<RawResult>> =
            GatherTask::new(sources.len(), self.shared.early_stop, Some(self.shared.timeout));
        for (index, name) in sources.iter().enumerate() {
            let adapter = Arc::clone(self.shared.registry.require(name)?);
            let shared = Arc::clone(&self.shared);
            let query = Arc::clone(&query);
            let gather = gather.clone();
            tokio::spawn(async move {
                shared.collect_source(adapter, &query, index, &gather).await;
            });
        }
        gather.done().await;

        let mut merger = Merger::new();
        for (name, slot) in sources.iter().zip(gather.take_results()) {
            let importance = self.shared.registry.require(name)?.importance();
            merger.add_source(name, score_records(importance, slot.unwrap_or_default()));
        }
        let records = merger.finish();

        let per_source: BTreeMap<String, SourceStats> = sources
            .iter()
            .map(|name| {
                let url = self
                    .shared
                    .registry
                    .get(name)
                    .map(|a| a.search_url(&query))
                    .unwrap_or_default();
                (
                    name.clone(),
                    SourceStats {
                        record_count: record_count(&records, name),
                        canonical_search_url: url,
                    },
                )
            })
            .collect();

        let response = SearchResponse {
            meta: ResponseMeta {
                request: RequestMeta {
                    query: query.text.clone(),
                    max_results_per_source: query.max_results_per_source(),
                    sources,
                },
                response: ResponseStats {
                    duration_seconds: rounded_seconds(started.elapsed()),
                    merged_record_count: records.len(),
                    per_source,
                },
            },
            records,
        };
        tracing::debug!(
            merged = response.meta.response.merged_record_count,
            duration_seconds = response.meta.response.duration_seconds,
            "search finished"
        );

        if let (Some(cache), Some(key)) = (&self.shared.cache, key) {
            cache.insert(key, response.clone()).await;
        }
        Ok(response)
    }

    /// Requested source names, validated, in request order without repeats.
    fn select_sources(&self, query: &Query) -> Result<Vec<String>> {
        let registry = &self.shared.registry;
        match query.sources.as_deref() {
            None | Some([]) => Ok(registry.names().map(str::to_string).collect()),
            Some(requested) => {
                let mut selected: Vec<String> = Vec::with_capacity(requested.len());
                for name in requested {
                    if !registry.contains(name) {
                        return Err(EngineError::UnknownSource(name.clone()));
                    }
                    if !selected.contains(name) {
                        selected.push(name.clone());
                    }
                }
                Ok(selected)
            }
        }
    }
}

impl Shared {
    /// Fetch, extract and resolve one source, completing slot `index` of `outer`.
    async fn collect_source(
        &self,
        adapter: Arc<dyn SourceAdapter>,
        query: &Query,
        index: usize,
        outer: &GatherTask<Vec<RawResult>>,
    ) {
        let name = adapter.name().to_string();
        if self.router.slaves_for(&name).is_empty() {
            tracing::debug!(error = %EngineError::NoEligibleSlave(name.clone()), "source skipped");
            outer.skip(index);
            return;
        }
        let pages: Vec<FetchDescriptor> = match adapter.page_requests(query) {
            Ok(pages) => pages.collect(),
            Err(e) => {
                tracing::warn!(source = %name, error = %e, "cannot build page requests");
                outer.skip(index);
                return;
            }
        };

        let mut records = self.fetch_pages(&name, pages).await;
        records.truncate(query.max_results_per_source());
        tracing::debug!(source = %name, records = records.len(), "source pages gathered");

        if !adapter.fake_url() || records.is_empty() {
            outer.set_result(index, records);
            return;
        }

        outer.update_result(index, records.clone());
        let locations = self.resolve_urls(&name, &records).await;
        let mut resolved = 0usize;
        for (record, location) in records.iter_mut().zip(locations) {
            if let Some(location) = location {
                record.url = location;
                resolved += 1;
            }
        }
        tracing::debug!(source = %name, resolved, total = records.len(), "fake urls resolved");
        outer.set_result(index, records);
    }

    /// One page RPC per descriptor, gathered in page order.
    async fn fetch_pages(&self, source: &str, pages: Vec<FetchDescriptor>) -> Vec<RawResult> {
        let gather: GatherTask<Vec<RawResult>> =
            GatherTask::new(pages.len(), self.early_stop, Some(self.timeout));
        for (slot, descriptor) in pages.into_iter().enumerate() {
            let Some(slave) = self.router.resolve(source).cloned() else {
                gather.skip(slot);
                continue;
            };
            let client = self.client.clone();
            let task = gather.clone();
            let source_name = source.to_string();
            let pushed = self.queue.push(async move {
                match client.fetch_page(&slave, &source_name, &descriptor).await {
                    Ok(records) => {
                        task.set_result(slot, records);
                        Ok(())
                    }
                    Err(e) => {
                        task.skip(slot);
                        Err(e)
                    }
                }
            });
            if let Err(e) = pushed {
                tracing::warn!(source, error = %e, "page fetch not queued");
                gather.skip(slot);
            }
        }
        gather.done().await;
        gather
            .take_results()
            .into_iter()
            .flatten()
            .flatten()
            .collect()
    }

    /// One `url` RPC per record; `None` where resolution failed or found nothing.
    async fn resolve_urls(&self, source: &str, records: &[RawResult]) -> Vec<Option<String>> {
        let gather: GatherTask<String> =
            GatherTask::new(records.len(), self.early_stop, Some(self.timeout));
        for (slot, record) in records.iter().enumerate() {
            let Some(slave) = self.router.resolve(source).cloned() else {
                gather.skip(slot);
                continue;
            };
            let client = self.client.clone();
            let task = gather.clone();
            let source_name = source.to_string();
            let original = record.url.clone();
            let pushed = self.queue.push(async move {
                let descriptor = FetchDescriptor::get(original.clone());
                match client.resolve_url(&slave, &source_name, &descriptor).await {
                    Ok(Some(location)) => {
                        task.set_result(slot, resolve_against(&original, &location));
                        Ok(())
                    }
                    Ok(None) => {
                        task.skip(slot);
                        Ok(())
                    }
                    Err(e) => {
                        task.skip(slot);
                        Err(e)
                    }
                }
            });
            if let Err(e) = pushed {
                tracing::warn!(source, error = %e, "url resolution not queued");
                gather.skip(slot);
            }
        }
        gather.done().await;
        gather.take_results()
    }
}

/// Resolve `location` against `base`, falling back to `location` verbatim
/// when `base` is not an absolute URL.
pub fn resolve_against(base: &str, location: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(location)) {
        Ok(joined) => joined.to_string(),
        Err(_) => location.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FetchOutcome, Importance};

    struct Fixed {
        name: &'static str,
        importance: Importance,
    }

    impl SourceAdapter for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn importance(&self) -> Importance {
            self.importance
        }

        fn search_url(&self, query: &Query) -> String {
            format!("https://{}.test/?q={}", self.name, query.text)
        }

        fn page_requests(
            &self,
            _query: &Query,
        ) -> Result<Box<dyn Iterator<Item = FetchDescriptor> + Send>> {
            Ok(Box::new(std::iter::empty()))
        }

        fn extract_results(&self, _outcome: &FetchOutcome) -> Result<Vec<RawResult>> {
            Ok(vec![])
        }
    }

    fn registry() -> Arc<SourceRegistry> {
        Arc::new(
            SourceRegistry::new()
                .with(Arc::new(Fixed {
                    name: "Alpha",
                    importance: Importance::Normal,
                }))
                .with(Arc::new(Fixed {
                    name: "Beta",
                    importance: Importance::High,
                })),
        )
    }

    fn search() -> MetaSearch {
        let registry = registry();
        let router = DispatchRouter::build(&[], &registry, "127.0.0.1:1").expect("router");
        MetaSearch::from_config(&EngineConfig::default(), registry, router).expect("search")
    }

    #[test]
    fn resolve_against_joins_relative_locations() {
        assert_eq!(
            resolve_against("https://www.sogou.com/link?url=x", "/target"),
            "https://www.sogou.com/target"
        );
        assert_eq!(
            resolve_against("https://www.baidu.com/link?url=x", "https://other.example/a"),
            "https://other.example/a"
        );
        assert_eq!(resolve_against("not a url", "/target"), "/target");
    }

    #[tokio::test]
    async fn unknown_source_rejected() {
        let err = search()
            .search(Query::new("q").with_sources(Some(vec!["Gamma".into()])))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSource(name) if name == "Gamma"));
    }

    #[tokio::test]
    async fn default_sources_are_every_registered_one() {
        let response = search().search(Query::new("q")).await.expect("response");
        assert_eq!(response.meta.request.sources, vec!["Alpha", "Beta"]);
        assert_eq!(response.meta.response.merged_record_count, 0);
        assert_eq!(
            response.meta.response.per_source["Beta"].canonical_search_url,
            "https://Beta.test/?q=q"
        );
    }

    #[tokio::test]
    async fn repeated_sources_are_collapsed() {
        let response = search()
            .search(Query::new("q").with_sources(Some(vec!["Beta".into(), "Beta".into()])))
            .await
            .expect("response");
        assert_eq!(response.meta.request.sources, vec!["Beta"]);
    }

    #[tokio::test]
    async fn source_without_slave_contributes_nothing() {
        let registry = registry();
        let router = DispatchRouter::build(
            &[crate::router::SlaveEntry {
                address: "127.0.0.1:1".into(),
                allow: "Alpha".into(),
            }],
            &registry,
            "unused",
        )
        .expect("router");
        let search =
            MetaSearch::from_config(&EngineConfig::default(), registry, router).expect("search");
        let response = search.search(Query::new("q")).await.expect("response");
        assert_eq!(response.meta.response.per_source["Beta"].record_count, 0);
    }

    #[tokio::test]
    async fn cache_hit_echoes_current_request() {
        let registry = registry();
        let router = DispatchRouter::build(&[], &registry, "127.0.0.1:1").expect("router");
        let config = EngineConfig {
            cache_ttl_seconds: 60,
            ..Default::default()
        };
        let search = MetaSearch::from_config(&config, registry, router).expect("search");

        let first = search
            .search(Query::new("Weather").with_sources(Some(vec!["Beta".into(), "Alpha".into()])))
            .await
            .expect("first");
        assert_eq!(first.meta.request.query, "Weather");

        let second = search
            .search(Query::new("weather").with_sources(Some(vec!["Alpha".into(), "Beta".into()])))
            .await
            .expect("second");
        assert_eq!(second.meta.request.query, "weather");
        assert_eq!(second.meta.request.sources, vec!["Alpha", "Beta"]);
        assert_eq!(
            second.meta.response.per_source["Alpha"].canonical_search_url,
            "https://Alpha.test/?q=weather"
        );
        assert_eq!(
            second.meta.response.duration_seconds,
            first.meta.response.duration_seconds
        );
    }
}
