//! Trait definition for pluggable search sources.
//!
//! Each provider (Bing, Baidu, Sogou, ...) implements [`SourceAdapter`] to
//! describe how its result pages are requested and how records are extracted
//! from them. The engine never talks to a provider except through this trait.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{EngineError, Result};
use crate::types::{FetchDescriptor, FetchOutcome, Importance, Query, RawResult};

/// Result of a request hook: either already finished, or a future that the
/// caller must await before proceeding.
pub enum HookOutcome {
    /// The hook ran to completion synchronously.
    Ready,
    /// The hook still has asynchronous work to do.
    Pending(BoxFuture<'static, ()>),
}

impl HookOutcome {
    /// Wrap an asynchronous hook body.
    pub fn pending<F>(fut: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self::Pending(Box::pin(fut))
    }

    /// Drive the hook to completion.
    pub async fn finish(self) {
        if let Self::Pending(fut) = self {
            fut.await;
        }
    }
}

/// A pluggable search source.
///
/// Implementors turn a [`Query`] into a finite sequence of page fetches and
/// turn each fetched page into zero or more [`RawResult`]s. Records without
/// extractable text must not be yielded.
///
/// All implementations must be `Send + Sync`: one instance is shared by every
/// request for the lifetime of the process. Any session state an adapter
/// keeps (cookies, tokens) is owned and locked by the adapter itself.
pub trait SourceAdapter: Send + Sync {
    /// Unique source name, as used in query parameters and slave allow-lists.
    fn name(&self) -> &str;

    /// Whether result URLs are indirection links that must be resolved.
    fn fake_url(&self) -> bool {
        false
    }

    /// Trust weight applied to this source's relevance scores.
    fn importance(&self) -> Importance {
        Importance::Normal
    }

    /// Human-facing URL of this source's result page for `query`.
    fn search_url(&self, query: &Query) -> String;

    /// Page fetches needed to collect `query.max_results_per_source()`
    /// records. The sequence is finite and consumed once.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidQuery`] if the source cannot express
    /// the query's options.
    fn page_requests(&self, query: &Query)
        -> Result<Box<dyn Iterator<Item = FetchDescriptor> + Send>>;

    /// Extract records from one fetched page.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Extraction`] if the page cannot be parsed.
    fn extract_results(&self, outcome: &FetchOutcome) -> Result<Vec<RawResult>>;

    /// Called before each fetch for this source, e.g. to attach cookies.
    fn before_request(&self, _descriptor: &mut FetchDescriptor) -> HookOutcome {
        HookOutcome::Ready
    }

    /// Called after each completed fetch for this source.
    fn after_request(&self, _outcome: &FetchOutcome) -> HookOutcome {
        HookOutcome::Ready
    }
}

/// Process-wide table of registered sources, keyed by name.
///
/// Built once at startup and read-only afterwards. Iteration order is
/// sorted by name.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.sources.insert(adapter.name().to_string(), adapter);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Look up an adapter by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn SourceAdapter>> {
        self.sources.get(name)
    }

    /// Look up an adapter, failing with [`EngineError::UnknownSource`].
    pub fn require(&self, name: &str) -> Result<&Arc<dyn SourceAdapter>> {
        self.get(name)
            .ok_or_else(|| EngineError::UnknownSource(name.to_string()))
    }

    /// Whether a source with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Registered source names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no sources are registered.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockSource {
        name: &'static str,
        hooks: Arc<AtomicUsize>,
    }

    impl SourceAdapter for MockSource {
        fn name(&self) -> &str {
            self.name
        }

        fn search_url(&self, query: &Query) -> String {
            format!("https://mock.test/?q={}", query.text)
        }

        fn page_requests(
            &self,
            _query: &Query,
        ) -> Result<Box<dyn Iterator<Item = FetchDescriptor> + Send>> {
            Ok(Box::new(
                (0..2).map(|p| FetchDescriptor::get(format!("https://mock.test/?p={p}"))),
            ))
        }

        fn extract_results(&self, outcome: &FetchOutcome) -> Result<Vec<RawResult>> {
            if outcome.body.is_empty() {
                return Err(EngineError::Extraction("empty page".into()));
            }
            Ok(vec![RawResult {
                title: "t".into(),
                text: outcome.body.clone(),
                url: outcome.url.clone(),
            }])
        }

        fn after_request(&self, _outcome: &FetchOutcome) -> HookOutcome {
            let hooks = Arc::clone(&self.hooks);
            HookOutcome::pending(async move {
                tokio::task::yield_now().await;
                hooks.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    fn mock(name: &'static str) -> (Arc<dyn SourceAdapter>, Arc<AtomicUsize>) {
        let hooks = Arc::new(AtomicUsize::new(0));
        let adapter = Arc::new(MockSource {
            name,
            hooks: Arc::clone(&hooks),
        });
        (adapter, hooks)
    }

    #[test]
    fn adapter_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MockSource>();
        assert_send_sync::<SourceRegistry>();
    }

    #[test]
    fn default_attributes() {
        let (adapter, _) = mock("Mock");
        assert!(!adapter.fake_url());
        assert_eq!(adapter.importance(), Importance::Normal);
    }

    #[test]
    fn registry_names_are_sorted() {
        let registry = SourceRegistry::new()
            .with(mock("Sogou").0)
            .with(mock("Baidu").0)
            .with(mock("Bing").0);
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["Baidu", "Bing", "Sogou"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn require_unknown_source_fails() {
        let registry = SourceRegistry::new().with(mock("Bing").0);
        assert!(registry.require("Bing").is_ok());
        let err = registry.require("Altavista").err().expect("unknown");
        assert!(err.to_string().contains("Altavista"));
    }

    #[test]
    fn page_requests_are_finite() {
        let (adapter, _) = mock("Mock");
        let pages: Vec<_> = adapter
            .page_requests(&Query::new("q"))
            .expect("requests")
            .collect();
        assert_eq!(pages.len(), 2);
    }

    #[tokio::test]
    async fn sync_hook_is_ready() {
        let (adapter, _) = mock("Mock");
        let mut d = FetchDescriptor::get("https://mock.test");
        assert!(matches!(adapter.before_request(&mut d), HookOutcome::Ready));
    }

    #[tokio::test]
    async fn async_hook_runs_when_finished() {
        let (adapter, hooks) = mock("Mock");
        let outcome = FetchOutcome {
            url: "https://mock.test".into(),
            status: 200,
            headers: vec![],
            body: "x".into(),
        };
        let hook = adapter.after_request(&outcome);
        assert_eq!(hooks.load(Ordering::SeqCst), 0);
        hook.finish().await;
        assert_eq!(hooks.load(Ordering::SeqCst), 1);
    }
}
