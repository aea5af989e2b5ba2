//! Integration tests for the search pipeline.
//!
//! A `wiremock` server plays the slave node: it answers signed page RPCs
//! with canned records, so the orchestrator, worker pool, gathers, merge
//! and envelope are exercised without touching real providers.

use std::sync::Arc;
use std::time::Duration;

use metase_engine::orchestrator::merge::{merge, Merger};
use metase_engine::orchestrator::scoring::{score_records, Scored};
use metase_engine::{
    DispatchRouter, EngineConfig, FetchDescriptor, FetchOutcome, Importance, MetaSearch, Query,
    RawResult, Result, SlaveEntry, SourceAdapter, SourceRegistry,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Canned {
    name: &'static str,
    importance: Importance,
    fake_url: bool,
}

impl SourceAdapter for Canned {
    fn name(&self) -> &str {
        self.name
    }

    fn fake_url(&self) -> bool {
        self.fake_url
    }

    fn importance(&self) -> Importance {
        self.importance
    }

    fn search_url(&self, query: &Query) -> String {
        format!("https://{}.test/search?q={}", self.name.to_lowercase(), query.text)
    }

    fn page_requests(&self, query: &Query) -> Result<Box<dyn Iterator<Item = FetchDescriptor> + Send>> {
        let url = self.search_url(query);
        Ok(Box::new(std::iter::once(FetchDescriptor::get(url))))
    }

    fn extract_results(&self, _outcome: &FetchOutcome) -> Result<Vec<RawResult>> {
        Ok(vec![])
    }
}

fn canned(name: &'static str, importance: Importance) -> Arc<dyn SourceAdapter> {
    Arc::new(Canned {
        name,
        importance,
        fake_url: false,
    })
}

fn record(url: &str, title: &str) -> RawResult {
    RawResult {
        title: title.to_string(),
        text: format!("{title} abstract"),
        url: url.to_string(),
    }
}

async fn page_reply(server: &MockServer, source: &str, records: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/v1/fetch"))
        .and(query_param("name", source))
        .and(query_param("rtype", "page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": records })))
        .mount(server)
        .await;
}

fn engine(registry: SourceRegistry, server: &MockServer, config: EngineConfig) -> MetaSearch {
    let registry = Arc::new(registry);
    let slaves = [SlaveEntry::wildcard(server.address().to_string())];
    let router = DispatchRouter::build(&slaves, &registry, "unused").expect("router");
    MetaSearch::from_config(&config, registry, router).expect("engine")
}

fn config() -> EngineConfig {
    EngineConfig {
        api_secret: "pipeline".into(),
        timeout_secs: 5,
        max_clients: 4,
        ..Default::default()
    }
}

#[tokio::test]
async fn weather_end_to_end_merges_shared_url() {
    let server = MockServer::start().await;
    page_reply(&server, "S1", json!([{"title": "From S1", "text": "one", "url": "a"}])).await;
    page_reply(&server, "S2", json!([{"title": "From S2", "text": "two", "url": "a"}])).await;

    let registry = SourceRegistry::new()
        .with(canned("S1", Importance::High))
        .with(canned("S2", Importance::Critical));
    let response = engine(registry, &server, config())
        .search(Query::new("weather"))
        .await
        .expect("response");

    assert_eq!(response.records.len(), 1);
    let merged = &response.records[0];
    assert_eq!(merged.url, "a");
    assert_eq!(merged.id, 1);
    assert_eq!(merged.relevance, 10);
    let mut sources = merged.sources.clone();
    sources.sort();
    assert_eq!(sources, vec!["S1", "S2"]);
    // Importance 3 beats importance 2 at the same position.
    assert_eq!(merged.title, "From S2");

    let meta = &response.meta;
    assert_eq!(meta.request.query, "weather");
    assert_eq!(meta.request.max_results_per_source, 20);
    assert_eq!(meta.response.merged_record_count, 1);
    assert_eq!(meta.response.per_source["S1"].record_count, 1);
    assert_eq!(
        meta.response.per_source["S2"].canonical_search_url,
        "https://s2.test/search?q=weather"
    );
}

#[tokio::test]
async fn records_truncated_to_per_source_limit() {
    let server = MockServer::start().await;
    let many: Vec<_> = (0..15)
        .map(|i| json!({"title": format!("t{i}"), "text": "x", "url": format!("https://r.example/{i}")}))
        .collect();
    page_reply(&server, "S1", json!(many)).await;

    let registry = SourceRegistry::new().with(canned("S1", Importance::Normal));
    let response = engine(registry, &server, config())
        .search(Query::new("q").with_max_results_per_source(10))
        .await
        .expect("response");
    assert_eq!(response.records.len(), 10);
    assert_eq!(response.records[0].url, "https://r.example/0");
}

#[tokio::test]
async fn failed_fake_url_resolution_keeps_original_url() {
    let server = MockServer::start().await;
    page_reply(
        &server,
        "Fake",
        json!([{"title": "t", "text": "x", "url": "https://fake.test/link?id=1"}]),
    )
    .await;
    Mock::given(method("POST"))
        .and(query_param("rtype", "url"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let registry = SourceRegistry::new().with(Arc::new(Canned {
        name: "Fake",
        importance: Importance::High,
        fake_url: true,
    }));
    let response = engine(registry, &server, config())
        .search(Query::new("q"))
        .await
        .expect("response");
    assert_eq!(response.records.len(), 1);
    assert_eq!(response.records[0].url, "https://fake.test/link?id=1");
    assert_eq!(response.records[0].relevance, 10);
}

#[tokio::test]
async fn fake_url_resolved_against_original() {
    let server = MockServer::start().await;
    page_reply(
        &server,
        "Fake",
        json!([{"title": "t", "text": "x", "url": "https://fake.test/link?id=1"}]),
    )
    .await;
    Mock::given(method("POST"))
        .and(query_param("rtype", "url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": "/real/page"})))
        .mount(&server)
        .await;

    let registry = SourceRegistry::new().with(Arc::new(Canned {
        name: "Fake",
        importance: Importance::High,
        fake_url: true,
    }));
    let response = engine(registry, &server, config())
        .search(Query::new("q"))
        .await
        .expect("response");
    assert_eq!(response.records[0].url, "https://fake.test/real/page");
}

#[tokio::test]
async fn slow_resolution_keeps_unresolved_records() {
    let server = MockServer::start().await;
    page_reply(
        &server,
        "Fake",
        json!([{"title": "t", "text": "x", "url": "https://fake.test/link?id=7"}]),
    )
    .await;
    Mock::given(method("POST"))
        .and(query_param("rtype", "url"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": "https://real.example/"}))
                .set_delay(Duration::from_secs(6)),
        )
        .mount(&server)
        .await;

    let registry = SourceRegistry::new().with(Arc::new(Canned {
        name: "Fake",
        importance: Importance::High,
        fake_url: true,
    }));
    let config = EngineConfig {
        timeout_secs: 2,
        ..config()
    };
    let started = std::time::Instant::now();
    let response = engine(registry, &server, config)
        .search(Query::new("q"))
        .await
        .expect("response");

    assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
    assert_eq!(response.records.len(), 1);
    assert_eq!(response.records[0].url, "https://fake.test/link?id=7");
    assert_eq!(response.meta.response.per_source["Fake"].record_count, 1);
}

#[tokio::test]
async fn failing_slave_degrades_to_partial_results() {
    let server = MockServer::start().await;
    page_reply(&server, "Good", json!([{"title": "t", "text": "x", "url": "https://ok.example/"}])).await;
    Mock::given(method("POST"))
        .and(query_param("name", "Bad"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let registry = SourceRegistry::new()
        .with(canned("Good", Importance::Normal))
        .with(canned("Bad", Importance::Normal));
    let response = engine(registry, &server, config())
        .search(Query::new("q"))
        .await
        .expect("response");
    assert_eq!(response.records.len(), 1);
    assert_eq!(response.meta.response.per_source["Bad"].record_count, 0);
}

#[tokio::test]
async fn slow_source_cut_off_by_early_stop() {
    let server = MockServer::start().await;
    let names = ["A", "B", "C", "D"];
    for name in names {
        page_reply(
            &server,
            name,
            json!([{"title": name, "text": "x", "url": format!("https://{name}.example/")}]),
        )
        .await;
    }
    Mock::given(method("POST"))
        .and(query_param("name", "Slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": [{"title": "s", "text": "x", "url": "https://slow.example/"}]}))
                .set_delay(Duration::from_secs(8)),
        )
        .mount(&server)
        .await;

    let mut registry = SourceRegistry::new().with(canned("Slow", Importance::Normal));
    for name in names {
        registry.register(canned(name, Importance::Normal));
    }
    let config = EngineConfig {
        timeout_secs: 4,
        ..config()
    };
    let started = std::time::Instant::now();
    let response = engine(registry, &server, config)
        .search(Query::new("q"))
        .await
        .expect("response");

    // 4 of 5 sources in: wait is floored at timeout / 4 = 1 s, far below 4 s.
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    assert_eq!(response.records.len(), 4);
    assert_eq!(response.meta.response.per_source["Slow"].record_count, 0);
}

#[tokio::test]
async fn unknown_source_is_rejected() {
    let server = MockServer::start().await;
    let registry = SourceRegistry::new().with(canned("S1", Importance::Normal));
    let err = engine(registry, &server, config())
        .search(Query::new("q").with_sources(Some(vec!["Nope".into()])))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Nope"));
}

// Merge properties over the public API.

fn scored(url: &str, title: &str, relevance: f64) -> Scored {
    Scored {
        record: record(url, title),
        relevance,
    }
}

#[test]
fn relevances_five_and_three_accumulate_to_eight() {
    let mut merger = Merger::new();
    merger.add_source("A", vec![scored("u", "A wins", 5.0)]);
    merger.add_source("B", vec![scored("u", "B loses", 3.0)]);
    assert_eq!(merger.accumulated("u"), Some(8.0));
    let ranked = merger.finish();
    assert_eq!(ranked[0].sources, vec!["A", "B"]);
    assert_eq!(ranked[0].title, "A wins");
}

#[test]
fn merge_is_commutative_in_source_order() {
    let a = score_records(
        Importance::High,
        vec![record("x", "ax"), record("y", "ay"), record("z", "az")],
    );
    let b = score_records(Importance::Normal, vec![record("y", "by"), record("w", "bw")]);
    let c = score_records(Importance::Critical, vec![record("w", "cw"), record("x", "cx")]);

    let normalise = |ranked: Vec<metase_engine::RankedResult>| {
        let mut rows: Vec<_> = ranked
            .into_iter()
            .map(|r| {
                let mut sources = r.sources;
                sources.sort();
                (r.url, r.relevance, sources, r.title)
            })
            .collect();
        rows.sort();
        rows
    };

    let all = normalise(merge([("A", a.clone()), ("B", b.clone()), ("C", c.clone())]));
    let reversed = normalise(merge([("C", c.clone()), ("B", b.clone()), ("A", a.clone())]));
    let mut staged = Merger::new();
    staged.add_source("B", b);
    staged.add_source("A", a);
    staged.add_source("C", c);
    let staged = normalise(staged.finish());

    assert_eq!(all, reversed);
    assert_eq!(all, staged);
}

#[test]
fn top_result_is_ten_and_none_exceed_it() {
    let records: Vec<_> = (0..50)
        .map(|i| record(&format!("https://r.example/{i}"), "t"))
        .collect();
    let ranked = merge([
        ("A", score_records(Importance::Normal, records.clone())),
        ("B", score_records(Importance::Critical, records[10..].to_vec())),
    ]);
    assert_eq!(ranked[0].relevance, 10);
    assert!(ranked.iter().all(|r| (1..=10).contains(&r.relevance)));
    assert!(ranked.windows(2).all(|w| w[0].id + 1 == w[1].id));
}
