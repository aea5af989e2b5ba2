//! Slave side of the fetch RPC.
//!
//! [`FetchService`] verifies a signed request, performs the fetch with the
//! node's own HTTP clients and either runs the source's extraction (`page`)
//! or reports where the fetched link points (`url`).

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::http;
use crate::signing::{unix_now, SignedParams, Signer};
use crate::source::SourceRegistry;
use crate::types::{FetchDescriptor, FetchOutcome, RawResult, RequestKind};

/// Payload of a successful fetch RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FetchReply {
    /// Records extracted from a result page.
    Records(Vec<RawResult>),
    /// Resolved target of an indirection link, if one was found.
    Location(Option<String>),
}

/// Executes signed fetch requests on behalf of the orchestrator.
pub struct FetchService {
    registry: Arc<SourceRegistry>,
    signer: Signer,
    page_client: reqwest::Client,
    url_client: reqwest::Client,
    default_headers: BTreeMap<String, String>,
    user_agent: String,
    timeout: Duration,
}

impl FetchService {
    /// Create a service for `registry` using browser-like default headers and
    /// a randomly chosen User-Agent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Http`] if the HTTP clients cannot be built.
    pub fn new(registry: Arc<SourceRegistry>, signer: Signer, timeout: Duration) -> Result<Self> {
        Ok(Self {
            registry,
            signer,
            page_client: http::build_fetch_client(timeout, true)?,
            url_client: http::build_fetch_client(timeout, false)?,
            default_headers: http::default_headers(),
            user_agent: http::random_user_agent().to_string(),
            timeout,
        })
    }

    /// Use a fixed User-Agent for fetches that do not set one.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add or replace default outbound headers.
    pub fn with_default_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.default_headers.extend(headers);
        self
    }

    /// The source registry this service fetches for.
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// The page-fetching client, shared with adapters that refresh sessions.
    pub fn page_client(&self) -> &reqwest::Client {
        &self.page_client
    }

    /// Verify and execute a received request against the current clock.
    ///
    /// # Errors
    ///
    /// See [`handle_at`](Self::handle_at).
    pub async fn handle(&self, params: &SignedParams, body: &[u8]) -> Result<FetchReply> {
        self.handle_at(params, body, unix_now()).await
    }

    /// Verify and execute a received request at `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Auth`] for a bad signature or stale timestamp,
    /// [`EngineError::InvalidQuery`] for an undecodable descriptor,
    /// [`EngineError::UnknownSource`] for an unregistered source, and
    /// [`EngineError::Downstream`] if the target cannot be reached.
    pub async fn handle_at(
        &self,
        params: &SignedParams,
        body: &[u8],
        now: i64,
    ) -> Result<FetchReply> {
        self.signer.verify(params, body, now)?;
        let descriptor: FetchDescriptor = serde_json::from_slice(body)
            .map_err(|e| EngineError::InvalidQuery(format!("bad fetch descriptor: {e}")))?;
        self.fetch(&params.name, params.rtype, descriptor).await
    }

    /// Execute an already-verified fetch for `source`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownSource`] for an unregistered source and
    /// [`EngineError::Downstream`] if the target cannot be reached.
    pub async fn fetch(
        &self,
        source: &str,
        kind: RequestKind,
        mut descriptor: FetchDescriptor,
    ) -> Result<FetchReply> {
        let adapter = Arc::clone(self.registry.require(source)?);
        self.apply_defaults(&mut descriptor);
        adapter.before_request(&mut descriptor).finish().await;

        let client = match kind {
            RequestKind::Page => &self.page_client,
            RequestKind::Url => &self.url_client,
        };
        let outcome = http::execute(client, &descriptor, self.timeout).await?;
        adapter.after_request(&outcome).finish().await;

        match kind {
            RequestKind::Page => {
                let records = match adapter.extract_results(&outcome) {
                    Ok(records) => records
                        .into_iter()
                        .filter(|r| !r.text.trim().is_empty())
                        .collect(),
                    Err(e) => {
                        tracing::warn!(source, url = %outcome.url, status = outcome.status, error = %e, "extraction failed");
                        Vec::new()
                    }
                };
                tracing::debug!(source, url = %outcome.url, records = records.len(), "page fetched");
                Ok(FetchReply::Records(records))
            }
            RequestKind::Url => {
                let location = extract_location(&outcome);
                tracing::debug!(source, url = %outcome.url, ?location, "link resolved");
                Ok(FetchReply::Location(location))
            }
        }
    }

    fn apply_defaults(&self, descriptor: &mut FetchDescriptor) {
        let headers = descriptor.headers.get_or_insert_with(BTreeMap::new);
        for (name, value) in &self.default_headers {
            if !has_header(headers, name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        if !has_header(headers, "User-Agent") {
            headers.insert("User-Agent".to_string(), self.user_agent.clone());
        }
    }
}

fn has_header(headers: &BTreeMap<String, String>, name: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}

fn client_redirect() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"location\.(?:replace\(|href=)['"](.+?)['"]"#).ok())
        .as_ref()
}

/// Where a fetched link points: the `Location` header of a 3xx response, or
/// the target of a `location.replace(...)`/`location.href=` script in the
/// body. The value is reported as found, possibly relative.
pub fn extract_location(outcome: &FetchOutcome) -> Option<String> {
    if outcome.is_redirect() {
        return outcome.header("Location").map(str::to_string);
    }
    client_redirect()?
        .captures(&outcome.body)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceAdapter;
    use crate::types::Query;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NOW: i64 = 1_700_000_000;

    /// Emits one record per line of the page body.
    struct Lines;

    impl SourceAdapter for Lines {
        fn name(&self) -> &str {
            "Lines"
        }

        fn search_url(&self, _query: &Query) -> String {
            String::new()
        }

        fn page_requests(
            &self,
            _query: &Query,
        ) -> Result<Box<dyn Iterator<Item = FetchDescriptor> + Send>> {
            Ok(Box::new(std::iter::empty()))
        }

        fn extract_results(&self, outcome: &FetchOutcome) -> Result<Vec<RawResult>> {
            if outcome.status != 200 {
                return Err(EngineError::Extraction(format!("status {}", outcome.status)));
            }
            Ok(outcome
                .body
                .lines()
                .enumerate()
                .map(|(i, line)| RawResult {
                    title: format!("r{i}"),
                    text: line.to_string(),
                    url: format!("https://r.example/{i}"),
                })
                .collect())
        }
    }

    fn service() -> FetchService {
        let registry = Arc::new(SourceRegistry::new().with(Arc::new(Lines)));
        FetchService::new(registry, Signer::new("k"), Duration::from_secs(5))
            .expect("service")
            .with_user_agent("metase-test")
    }

    fn outcome(status: u16, location: Option<&str>, body: &str) -> FetchOutcome {
        FetchOutcome {
            url: "https://www.baidu.com/link?url=abc".into(),
            status,
            headers: location
                .map(|l| vec![("location".to_string(), l.to_string())])
                .unwrap_or_default(),
            body: body.into(),
        }
    }

    #[test]
    fn location_from_redirect_header() {
        let o = outcome(302, Some("https://target.example/page"), "");
        assert_eq!(
            extract_location(&o).as_deref(),
            Some("https://target.example/page")
        );
    }

    #[test]
    fn location_from_script_replace() {
        let o = outcome(
            200,
            None,
            r#"<script>window.location.replace("https://target.example/x")</script>"#,
        );
        assert_eq!(extract_location(&o).as_deref(), Some("https://target.example/x"));
    }

    #[test]
    fn location_from_script_href() {
        let o = outcome(200, None, "<script>location.href='/relative/path'</script>");
        assert_eq!(extract_location(&o).as_deref(), Some("/relative/path"));
    }

    #[test]
    fn no_location_found() {
        assert_eq!(extract_location(&outcome(200, None, "<html></html>")), None);
        assert_eq!(extract_location(&outcome(301, None, "")), None);
    }

    #[tokio::test]
    async fn page_fetch_extracts_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/results"))
            .and(header("User-Agent", "metase-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("alpha\n \nbeta"))
            .mount(&server)
            .await;

        let reply = service()
            .fetch(
                "Lines",
                RequestKind::Page,
                FetchDescriptor::get(format!("{}/results", server.uri())),
            )
            .await
            .expect("reply");
        let FetchReply::Records(records) = reply else {
            panic!("expected records");
        };
        let texts: Vec<_> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn explicit_user_agent_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("User-Agent", "custom"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x"))
            .mount(&server)
            .await;

        let d = FetchDescriptor::get(server.uri()).with_header("user-agent", "custom");
        let reply = service().fetch("Lines", RequestKind::Page, d).await.expect("reply");
        assert_eq!(reply, FetchReply::Records(vec![RawResult {
            title: "r0".into(),
            text: "x".into(),
            url: "https://r.example/0".into(),
        }]));
    }

    #[tokio::test]
    async fn extraction_failure_yields_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let reply = service()
            .fetch("Lines", RequestKind::Page, FetchDescriptor::get(server.uri()))
            .await
            .expect("reply");
        assert_eq!(reply, FetchReply::Records(vec![]));
    }

    #[tokio::test]
    async fn url_fetch_does_not_follow_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/link"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/landing"))
            .mount(&server)
            .await;

        let reply = service()
            .fetch(
                "Lines",
                RequestKind::Url,
                FetchDescriptor::get(format!("{}/link", server.uri())),
            )
            .await
            .expect("reply");
        assert_eq!(reply, FetchReply::Location(Some("/landing".into())));
    }

    #[tokio::test]
    async fn unknown_source_rejected() {
        let err = service()
            .fetch("Nope", RequestKind::Page, FetchDescriptor::get("http://127.0.0.1:1/"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSource(_)));
    }

    #[tokio::test]
    async fn unreachable_target_is_downstream() {
        let err = service()
            .fetch("Lines", RequestKind::Page, FetchDescriptor::get("http://127.0.0.1:1/"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Downstream(_)));
    }

    #[tokio::test]
    async fn bad_signature_rejected_before_fetch() {
        let svc = service();
        let body = serde_json::to_vec(&FetchDescriptor::get("http://127.0.0.1:1/")).expect("json");
        let mut params = Signer::new("k")
            .sign_now(&body, "Lines", RequestKind::Page, NOW)
            .expect("sign");
        params.signature = "00".repeat(32);
        let err = svc.handle_at(&params, &body, NOW).await.unwrap_err();
        assert!(matches!(err, EngineError::Auth(_)));
    }

    #[tokio::test]
    async fn stale_timestamp_rejected() {
        let svc = service();
        let body = serde_json::to_vec(&FetchDescriptor::get("http://127.0.0.1:1/")).expect("json");
        let params = Signer::new("k")
            .sign_now(&body, "Lines", RequestKind::Page, NOW)
            .expect("sign");
        let err = svc.handle_at(&params, &body, NOW + 601).await.unwrap_err();
        assert!(matches!(err, EngineError::Auth(_)));
    }

    #[tokio::test]
    async fn undecodable_body_is_invalid_query() {
        let svc = service();
        let body = b"not json";
        let params = Signer::new("k")
            .sign_now(body, "Lines", RequestKind::Page, NOW)
            .expect("sign");
        let err = svc.handle_at(&params, body, NOW).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuery(_)));
    }
}
