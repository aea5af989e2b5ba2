//! Core types: queries, fetch descriptors and outcomes, and result records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Default number of records requested from each source.
pub const DEFAULT_RESULTS_PER_SOURCE: usize = 20;

/// Lower bound applied to `max_results_per_source`.
pub const MIN_RESULTS_PER_SOURCE: usize = 10;

/// Upper bound applied to `max_results_per_source`.
pub const MAX_RESULTS_PER_SOURCE: usize = 500;

/// Restrict results to pages published within a recent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecentDays {
    /// The last 24 hours.
    Day,
    /// The last 7 days.
    Week,
    /// The last 30 days.
    Month,
}

impl RecentDays {
    /// Number of days covered by the window.
    pub fn days(self) -> i64 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
            Self::Month => 30,
        }
    }
}

impl TryFrom<u32> for RecentDays {
    type Error = EngineError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Day),
            7 => Ok(Self::Week),
            30 => Ok(Self::Month),
            other => Err(EngineError::InvalidQuery(format!(
                "recent_days must be 1, 7 or 30, got {other}"
            ))),
        }
    }
}

/// A metasearch query: free text plus per-request options.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    /// The free-text query string.
    pub text: String,
    /// Records requested from each source, clamped to
    /// [`MIN_RESULTS_PER_SOURCE`]..=[`MAX_RESULTS_PER_SOURCE`].
    max_results_per_source: usize,
    /// Optional recency filter.
    pub recent_days: Option<RecentDays>,
    /// Optional domain pattern such as `*.gov.cn`.
    pub site_filter: Option<String>,
    /// Subset of sources to query; `None` means every registered source.
    pub sources: Option<Vec<String>>,
}

impl Query {
    /// Create a query with default options.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            max_results_per_source: DEFAULT_RESULTS_PER_SOURCE,
            recent_days: None,
            site_filter: None,
            sources: None,
        }
    }

    /// Set the per-source record count, clamping it into the allowed range.
    pub fn with_max_results_per_source(mut self, n: usize) -> Self {
        self.max_results_per_source = n.clamp(MIN_RESULTS_PER_SOURCE, MAX_RESULTS_PER_SOURCE);
        self
    }

    /// Set the recency filter.
    pub fn with_recent_days(mut self, recent_days: Option<RecentDays>) -> Self {
        self.recent_days = recent_days;
        self
    }

    /// Set the site filter. Empty strings are treated as no filter.
    pub fn with_site_filter(mut self, site: Option<String>) -> Self {
        self.site_filter = site.filter(|s| !s.trim().is_empty());
        self
    }

    /// Restrict the query to the named sources.
    pub fn with_sources(mut self, sources: Option<Vec<String>>) -> Self {
        self.sources = sources;
        self
    }

    /// Records requested from each source.
    pub fn max_results_per_source(&self) -> usize {
        self.max_results_per_source
    }
}

/// HTTP method of an outbound fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
}

/// One outbound fetch produced by a source adapter.
///
/// Descriptors are immutable once an adapter has produced them; the fetch
/// service works on its own copy when attaching default headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchDescriptor {
    /// Target URL.
    pub url: String,
    /// HTTP method.
    #[serde(default)]
    pub method: Method,
    /// Request headers; `None` means "use the fetching node's defaults".
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    /// Request body.
    #[serde(default)]
    pub body: Option<String>,
    /// Per-request timeout in seconds; `None` uses the node's configured timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl FetchDescriptor {
    /// A `GET` request for `url` with no explicit headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: None,
            body: None,
            timeout_secs: None,
        }
    }

    /// Set a header, creating the header map if needed.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }
}

/// A completed upstream response, including non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    /// The URL that was fetched.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers in arrival order; repeated names are kept.
    pub headers: Vec<(String, String)>,
    /// Response body decoded as text.
    pub body: String,
}

impl FetchOutcome {
    /// First value of the named header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of the named header (case-insensitive).
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the status is a 3xx redirect.
    pub fn is_redirect(&self) -> bool {
        self.status / 100 == 3
    }
}

/// Which kind of work a fetch RPC asks the slave to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Fetch a result page and run the source's extraction on it.
    Page,
    /// Fetch without following redirects and report the resolved location.
    Url,
}

impl RequestKind {
    /// Wire name used in the `rtype` parameter and the signature.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Url => "url",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page" => Ok(Self::Page),
            "url" => Ok(Self::Url),
            other => Err(EngineError::InvalidQuery(format!("unknown rtype: {other}"))),
        }
    }
}

/// A record extracted from a source's result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResult {
    /// Result title.
    pub title: String,
    /// Result abstract. Never empty.
    pub text: String,
    /// Result URL; the merge key.
    pub url: String,
}

/// A merged, ranked record in the final response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// 1-based rank after the global sort.
    pub id: usize,
    /// Title from the highest-relevance contributing source.
    pub title: String,
    /// Abstract from the highest-relevance contributing source.
    pub text: String,
    /// Result URL.
    pub url: String,
    /// Normalised relevance in `1..=10`.
    pub relevance: u32,
    /// Sources that independently returned this URL, in merge order.
    pub sources: Vec<String>,
}

/// Trust weight of a source, used to scale relevance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Importance {
    /// Ordinary source.
    Normal,
    /// Important source.
    High,
    /// Very important source.
    Critical,
}

impl Importance {
    /// Numeric weight in `{1, 2, 3}`.
    pub fn weight(self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::High => 2.0,
            Self::Critical => 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_per_source_defaults_to_twenty() {
        let q = Query::new("weather");
        assert_eq!(q.max_results_per_source(), 20);
    }

    #[test]
    fn results_per_source_clamped_up() {
        let q = Query::new("weather").with_max_results_per_source(5);
        assert_eq!(q.max_results_per_source(), 10);
    }

    #[test]
    fn results_per_source_clamped_down() {
        let q = Query::new("weather").with_max_results_per_source(1000);
        assert_eq!(q.max_results_per_source(), 500);
    }

    #[test]
    fn recent_days_accepts_known_windows() {
        assert_eq!(RecentDays::try_from(1).ok(), Some(RecentDays::Day));
        assert_eq!(RecentDays::try_from(7).ok(), Some(RecentDays::Week));
        assert_eq!(RecentDays::try_from(30).ok(), Some(RecentDays::Month));
    }

    #[test]
    fn recent_days_rejects_other_values() {
        let err = RecentDays::try_from(3).unwrap_err();
        assert!(err.to_string().contains("recent_days"));
    }

    #[test]
    fn empty_site_filter_is_dropped() {
        let q = Query::new("x").with_site_filter(Some("  ".into()));
        assert!(q.site_filter.is_none());
    }

    #[test]
    fn request_kind_parses_wire_names() {
        assert_eq!("page".parse::<RequestKind>().ok(), Some(RequestKind::Page));
        assert_eq!("url".parse::<RequestKind>().ok(), Some(RequestKind::Url));
        assert!("html".parse::<RequestKind>().is_err());
    }

    #[test]
    fn outcome_header_lookup_is_case_insensitive() {
        let outcome = FetchOutcome {
            url: "https://example.com".into(),
            status: 302,
            headers: vec![
                ("location".into(), "/next".into()),
                ("Set-Cookie".into(), "a=1".into()),
                ("set-cookie".into(), "b=2".into()),
            ],
            body: String::new(),
        };
        assert_eq!(outcome.header("Location"), Some("/next"));
        assert_eq!(outcome.header_all("set-cookie").count(), 2);
        assert!(outcome.is_redirect());
    }

    #[test]
    fn descriptor_serializes_method_uppercase() {
        let d = FetchDescriptor::get("https://example.com/s?q=1");
        let json = serde_json::to_string(&d).expect("serialize");
        assert!(json.contains("\"GET\""));
        let decoded: FetchDescriptor = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded, d);
    }

    #[test]
    fn importance_weights() {
        assert!((Importance::Normal.weight() - 1.0).abs() < f64::EPSILON);
        assert!((Importance::High.weight() - 2.0).abs() < f64::EPSILON);
        assert!((Importance::Critical.weight() - 3.0).abs() < f64::EPSILON);
    }
}
