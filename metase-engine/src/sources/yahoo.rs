//! Yahoo search (Hong Kong front end). Result links are tracking redirects
//! whose target is embedded as an `/RU=<encoded>/` path segment.

use std::sync::OnceLock;

use regex::Regex;
use scraper::Html;

use super::{element_text, page_offsets, selector};
use crate::error::Result;
use crate::source::SourceAdapter;
use crate::types::{FetchDescriptor, FetchOutcome, Importance, Query, RawResult, RecentDays};

const SEARCH_URL: &str = "https://hk.search.yahoo.com/search";
const PAGE_SIZE: usize = 10;

/// Yahoo HTML search scraper.
pub struct YahooSource;

impl YahooSource {
    fn time_filter(recent_days: RecentDays) -> &'static str {
        match recent_days {
            RecentDays::Day => "d",
            RecentDays::Week => "w",
            RecentDays::Month => "m",
        }
    }
}

impl SourceAdapter for YahooSource {
    fn name(&self) -> &str {
        "Yahoo"
    }

    fn importance(&self) -> Importance {
        Importance::Critical
    }

    fn search_url(&self, query: &Query) -> String {
        format!("{SEARCH_URL}?p={}", urlencoding::encode(&query.text))
    }

    fn page_requests(&self, query: &Query) -> Result<Box<dyn Iterator<Item = FetchDescriptor> + Send>> {
        let mut q = urlencoding::encode(&query.text).into_owned();
        if let Some(site) = &query.site_filter {
            let site = site.strip_prefix("*.").unwrap_or(site);
            q.push_str("+site%3A");
            q.push_str(&urlencoding::encode(site));
        }
        let mut base = format!("{SEARCH_URL}?p={q}");
        if let Some(recent) = query.recent_days {
            base.push_str("&btf=");
            base.push_str(Self::time_filter(recent));
        }
        Ok(Box::new(
            page_offsets(query.max_results_per_source(), PAGE_SIZE)
                .map(move |offset| FetchDescriptor::get(format!("{base}&b={}", offset + 1))),
        ))
    }

    fn extract_results(&self, outcome: &FetchOutcome) -> Result<Vec<RawResult>> {
        parse_yahoo_html(&outcome.body)
    }
}

fn redirect_target() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/RU=(.+?)/").ok()).as_ref()
}

/// The decoded `/RU=` target of a tracking link, or the link itself.
fn unwrap_tracking(href: &str) -> String {
    redirect_target()
        .and_then(|re| re.captures(href))
        .and_then(|caps| caps.get(1))
        .and_then(|m| urlencoding::decode(m.as_str()).ok())
        .map_or_else(|| href.to_string(), |decoded| decoded.into_owned())
}

fn parse_yahoo_html(html: &str) -> Result<Vec<RawResult>> {
    let document = Html::parse_document(html);
    let result_sel = selector("div.algo-sr")?;
    let link_sel = selector("h3 > a")?;
    let text_sel = selector("p.lh-l")?;

    let mut results = Vec::new();
    for item in document.select(&result_sel) {
        let Some(link) = item.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href").map(str::trim).filter(|u| !u.is_empty()) else {
            continue;
        };
        let text = item.select(&text_sel).next().map(element_text).unwrap_or_default();
        if text.is_empty() {
            continue;
        }
        results.push(RawResult {
            title: element_text(link),
            text,
            url: unwrap_tracking(href),
        });
    }
    tracing::debug!(count = results.len(), "Yahoo results parsed");
    Ok(results)
}
