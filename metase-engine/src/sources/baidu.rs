//! Baidu search.
//!
//! Result links are `baidu.com/link?url=...` redirectors, so the adapter is
//! flagged `fake_url` and every record goes through URL resolution.

use scraper::Html;

use super::{element_text, page_offsets, selector};
use crate::error::Result;
use crate::source::SourceAdapter;
use crate::types::{FetchDescriptor, FetchOutcome, Importance, Query, RawResult};

const SEARCH_URL: &str = "https://www.baidu.com/s";
const PAGE_SIZE: usize = 50;
const SECONDS_PER_DAY: i64 = 86_400;

/// Baidu HTML search scraper.
pub struct BaiduSource;

impl BaiduSource {
    /// Page requests for `query` with time windows relative to `now` (unix seconds).
    fn page_urls_at(query: &Query, now: i64) -> Vec<String> {
        let mut q = query.text.clone();
        if let Some(site) = &query.site_filter {
            q.push_str(" site:");
            q.push_str(site);
        }
        let mut base = format!("{SEARCH_URL}?wd={}", urlencoding::encode(&q));
        if let Some(recent) = query.recent_days {
            let start = now - recent.days() * SECONDS_PER_DAY;
            base.push_str(&format!("&gpc=stf%3D{start}%2C{now}%7Cstftype%3D1"));
        }
        page_offsets(query.max_results_per_source(), PAGE_SIZE)
            .map(|offset| format!("{base}&pn={offset}&rn={PAGE_SIZE}"))
            .collect()
    }
}

impl SourceAdapter for BaiduSource {
    fn name(&self) -> &str {
        "Baidu"
    }

    fn fake_url(&self) -> bool {
        true
    }

    fn importance(&self) -> Importance {
        Importance::High
    }

    fn search_url(&self, query: &Query) -> String {
        format!("{SEARCH_URL}?wd={}", urlencoding::encode(&query.text))
    }

    fn page_requests(&self, query: &Query) -> Result<Box<dyn Iterator<Item = FetchDescriptor> + Send>> {
        let urls = Self::page_urls_at(query, chrono::Utc::now().timestamp());
        Ok(Box::new(urls.into_iter().map(FetchDescriptor::get)))
    }

    fn extract_results(&self, outcome: &FetchOutcome) -> Result<Vec<RawResult>> {
        let document = Html::parse_document(&outcome.body);
        let result_sel = selector("div.result")?;
        let link_sel = selector("h3 > a")?;
        let abstract_sel = selector("div.c-abstract")?;

        let mut results = Vec::new();
        for item in document.select(&result_sel) {
            let Some(link) = item.select(&link_sel).next() else {
                continue;
            };
            let Some(url) = link.value().attr("href").map(str::trim).filter(|u| !u.is_empty()) else {
                continue;
            };
            let text = item
                .select(&abstract_sel)
                .next()
                .map(element_text)
                .unwrap_or_default();
            if text.is_empty() {
                continue;
            }
            results.push(RawResult {
                title: element_text(link),
                text,
                url: url.to_string(),
            });
        }
        tracing::debug!(count = results.len(), "Baidu results parsed");
        Ok(results)
    }
}
