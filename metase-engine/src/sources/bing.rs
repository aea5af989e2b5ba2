//! Bing search: direct result URLs, highest trust weight.

use scraper::Html;

use super::{element_text, page_offsets, selector};
use crate::error::Result;
use crate::source::SourceAdapter;
use crate::types::{FetchDescriptor, FetchOutcome, Importance, Query, RawResult, RecentDays};

const SEARCH_URL: &str = "https://www.bing.com/search";
const PAGE_SIZE: usize = 10;

/// Bing HTML search scraper.
pub struct BingSource;

impl BingSource {
    fn time_filter(recent_days: RecentDays) -> &'static str {
        match recent_days {
            RecentDays::Day => "ex1%3a%22ez1%22",
            RecentDays::Week => "ex1%3a%22ez2%22",
            RecentDays::Month => "ex1%3a%22ez3%22",
        }
    }
}

impl SourceAdapter for BingSource {
    fn name(&self) -> &str {
        "Bing"
    }

    fn importance(&self) -> Importance {
        Importance::Critical
    }

    fn search_url(&self, query: &Query) -> String {
        format!("{SEARCH_URL}?q={}", urlencoding::encode(&query.text))
    }

    fn page_requests(&self, query: &Query) -> Result<Box<dyn Iterator<Item = FetchDescriptor> + Send>> {
        let mut q = urlencoding::encode(&query.text).into_owned();
        if let Some(site) = &query.site_filter {
            // Bing rejects wildcard hosts in site: filters.
            let site = site.strip_prefix("*.").unwrap_or(site);
            q.push_str("+site%3A");
            q.push_str(&urlencoding::encode(site));
        }
        let mut base = format!("{SEARCH_URL}?q={q}");
        if let Some(recent) = query.recent_days {
            base.push_str("&filters=");
            base.push_str(Self::time_filter(recent));
        }
        tracing::trace!(url = %base, "Bing page requests");
        Ok(Box::new(
            page_offsets(query.max_results_per_source(), PAGE_SIZE)
                .map(move |offset| FetchDescriptor::get(format!("{base}&first={}", offset + 1))),
        ))
    }

    fn extract_results(&self, outcome: &FetchOutcome) -> Result<Vec<RawResult>> {
        parse_bing_html(&outcome.body)
    }
}

/// Parse a Bing result page. Results without a caption are skipped.
fn parse_bing_html(html: &str) -> Result<Vec<RawResult>> {
    let document = Html::parse_document(html);
    let result_sel = selector("li.b_algo")?;
    let link_sel = selector("h2 > a")?;
    let caption_sel = selector("div.b_caption > p")?;

    let mut results = Vec::new();
    for item in document.select(&result_sel) {
        let Some(link) = item.select(&link_sel).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").map(str::trim).filter(|u| !u.is_empty()) else {
            continue;
        };
        let text = item
            .select(&caption_sel)
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

    tracing::debug!(count = results.len(), "Bing results parsed");
    Ok(results)
}
