//! 360 Search (so.com). Result links carry the target in `data-url` when
//! the `href` is a tracking redirect.
//!
//! Site and recency filters are not supported by this provider and are
//! ignored.

use scraper::Html;

use super::{element_text, page_offsets, selector};
use crate::error::Result;
use crate::source::SourceAdapter;
use crate::types::{FetchDescriptor, FetchOutcome, Query, RawResult};

const SEARCH_URL: &str = "https://www.so.com/s";
const PAGE_SIZE: usize = 10;

/// so.com HTML search scraper.
pub struct SoSource;

impl SourceAdapter for SoSource {
    fn name(&self) -> &str {
        "So"
    }

    fn search_url(&self, query: &Query) -> String {
        format!("{SEARCH_URL}?q={}", urlencoding::encode(&query.text))
    }

    fn page_requests(&self, query: &Query) -> Result<Box<dyn Iterator<Item = FetchDescriptor> + Send>> {
        let q = urlencoding::encode(&query.text).into_owned();
        Ok(Box::new(
            page_offsets(query.max_results_per_source(), PAGE_SIZE).map(move |offset| {
                FetchDescriptor::get(format!("{SEARCH_URL}?pn={}&q={q}", offset / PAGE_SIZE + 1))
            }),
        ))
    }

    fn extract_results(&self, outcome: &FetchOutcome) -> Result<Vec<RawResult>> {
        parse_so_html(&outcome.body)
    }
}

fn parse_so_html(html: &str) -> Result<Vec<RawResult>> {
    let document = Html::parse_document(html);
    let result_sel = selector("li.res-list")?;
    let link_sel = selector("h3 > a")?;
    let desc_sel = selector("p.res-desc")?;

    let mut results = Vec::new();
    for item in document.select(&result_sel) {
        let Some(link) = item.select(&link_sel).next() else {
            continue;
        };
        let url = ["data-url", "href"]
            .into_iter()
            .filter_map(|attr| link.value().attr(attr))
            .map(str::trim)
            .find(|u| !u.is_empty());
        let Some(url) = url else {
            continue;
        };
        let text = item
            .select(&desc_sel)
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
    tracing::debug!(count = results.len(), "So results parsed");
    Ok(results)
}
