//! Google search (Hong Kong front end).

use scraper::Html;

use super::{element_text, page_offsets, selector};
use crate::error::Result;
use crate::source::SourceAdapter;
use crate::types::{FetchDescriptor, FetchOutcome, Importance, Query, RawResult, RecentDays};

const SEARCH_URL: &str = "https://www.google.com.hk/search";
const PAGE_SIZE: usize = 10;

/// Google HTML search scraper.
pub struct GoogleSource;

impl GoogleSource {
    fn time_filter(recent_days: RecentDays) -> &'static str {
        match recent_days {
            RecentDays::Day => "qdr:d",
            RecentDays::Week => "qdr:w",
            RecentDays::Month => "qdr:m",
        }
    }
}

impl SourceAdapter for GoogleSource {
    fn name(&self) -> &str {
        "Google"
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
            q.push_str("+site%3A");
            q.push_str(&urlencoding::encode(site));
        }
        let mut base = format!("{SEARCH_URL}?q={q}");
        if let Some(recent) = query.recent_days {
            base.push_str("&tbs=");
            base.push_str(Self::time_filter(recent));
        }
        Ok(Box::new(
            page_offsets(query.max_results_per_source(), PAGE_SIZE)
                .map(move |offset| FetchDescriptor::get(format!("{base}&start={offset}"))),
        ))
    }

    fn extract_results(&self, outcome: &FetchOutcome) -> Result<Vec<RawResult>> {
        parse_google_html(&outcome.body)
    }
}

fn parse_google_html(html: &str) -> Result<Vec<RawResult>> {
    let document = Html::parse_document(html);
    let result_sel = selector("div.g")?;
    let title_sel = selector("h3")?;
    let link_sel = selector("div.r > a")?;
    let snippet_sel = selector("span.st")?;

    let mut results = Vec::new();
    for item in document.select(&result_sel) {
        let Some(url) = item
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|u| !u.is_empty())
        else {
            continue;
        };
        let text = item
            .select(&snippet_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();
        if text.is_empty() {
            continue;
        }
        let title = item.select(&title_sel).next().map(element_text).unwrap_or_default();
        results.push(RawResult {
            title,
            text,
            url: url.to_string(),
        });
    }
    tracing::debug!(count = results.len(), "Google results parsed");
    Ok(results)
}
