//! Chinaso search. Result links are site-relative redirects and are
//! resolved through fake-URL resolution.

use scraper::Html;
use url::Url;

use super::{element_text, page_offsets, selector};
use crate::error::Result;
use crate::source::SourceAdapter;
use crate::types::{FetchDescriptor, FetchOutcome, Importance, Query, RawResult};

const SEARCH_URL: &str = "http://www.chinaso.com/search/pagesearch.htm";
const LINK_BASE: &str = "http://www.chinaso.com/search/";
const PAGE_SIZE: usize = 10;

/// Chinaso HTML search scraper.
pub struct ChinasoSource;

impl SourceAdapter for ChinasoSource {
    fn name(&self) -> &str {
        "Chinaso"
    }

    fn fake_url(&self) -> bool {
        true
    }

    fn importance(&self) -> Importance {
        Importance::High
    }

    fn search_url(&self, query: &Query) -> String {
        format!("{SEARCH_URL}?q={}", urlencoding::encode(&query.text))
    }

    fn page_requests(&self, query: &Query) -> Result<Box<dyn Iterator<Item = FetchDescriptor> + Send>> {
        let q = urlencoding::encode(&query.text).into_owned();
        Ok(Box::new(
            page_offsets(query.max_results_per_source(), PAGE_SIZE).map(move |offset| {
                FetchDescriptor::get(format!(
                    "{SEARCH_URL}?q={q}&page={}&wd={q}",
                    offset / PAGE_SIZE + 1
                ))
            }),
        ))
    }

    fn extract_results(&self, outcome: &FetchOutcome) -> Result<Vec<RawResult>> {
        parse_chinaso_html(&outcome.body)
    }
}

/// First non-blank line of the element's text; the snippet block also
/// carries source and date lines below it.
fn first_line(el: scraper::ElementRef<'_>) -> String {
    let raw: String = el.text().collect();
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|line| !line.is_empty())
        .unwrap_or_default()
}

fn parse_chinaso_html(html: &str) -> Result<Vec<RawResult>> {
    let document = Html::parse_document(html);
    let result_sel = selector("li.reItem")?;
    let link_sel = selector("h2 > a")?;
    let text_sel = selector("div.reNewsWrapper")?;
    let base = Url::parse(LINK_BASE).ok();

    let mut results = Vec::new();
    for item in document.select(&result_sel) {
        let Some(link) = item.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href").map(str::trim).filter(|u| !u.is_empty()) else {
            continue;
        };
        let text = item.select(&text_sel).next().map(first_line).unwrap_or_default();
        if text.is_empty() {
            continue;
        }
        let url = base
            .as_ref()
            .and_then(|b| b.join(href).ok())
            .map_or_else(|| href.to_string(), |u| u.to_string());
        results.push(RawResult {
            title: element_text(link),
            text,
            url,
        });
    }
    tracing::debug!(count = results.len(), "Chinaso results parsed");
    Ok(results)
}
