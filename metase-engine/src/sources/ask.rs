//! Ask search.

use scraper::Html;

use super::{element_text, page_offsets, selector};
use crate::error::Result;
use crate::source::SourceAdapter;
use crate::types::{FetchDescriptor, FetchOutcome, Importance, Query, RawResult};

const SEARCH_URL: &str = "https://www.search.ask.com/web";
const PAGE_SIZE: usize = 10;

/// Ask HTML search scraper. Site and recency filters are ignored.
pub struct AskSource;

impl SourceAdapter for AskSource {
    fn name(&self) -> &str {
        "Ask"
    }

    fn importance(&self) -> Importance {
        Importance::High
    }

    fn search_url(&self, query: &Query) -> String {
        format!("{SEARCH_URL}?q={}", urlencoding::encode(&query.text))
    }

    fn page_requests(&self, query: &Query) -> Result<Box<dyn Iterator<Item = FetchDescriptor> + Send>> {
        let base = self.search_url(query);
        Ok(Box::new(
            page_offsets(query.max_results_per_source(), PAGE_SIZE)
                .map(move |offset| FetchDescriptor::get(format!("{base}&page={}", offset / PAGE_SIZE + 1))),
        ))
    }

    fn extract_results(&self, outcome: &FetchOutcome) -> Result<Vec<RawResult>> {
        let document = Html::parse_document(&outcome.body);
        let result_sel = selector("li.algo-result")?;
        let link_sel = selector("a.algo-title")?;
        let summary_sel = selector("span.algo-summary")?;

        let mut results = Vec::new();
        for item in document.select(&result_sel) {
            let Some(link) = item.select(&link_sel).next() else {
                continue;
            };
            let Some(url) = link.value().attr("href").map(str::trim).filter(|u| !u.is_empty()) else {
                continue;
            };
            let text = item
                .select(&summary_sel)
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
        tracing::debug!(count = results.len(), "Ask results parsed");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(body: &str) -> FetchOutcome {
        FetchOutcome {
            url: SEARCH_URL.into(),
            status: 200,
            headers: vec![],
            body: body.into(),
        }
    }

    #[test]
    fn parse_mock_html() {
        let html = r#"<ul>
<li class="algo-result"><a class="algo-title" href="https://a.example/">A title</a>
  <span class="algo-summary">About   A</span></li>
<li class="algo-result"><a class="algo-title" href="https://b.example/">B title</a></li>
</ul>"#;
        let results = AskSource.extract_results(&outcome(html)).expect("should parse");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://a.example/");
        assert_eq!(results[0].text, "About A");
    }

    #[test]
    fn pages_are_numbered_from_one() {
        let urls: Vec<_> = AskSource
            .page_requests(&Query::new("a b").with_max_results_per_source(30))
            .expect("requests")
            .map(|d| d.url)
            .collect();
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[2], "https://www.search.ask.com/web?q=a%20b&page=3");
    }
}
