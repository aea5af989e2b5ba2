//! Sogou search.
//!
//! Sogou serves captcha pages to clients without a plausible session, so the
//! adapter keeps its own cookie jar: seeded with the items-per-page cookie,
//! updated from every response's `Set-Cookie`, and refreshed against the
//! home page every [`COOKIE_REFRESH_INTERVAL`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use scraper::Html;
use tokio::task::JoinHandle;
use url::Url;

use super::{element_text, page_offsets, selector};
use crate::error::Result;
use crate::http;
use crate::source::{HookOutcome, SourceAdapter};
use crate::types::{FetchDescriptor, FetchOutcome, Importance, Query, RawResult, RecentDays};

const HOME_URL: &str = "https://www.sogou.com/";
const SEARCH_URL: &str = "https://www.sogou.com/web";
const PAGE_SIZE: usize = 20;
const ITEMS_PER_PAGE_COOKIE: &str = "com_sohu_websearch_ITEM_PER_PAGE";

/// Interval between background cookie refreshes.
pub const COOKIE_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Sogou HTML search scraper with its own session cookies.
pub struct SogouSource {
    cookies: Jar,
}

impl Default for SogouSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SogouSource {
    /// A source with a freshly seeded cookie jar.
    pub fn new() -> Self {
        let cookies = Jar::default();
        if let Ok(home) = Url::parse(HOME_URL) {
            cookies.add_cookie_str(
                &format!("{ITEMS_PER_PAGE_COOKIE}={PAGE_SIZE}; Domain=sogou.com; Path=/"),
                &home,
            );
        }
        Self { cookies }
    }

    /// The `Cookie` header the jar holds for `url`, if any cookie matches.
    pub fn cookie_header(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        self.cookies
            .cookies(&url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    /// Store every `Set-Cookie` of `outcome` against the URL that answered.
    /// Expired cookies replace and so remove earlier ones.
    pub fn absorb_cookies(&self, outcome: &FetchOutcome) {
        let Ok(url) = Url::parse(&outcome.url) else {
            return;
        };
        for set_cookie in outcome.header_all("set-cookie") {
            self.cookies.add_cookie_str(set_cookie, &url);
        }
    }

    /// Refresh the jar from the home page every [`COOKIE_REFRESH_INTERVAL`]
    /// until the source is dropped.
    pub fn spawn_refresh(self: &Arc<Self>, client: reqwest::Client, timeout: Duration) -> JoinHandle<()> {
        let source = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let Some(this) = source.upgrade() else {
                    return;
                };
                if let Err(e) = this.refresh(&client, HOME_URL, timeout).await {
                    tracing::warn!(error = %e, "Sogou cookie refresh failed");
                }
                drop(this);
                tokio::time::sleep(COOKIE_REFRESH_INTERVAL).await;
            }
        })
    }

    async fn refresh(&self, client: &reqwest::Client, home: &str, timeout: Duration) -> Result<()> {
        let mut descriptor = FetchDescriptor::get(home);
        let headers = descriptor.headers.get_or_insert_with(http::default_headers);
        headers.insert("User-Agent".into(), http::random_user_agent().to_string());
        self.attach_cookies(&mut descriptor);
        let outcome = http::execute(client, &descriptor, timeout).await?;
        self.absorb_cookies(&outcome);
        tracing::debug!(status = outcome.status, "Sogou cookies refreshed");
        Ok(())
    }

    fn attach_cookies(&self, descriptor: &mut FetchDescriptor) {
        if let Some(cookie) = self.cookie_header(&descriptor.url) {
            descriptor
                .headers
                .get_or_insert_with(BTreeMap::new)
                .insert("Cookie".into(), cookie);
        }
    }

    fn time_filter(recent_days: RecentDays) -> (u8, &'static str) {
        match recent_days {
            RecentDays::Day => (1, "inttime_day"),
            RecentDays::Week => (2, "inttime_week"),
            RecentDays::Month => (3, "inttime_month"),
        }
    }
}

impl SourceAdapter for SogouSource {
    fn name(&self) -> &str {
        "Sogou"
    }

    fn fake_url(&self) -> bool {
        true
    }

    fn importance(&self) -> Importance {
        Importance::High
    }

    fn search_url(&self, query: &Query) -> String {
        format!("{SEARCH_URL}?query={}", urlencoding::encode(&query.text))
    }

    fn page_requests(&self, query: &Query) -> Result<Box<dyn Iterator<Item = FetchDescriptor> + Send>> {
        let mut q = query.text.clone();
        if let Some(site) = &query.site_filter {
            q.push_str(" site:");
            q.push_str(site);
        }
        let mut base = format!("{SEARCH_URL}?query={}", urlencoding::encode(&q));
        if let Some(recent) = query.recent_days {
            let (tsn, sourceid) = Self::time_filter(recent);
            base.push_str(&format!("&tsn={tsn}&sourceid={sourceid}"));
        }
        Ok(Box::new(
            page_offsets(query.max_results_per_source(), PAGE_SIZE).map(move |offset| {
                FetchDescriptor::get(format!("{base}&page={}", offset / PAGE_SIZE + 1))
            }),
        ))
    }

    fn extract_results(&self, outcome: &FetchOutcome) -> Result<Vec<RawResult>> {
        let document = Html::parse_document(&outcome.body);
        let result_sel = selector("div.rb")?;
        let link_sel = selector("h3 > a")?;
        let text_sel = selector("div.ft")?;
        let home = url::Url::parse(HOME_URL).ok();

        let mut results = Vec::new();
        for item in document.select(&result_sel) {
            let Some(link) = item.select(&link_sel).next() else {
                continue;
            };
            let Some(href) = link.value().attr("href").map(str::trim).filter(|u| !u.is_empty()) else {
                continue;
            };
            let text = item
                .select(&text_sel)
                .next()
                .map(element_text)
                .unwrap_or_default();
            if text.is_empty() {
                continue;
            }
            let url = home
                .as_ref()
                .and_then(|base| base.join(href).ok())
                .map_or_else(|| href.to_string(), |u| u.to_string());
            results.push(RawResult {
                title: element_text(link),
                text,
                url,
            });
        }
        tracing::debug!(count = results.len(), "Sogou results parsed");
        Ok(results)
    }

    fn before_request(&self, descriptor: &mut FetchDescriptor) -> HookOutcome {
        self.attach_cookies(descriptor);
        HookOutcome::Ready
    }

    fn after_request(&self, outcome: &FetchOutcome) -> HookOutcome {
        self.absorb_cookies(outcome);
        HookOutcome::Ready
    }
}
