//! Shared HTTP clients and default outbound headers.
//!
//! Provides [`reqwest::Client`]s for the two sides of the fetch RPC: the
//! page-fetching client used by slave nodes (with and without redirect
//! following) and the RPC client used by the orchestrator to call slaves.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::seq::SliceRandom;

use crate::error::{EngineError, Result};
use crate::types::{FetchDescriptor, FetchOutcome, Method};

/// Realistic browser User-Agent strings, one picked per node at startup.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// Maximum redirects followed for page fetches.
const MAX_REDIRECTS: usize = 10;

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        // USER_AGENTS is a non-empty const array, choose only returns None on empty slices
        .unwrap_or(USER_AGENTS[0])
}

/// Browser-like headers attached to outbound fetches that carry none.
pub fn default_headers() -> BTreeMap<String, String> {
    [
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
        ("Accept-Language", "zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
        ("Connection", "keep-alive"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Build the client a slave uses to fetch provider pages.
///
/// With `follow_redirects = false` the client reports 3xx responses as-is,
/// which is what URL resolution needs.
///
/// # Errors
///
/// Returns [`EngineError::Http`] if the client cannot be constructed.
pub fn build_fetch_client(timeout: Duration, follow_redirects: bool) -> Result<reqwest::Client> {
    let policy = if follow_redirects {
        reqwest::redirect::Policy::limited(MAX_REDIRECTS)
    } else {
        reqwest::redirect::Policy::none()
    };
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(policy)
        .build()
        .map_err(|e| EngineError::Http(format!("failed to build HTTP client: {e}")))
}

/// Build the client the orchestrator uses to call slave fetch endpoints.
///
/// # Errors
///
/// Returns [`EngineError::Http`] if the client cannot be constructed.
pub fn build_rpc_client(timeout: Duration, max_clients: usize) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(max_clients)
        .build()
        .map_err(|e| EngineError::Http(format!("failed to build RPC client: {e}")))
}

/// Execute a descriptor and capture the response, including non-2xx ones.
///
/// # Errors
///
/// Returns [`EngineError::Downstream`] if the target cannot be reached or the
/// body cannot be read, and [`EngineError::Http`] for an unusable descriptor.
pub async fn execute(
    client: &reqwest::Client,
    descriptor: &FetchDescriptor,
    default_timeout: Duration,
) -> Result<FetchOutcome> {
    let method = match descriptor.method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
    };
    let mut request = client
        .request(method, &descriptor.url)
        .timeout(descriptor.timeout_secs.map_or(default_timeout, Duration::from_secs));
    if let Some(headers) = &descriptor.headers {
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
    }
    if let Some(body) = &descriptor.body {
        request = request.body(body.clone());
    }

    let response = request.send().await.map_err(|e| {
        if e.is_builder() {
            EngineError::Http(format!("invalid request for {}: {e}", descriptor.url))
        } else {
            EngineError::Downstream(format!("{}: {e}", descriptor.url))
        }
    })?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();
    let body = response
        .text()
        .await
        .map_err(|e| EngineError::Downstream(format!("{}: body read failed: {e}", descriptor.url)))?;

    tracing::trace!(url = %descriptor.url, status, bytes = body.len(), "fetched");
    Ok(FetchOutcome {
        url: descriptor.url.clone(),
        status,
        headers,
        body,
    })
}
