//! Bundled source adapters.
//!
//! Each module provides a struct implementing [`crate::source::SourceAdapter`]
//! that builds a provider's result-page URLs and scrapes its HTML.

pub mod ask;
pub mod baidu;
pub mod bing;
pub mod chinaso;
pub mod google;
pub mod so;
pub mod sogou;
pub mod yahoo;

use std::sync::Arc;

use scraper::{ElementRef, Selector};

pub use ask::AskSource;
pub use baidu::BaiduSource;
pub use bing::BingSource;
pub use chinaso::ChinasoSource;
pub use google::GoogleSource;
pub use so::SoSource;
pub use sogou::SogouSource;
pub use yahoo::YahooSource;

use crate::error::{EngineError, Result};
use crate::source::SourceRegistry;

/// Registry of every bundled adapter, sharing the given Sogou instance so
/// the caller can drive its cookie refresh.
pub fn registry_with(sogou: Arc<SogouSource>) -> SourceRegistry {
    SourceRegistry::new()
        .with(Arc::new(AskSource))
        .with(Arc::new(BaiduSource))
        .with(Arc::new(BingSource))
        .with(Arc::new(ChinasoSource))
        .with(Arc::new(GoogleSource))
        .with(Arc::new(SoSource))
        .with(sogou)
        .with(Arc::new(YahooSource))
}

/// Registry of every bundled adapter with a fresh Sogou session.
pub fn default_registry() -> SourceRegistry {
    registry_with(Arc::new(SogouSource::new()))
}

/// Offsets of the pages needed to collect `max_records` at `page_size` per page.
pub(crate) fn page_offsets(max_records: usize, page_size: usize) -> impl Iterator<Item = usize> {
    (0..max_records).step_by(page_size.max(1))
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| EngineError::Extraction(format!("invalid selector {css}: {e:?}")))
}

/// Text content of an element with whitespace runs collapsed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
