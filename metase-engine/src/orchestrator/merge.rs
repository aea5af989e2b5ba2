//! Cross-source merge and relevance normalisation.
//!
//! Records are grouped by exact URL. Relevance accumulates additively over
//! every source that returned the URL, while the displayed title and text
//! come from the single occurrence with the highest individual relevance.
//! After merging, records are sorted by accumulated relevance, numbered from
//! 1 and rescaled to integers in `1..=10`.

use std::collections::HashMap;

use super::scoring::Scored;
use crate::types::RankedResult;

/// Largest normalised relevance.
pub const MAX_NORMALISED_RELEVANCE: u32 = 10;

#[derive(Debug, Clone)]
struct Entry {
    title: String,
    text: String,
    url: String,
    total: f64,
    best: f64,
    sources: Vec<String>,
}

/// Accumulates scored records from any number of sources.
#[derive(Debug, Default)]
pub struct Merger {
    entries: Vec<Entry>,
    by_url: HashMap<String, usize>,
}

impl Merger {
    /// An empty merger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one source's scored records.
    ///
    /// A URL this source has already contributed is ignored.
    pub fn add_source(&mut self, source: &str, records: Vec<Scored>) {
        for Scored { record, relevance } in records {
            match self.by_url.get(&record.url) {
                Some(&idx) => {
                    let entry = &mut self.entries[idx];
                    if entry.sources.iter().any(|s| s == source) {
                        continue;
                    }
                    entry.total += relevance;
                    entry.sources.push(source.to_string());
                    if relevance > entry.best {
                        entry.best = relevance;
                        entry.title = record.title;
                        entry.text = record.text;
                    }
                }
                None => {
                    self.by_url.insert(record.url.clone(), self.entries.len());
                    self.entries.push(Entry {
                        title: record.title,
                        text: record.text,
                        url: record.url,
                        total: relevance,
                        best: relevance,
                        sources: vec![source.to_string()],
                    });
                }
            }
        }
    }

    /// Accumulated, unnormalised relevance of `url`.
    pub fn accumulated(&self, url: &str) -> Option<f64> {
        self.by_url.get(url).map(|&idx| self.entries[idx].total)
    }

    /// Number of distinct URLs merged so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been merged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort, number and normalise the merged records.
    ///
    /// Ties keep first-seen order.
    pub fn finish(self) -> Vec<RankedResult> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(std::cmp::Ordering::Equal));
        let max = entries.first().map_or(0.0, |e| e.total);

        entries
            .into_iter()
            .enumerate()
            .map(|(i, e)| RankedResult {
                id: i + 1,
                relevance: normalise(e.total, max),
                title: e.title,
                text: e.text,
                url: e.url,
                sources: e.sources,
            })
            .collect()
    }
}

/// Rescale `relevance` against the top score to `ceil(r * 10 / max)`, capped at 10.
pub fn normalise(relevance: f64, max: f64) -> u32 {
    if max <= 0.0 {
        return 0;
    }
    let scaled = (relevance * f64::from(MAX_NORMALISED_RELEVANCE) / max).ceil();
    (scaled.max(0.0) as u32).min(MAX_NORMALISED_RELEVANCE)
}

/// Merge several sources' scored records in one step.
pub fn merge<I, S>(sources: I) -> Vec<RankedResult>
where
    I: IntoIterator<Item = (S, Vec<Scored>)>,
    S: AsRef<str>,
{
    let mut merger = Merger::new();
    for (source, records) in sources {
        merger.add_source(source.as_ref(), records);
    }
    merger.finish()
}
