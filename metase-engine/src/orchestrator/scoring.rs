//! Position-decay relevance scoring.
//!
//! Formula: `relevance = importance * (sqrt(i + 1) + 2) / sqrt(i + 1)`
//! for the record at zero-based position `i` of its source's list. The
//! factor falls from 3.0 at the top towards 1.0 and never reaches zero.

use crate::types::{Importance, RawResult};

/// A record with its per-source relevance.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    /// The extracted record.
    pub record: RawResult,
    /// Relevance before merging.
    pub relevance: f64,
}

/// Relevance of the record at zero-based `position` from a source of the
/// given importance.
pub fn position_relevance(importance: Importance, position: usize) -> f64 {
    let root = ((position + 1) as f64).sqrt();
    importance.weight() * (root + 2.0) / root
}

/// Score one source's records in list order.
pub fn score_records(importance: Importance, records: Vec<RawResult>) -> Vec<Scored> {
    records
        .into_iter()
        .enumerate()
        .map(|(position, record)| Scored {
            relevance: position_relevance(importance, position),
            record,
        })
        .collect()
}
