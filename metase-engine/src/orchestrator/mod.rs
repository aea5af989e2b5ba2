//! Search orchestrator: distributed fan-out, gather, merge, rank.
//!
//! This module drives the source adapters through the worker pool and the
//! slave RPC, merges the per-source record lists by URL, scores them by
//! position and source importance, and packs the response envelope.

pub mod envelope;
pub mod merge;
pub mod scoring;
pub mod search;

pub use envelope::SearchResponse;
pub use search::MetaSearch;
