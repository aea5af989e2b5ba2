//! # metase-engine
//!
//! Distributed metasearch core for metase.
//!
//! A query is fanned out to several external search providers. Every page
//! fetch is executed by a slave node through a signed RPC, so provider
//! traffic can be spread over many machines; a single node acts as its own
//! slave when none are configured. Extracted records are merged by URL,
//! ranked and returned as one result set.
//!
//! ## Design
//!
//! - [`GatherTask`] collects concurrent sub-results and completes early once
//!   most of them are in, bounding tail latency from slow providers
//! - [`WorkQueue`] caps outbound concurrency with a fixed worker pool
//! - [`SourceAdapter`] is the only way the engine talks to a provider; Bing,
//!   Baidu and Sogou adapters are bundled in [`sources`]
//! - [`DispatchRouter`] picks a slave for each fetch uniformly at random
//! - [`SlaveClient`] and [`FetchService`] are the two ends of the fetch RPC,
//!   authenticated with HMAC-SHA256 and a 600 second replay window
//! - [`MetaSearch`] ties it together and produces a [`SearchResponse`]
//!
//! ## Security
//!
//! - The shared secret never appears in logs or error messages
//! - Query text is logged only at trace level

pub mod cache;
pub mod config;
pub mod error;
pub mod gather;
pub mod http;
pub mod orchestrator;
pub mod queue;
pub mod router;
pub mod signing;
pub mod slave;
pub mod source;
pub mod sources;
pub mod types;

pub use config::{EarlyStopConfig, EngineConfig};
pub use error::{EngineError, Result};
pub use gather::{EarlyStop, GatherTask};
pub use orchestrator::{MetaSearch, SearchResponse};
pub use queue::WorkQueue;
pub use router::{DispatchRouter, SlaveEntry, SlaveNode};
pub use signing::{SignedParams, Signer};
pub use slave::{FetchReply, FetchService, SlaveClient};
pub use source::{HookOutcome, SourceAdapter, SourceRegistry};
pub use types::{
    FetchDescriptor, FetchOutcome, Importance, Method, Query, RankedResult, RawResult, RecentDays,
    RequestKind,
};
