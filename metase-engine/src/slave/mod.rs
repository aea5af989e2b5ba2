//! Master/slave fetch RPC.
//!
//! The orchestrator asks a slave node to perform one fetch on its behalf via
//! a signed `POST /api/v{N}/fetch`. The body is the JSON-serialised
//! [`FetchDescriptor`](crate::types::FetchDescriptor); the reply is
//! `{ "data": ... }` holding either extracted records (`rtype=page`) or the
//! resolved location (`rtype=url`).

pub mod client;
pub mod service;

use serde::{Deserialize, Serialize};

pub use client::SlaveClient;
pub use service::{FetchReply, FetchService};

/// JSON envelope of a fetch RPC reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchEnvelope<T> {
    /// Reply payload.
    pub data: T,
}

/// Path of the fetch endpoint for an API version.
pub fn fetch_path(api_version: u32) -> String {
    format!("/api/v{api_version}/fetch")
}
