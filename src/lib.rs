//! metase: a distributed metasearch service.
//!
//! This crate wires the [`metase_engine`] core into a runnable node:
//! TOML configuration, logging setup and the axum server exposing
//! `GET /api/v{N}/search` and the signed `POST /api/v{N}/fetch`.

pub mod config;
pub mod error;
pub mod logging;
pub mod server;

pub use config::MetaseConfig;
pub use error::{Result, ServerError};
pub use server::Server;

pub use metase_engine;
