//! Error types for the metase service.

use metase_engine::EngineError;

/// Top-level error type for the metase service.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed or is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Error from the metasearch engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The listener could not be bound.
    #[error("cannot bind {0}")]
    Bind(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ServerError>;
