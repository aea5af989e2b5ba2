//! Error types for the metase-engine crate.
//!
//! All errors use stable string messages suitable for display to users
//! and programmatic handling. The shared API secret never appears in an
//! error message.

/// Errors that can occur while dispatching, fetching or aggregating.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A query named a source that is not registered.
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// Query parameters are malformed or out of range.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid engine configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A fetch request failed signature or time-window verification.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The target site could not be reached (connection, DNS, TLS).
    #[error("downstream unreachable: {0}")]
    Downstream(String),

    /// An HTTP-level failure that is not a downstream connection error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A source adapter could not parse a fetched page.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// A slave node answered a fetch RPC with a failure status.
    #[error("slave RPC failed: {0}")]
    Rpc(String),

    /// No slave node is registered for the named source.
    #[error("no eligible slave for source {0}")]
    NoEligibleSlave(String),

    /// The worker pool is no longer accepting work.
    #[error("work queue closed")]
    Queue,
}

/// Convenience type alias for metase-engine results.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_source() {
        let err = EngineError::UnknownSource("Altavista".into());
        assert_eq!(err.to_string(), "unknown source: Altavista");
    }

    #[test]
    fn display_auth() {
        let err = EngineError::Auth("signature mismatch".into());
        assert_eq!(err.to_string(), "authentication failed: signature mismatch");
    }

    #[test]
    fn display_downstream() {
        let err = EngineError::Downstream("connection refused".into());
        assert_eq!(err.to_string(), "downstream unreachable: connection refused");
    }

    #[test]
    fn display_no_eligible_slave() {
        let err = EngineError::NoEligibleSlave("Bing".into());
        assert_eq!(err.to_string(), "no eligible slave for source Bing");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
    }
}
