//! Error types for the butterfly-osm toolkit
//!
//! Operational failures only: structural problems in input graphs, bad
//! configuration and I/O. Broken internal invariants are assertions, not errors.

use thiserror::Error;

/// Errors raised by butterfly-osm tools
#[derive(Debug, Error)]
pub enum Error {
    /// Input graph violates a structural requirement
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidGraph`]
    pub fn invalid_graph(msg: impl Into<String>) -> Self {
        Error::InvalidGraph(msg.into())
    }

    /// Shorthand for [`Error::InvalidConfig`]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }
}

/// Convenience result type for butterfly-osm operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            Error::invalid_graph("edge 3 points at node 9").to_string(),
            "Invalid graph: edge 3 points at node 9"
        );
        assert_eq!(
            Error::invalid_config("core_factor must be in (0, 1]").to_string(),
            "Invalid configuration: core_factor must be in (0, 1]"
        );
    }

    #[test]
    fn test_io_error_conversion_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::IoError(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
