//! # Error Handling
//!
//! Centralized error types for burrow core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! The dispatch core only ever produces three conditions that callers need to
//! tell apart: a route miss, an invalid continuation, and a failure raised by a
//! handler or middleware. Everything else is plumbing around the server.

use thiserror::Error;

/// Result type alias for burrow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error carried by [`Error::Handler`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core error types for the burrow runtime
#[derive(Error, Debug)]
pub enum Error {
    /// No route satisfies the path, or the matched node has no handler for the method
    #[error("No route found for {method} {path}")]
    RouteNotFound {
        /// The requested method
        method: String,
        /// The path that wasn't matched
        path: String,
    },

    /// A continuation was resumed twice, or an index was dispatched out of order
    #[error("continuation invoked more than once for the same position (index {index})")]
    InvalidContinuation {
        /// Chain position that was replayed
        index: usize,
    },

    /// Error raised by a middleware or the final action
    #[error("{0}")]
    Handler(#[source] BoxError),

    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Request payload too large
    #[error("Request body too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },

    /// Request body could not be decoded for its content type
    #[error("Invalid request body: {reason}")]
    InvalidBody {
        /// What went wrong
        reason: String,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap any error raised by user code as a handler failure
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Handler(err.into())
    }

    /// Handler failure from a plain message
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Handler(message.into())
    }

    /// Whether this is a route miss
    #[must_use]
    pub const fn is_route_miss(&self) -> bool {
        matches!(self, Self::RouteNotFound { .. })
    }

    /// Whether a continuation was misused
    #[must_use]
    pub const fn is_invalid_continuation(&self) -> bool {
        matches!(self, Self::InvalidContinuation { .. })
    }
}

impl From<envy::Error> for Error {
    fn from(err: envy::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_not_found_error() {
        let err = Error::RouteNotFound {
            method: "GET".to_string(),
            path: "/unknown".to_string(),
        };
        assert!(err.to_string().contains("/unknown"));
        assert!(err.is_route_miss());
        assert!(!err.is_invalid_continuation());
    }

    #[test]
    fn test_invalid_continuation_error() {
        let err = Error::InvalidContinuation { index: 2 };
        assert!(err.is_invalid_continuation());
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_handler_error_keeps_message() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = Error::handler(io_err);
        assert_eq!(err.to_string(), "disk on fire");
        assert!(std::error::Error::source(&err).is_some());

        let err = Error::msg("boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_bind_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = Error::BindError {
            address: "0.0.0.0:3000".to_string(),
            source: io_err,
        };
        assert!(err.to_string().contains("0.0.0.0:3000"));
    }
}
