//! # Error Handling
//!
//! Centralized error types for the burner runtime.
//! Uses `thiserror` for ergonomic error definitions.

use thiserror::Error;

/// Result type alias for burner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the burner runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    Bind {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Invalid route pattern provided at registration
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// The same (method, path) pair was registered twice
    #[error("Duplicate route registration: {method} {pattern}")]
    DuplicateRoute {
        /// HTTP method of the conflicting route
        method: String,
        /// The pattern registered twice
        pattern: String,
    },

    /// Configured data-store driver has no registered factory
    #[error("Unknown data-store driver: {driver}")]
    UnknownStoreDriver {
        /// The driver name from configuration
        driver: String,
    },

    /// Configured session provider has no registered implementation
    #[error("Unknown session provider: {provider}")]
    UnknownSessionProvider {
        /// The provider name from configuration
        provider: String,
    },

    /// Configuration file could not be parsed
    #[error("Config error in {path}: {reason}")]
    Config {
        /// Path of the offending config file
        path: String,
        /// Parse or validation failure detail
        reason: String,
    },

    /// Data-store failure signalled by a store implementation
    #[error("Store error: {message}")]
    Store {
        /// Error message from the store
        message: String,
    },

    /// Session provider failure
    #[error("Session error: {message}")]
    Session {
        /// Error message from the provider
        message: String,
    },

    /// A handler reported a failure after writing (or not writing) its response
    #[error("Handler error: {message}")]
    Handler {
        /// Error message from the handler
        message: String,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a handler-signalled failure
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }
}
