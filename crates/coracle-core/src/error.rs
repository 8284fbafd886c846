//! Error types for coracle
//!
//! TigerStyle: Explicit error types with context, using thiserror.

use thiserror::Error;

/// Result type alias for coracle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coracle error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Resource Errors
    // =========================================================================
    #[error("Resource not found: {id}")]
    ResourceNotFound { id: String },

    #[error("Resource already exists: {id}")]
    ResourceAlreadyExists { id: String },

    #[error("Invalid resource ID: {id}, reason: {reason}")]
    InvalidResourceId { id: String, reason: String },

    #[error("Invalid event path: {path}")]
    InvalidEventPath { path: String },

    #[error("Invalid API version: {version}")]
    InvalidApiVersion { version: String },

    #[error("Malformed grain event: {reason}")]
    MalformedGrainEvent { reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Advertisement / Discovery Errors
    // =========================================================================
    #[error("Service advertisement failed: {reason}")]
    AdvertisementFailed { reason: String },

    #[error("Service discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a resource not found error
    pub fn resource_not_found(id: impl Into<String>) -> Self {
        Self::ResourceNotFound { id: id.into() }
    }

    /// Create an invalid event path error
    pub fn invalid_event_path(path: impl Into<String>) -> Self {
        Self::InvalidEventPath { path: path.into() }
    }

    /// Create a malformed grain event error
    pub fn malformed_grain_event(reason: impl Into<String>) -> Self {
        Self::MalformedGrainEvent {
            reason: reason.into(),
        }
    }

    /// Create an advertisement failed error
    pub fn advertisement_failed(reason: impl Into<String>) -> Self {
        Self::AdvertisementFailed {
            reason: reason.into(),
        }
    }

    /// Create a discovery failed error
    pub fn discovery_failed(reason: impl Into<String>) -> Self {
        Self::DiscoveryFailed {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }
}
