//! Service discovery errors

use thiserror::Error;

/// Service discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Unknown service type: {0}")]
    UnknownServiceType(String),

    #[error("Service object is not a {expected}")]
    ServiceTypeMismatch { expected: &'static str },

    #[error("Service reference to '{0}' has been released")]
    ReferenceReleased(String),

    #[error("Failed to resolve service '{name}': {message}")]
    Resolution { name: String, message: String },

    #[error("Bridge '{bridge}' failed to start: {message}")]
    BridgeStart { bridge: String, message: String },

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Service discovery '{0}' is closed")]
    Closed(String),
}

impl DiscoveryError {
    /// Build a resolution error for the named service.
    pub fn resolution(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Resolution {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

/// Result alias for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;
