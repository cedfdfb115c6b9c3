//! Error types for sshbox operations.
//!
//! Defines the error taxonomy for the major subsystems:
//! - Container engine calls (create, start, stop, remove, inspect, pull, logs)
//! - Record storage
//! - Lifecycle policy and orchestration (the client-facing kinds)

use thiserror::Error;

pub use crate::storage::StoreError;

/// Errors that can occur while talking to the container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Container '{id}' not found")]
    ContainerNotFound { id: String },

    #[error("Image '{0}' not found")]
    ImageNotFound(String),

    #[error("Container engine not available: {0}")]
    DaemonUnavailable(String),

    #[error("Engine request failed: {0}")]
    RequestFailed(String),

    #[error("Image pull failed: {0}")]
    PullFailed(String),

    #[error("Log stream failed: {0}")]
    LogStream(String),
}

impl EngineError {
    /// Returns true when the engine reported that the container does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::ContainerNotFound { .. })
    }
}

/// Client-facing errors produced by the lifecycle orchestrator.
///
/// `NotFound` maps to a 404-equivalent, the policy and engine failures to a
/// 400-equivalent, and storage failures to a 500-equivalent.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("No available ports for SSH in range {start}-{end}")]
    PortsExhausted { start: u16, end: u16 },

    #[error("Image pull interrupted: {image}")]
    PullInterrupted { image: String },

    #[error("Failed to {action}: {source}")]
    OperationFailed {
        action: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("Container is not running")]
    NotRunning,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl PlatformError {
    /// Wraps an engine failure with the action that was being attempted.
    pub fn operation(action: &'static str, source: EngineError) -> Self {
        PlatformError::OperationFailed { action, source }
    }

    /// True for every kind surfaced to clients as a bad request.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            PlatformError::BadRequest(_)
                | PlatformError::PortsExhausted { .. }
                | PlatformError::PullInterrupted { .. }
                | PlatformError::OperationFailed { .. }
        )
    }
}
