//! Error types for the StatusLink runtime

use statuslink_core::{ConfigError, StatusLinkError};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Failures reported by a socket transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Socket is not connected")]
    NotConnected,

    #[error("Send failed: {reason}")]
    SendFailed { reason: String },

    #[error("Transport closed")]
    Closed,
}

/// Admission-control refusals
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Free heap {free} below required {required}")]
    HeapBelowThreshold { free: u32, required: u32 },

    #[error("Another request is in flight")]
    RequestInFlight,

    #[error("Realtime reconnect in progress")]
    ReconnectInProgress,

    #[error("Reconnect backoff active for another {remaining_ms}ms")]
    BackoffActive { remaining_ms: u64 },
}

/// Failures reported by the HTTP backend collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Request failed with HTTP {status}")]
    Status { status: u16 },

    #[error("Request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Response could not be parsed: {reason}")]
    InvalidResponse { reason: String },
}

/// Top-level runtime error
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Admission refused: {0}")]
    Gate(#[from] GateError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Core error: {0}")]
    Core(#[from] StatusLinkError),

    #[error("No realtime endpoint configured")]
    NoEndpoint,

    #[error("Channel limit reached ({max})")]
    TooManyChannels { max: usize },

    #[error("No subscribed channel for topic {topic}")]
    NotSubscribed { topic: String },
}

pub type Result<T> = core::result::Result<T, RuntimeError>;
