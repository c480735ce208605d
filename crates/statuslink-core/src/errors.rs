//! Error types for the StatusLink sync core
//!
//! Every fault in the core is recoverable. Decode failures drop one frame,
//! validation failures drop one command, and configuration failures are
//! reported before anything starts.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failure to turn a received frame into an [`Envelope`](crate::protocol::Envelope)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed JSON: {reason}")]
    MalformedJson { reason: String },
    #[error("Positional envelope must have 5 elements, got {actual}")]
    WrongArity { actual: usize },
    #[error("Frame is neither an object nor an array")]
    NotAnEnvelope,
    #[error("Envelope is missing field `{field}`")]
    MissingField { field: &'static str },
    #[error("Envelope field `{field}` has the wrong type")]
    InvalidField { field: &'static str },
}

/// A command record rejected before it reaches the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Command id is empty")]
    EmptyId,
    #[error("Command id `{id}` is shorter than {min} characters")]
    IdTooShort { id: String, min: usize },
    #[error("Command {id} has an empty command name")]
    EmptyCommand { id: String },
    #[error("Command record is not a JSON object")]
    NotAnObject,
}

/// Invalid configuration values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("Invalid endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("Invalid channel identifier `{id}`")]
    InvalidChannelId { id: String },
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Top-level error for the StatusLink core
#[derive(Debug, thiserror::Error)]
pub enum StatusLinkError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, StatusLinkError>;
