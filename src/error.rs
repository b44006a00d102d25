//! Error types and result aliases for the glyphtrace library.
//!
//! This module defines the core error type [`TraceError`] and the [`Result`] type alias.
//! Errors only travel between the tracers and their platform collaborators; nothing
//! in this crate returns an error to a producer callback. Tracers turn every failure
//! into a trace event or a diagnostic log line instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Registration error: {0}")]
    RegistrationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Sampler error: {0}")]
    SamplerError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TraceError {
    /// Event type a tracer records when this error degrades one of its capabilities.
    ///
    /// Missing permissions leave the capability present but unusable, so they are
    /// reported as warnings; everything else is an error.
    pub fn severity(&self) -> &'static str {
        match self {
            TraceError::PermissionDenied(_) => "WARNING",
            _ => "ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, TraceError>;
