//! Error types for gleaner-acq

use crate::models::{AcquisitionState, ValidationError};
use crate::services::IntakeError;
use crate::sink::SinkError;
use crate::surface::SurfaceError;
use thiserror::Error;

/// Acquisition error taxonomy
#[derive(Debug, Error)]
pub enum AcqError {
    /// Automation surface could not be created (fatal)
    #[error("Driver initialization failed: {0}")]
    DriverInit(String),

    /// Authentication handshake rejected (fatal)
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unknown location: {0}")]
    UnknownLocation(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Label record rejected by schema validation
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Sink append failed after all retries
    #[error("Sink write failed: {0}")]
    SinkWrite(String),

    #[error("Acquisition cancelled")]
    Cancelled,

    /// A second run was requested while one is active
    #[error("Conflict: acquisition already running ({0})")]
    AlreadyRunning(String),

    /// Unrecoverable automation surface failure (fatal)
    #[error("Automation surface failure: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Move outside the session state graph
    #[error("Illegal state transition: {from} -> {to}")]
    IllegalTransition {
        from: AcquisitionState,
        to: AcquisitionState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Common error: {0}")]
    Common(#[from] gleaner_common::Error),
}

impl AcqError {
    /// Value written to the "Error Type" column of the error table
    pub fn error_type(&self) -> &'static str {
        match self {
            AcqError::DriverInit(_) => "DriverInitError",
            AcqError::Auth(_) => "AuthError",
            AcqError::UnknownLocation(_) => "UnknownLocation",
            AcqError::InvalidImage(_) => "InvalidImage",
            AcqError::Validation { .. } => "ValidationError",
            AcqError::SinkWrite(_) => "SinkWriteError",
            AcqError::Cancelled => "CancelledError",
            AcqError::AlreadyRunning(_) => "AlreadyRunning",
            AcqError::Surface(_) => "SurfaceError",
            AcqError::InvalidInput(_) => "InvalidInput",
            AcqError::IllegalTransition { .. } => "IllegalTransition",
            AcqError::Io(_) => "IoError",
            AcqError::Common(_) => "CommonError",
        }
    }

    /// Whether this error ends the session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AcqError::DriverInit(_) | AcqError::Auth(_) | AcqError::Surface(_) | AcqError::Cancelled
        )
    }
}

impl From<ValidationError> for AcqError {
    fn from(err: ValidationError) -> Self {
        AcqError::Validation {
            field: err.field,
            reason: err.reason,
        }
    }
}

impl From<IntakeError> for AcqError {
    fn from(err: IntakeError) -> Self {
        AcqError::InvalidImage(err.to_string())
    }
}

impl From<SinkError> for AcqError {
    fn from(err: SinkError) -> Self {
        AcqError::SinkWrite(err.to_string())
    }
}

/// Result type alias for acquisition operations
pub type AcqResult<T> = Result<T, AcqError>;
