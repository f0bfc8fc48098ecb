//! Error types for ChitraPano

use thiserror::Error;

use crate::session::CapturePhase;

/// ChitraPano error type
#[derive(Error, Debug)]
pub enum PanoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request parameters: {0}")]
    InvalidRequest(String),

    #[error("Panorama already in progress (phase: {0})")]
    Busy(CapturePhase),

    #[error("Capture action error: {0}")]
    Action(String),

    #[error("Channel closed: {0}")]
    Channel(String),
}

impl From<toml::de::Error> for PanoError {
    fn from(e: toml::de::Error) -> Self {
        PanoError::Config(e.to_string())
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for PanoError {
    fn from(e: crossbeam_channel::SendError<T>) -> Self {
        PanoError::Channel(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PanoError>;
