//! Audio error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the audio layer (tracks, devices, mixing engine).
#[derive(Error, Debug)]
pub enum AudioError {
    /// Allocation of sample data or mixing memory failed
    #[error("out of memory")]
    OutOfMemory,

    /// The named sink is not known to the audio backend
    #[error("invalid device name for audio output: {0}")]
    DeviceNotFound(String),

    /// Lower-level failure talking to the audio server
    #[error("error communicating with the audio server: {0}")]
    ConnectionError(String),

    /// File could not be opened or decoded
    #[error("failed to load {}: {reason}", path.display())]
    LoadFailed { path: PathBuf, reason: String },

    /// A device asked for more frames than the mixing buffer can hold
    #[error("pull of {requested} frames exceeds mixing buffer capacity of {capacity}")]
    BufferOverrun { requested: usize, capacity: usize },

    /// The control -> device command queue is saturated
    #[error("mixer command queue full")]
    CommandQueueFull,
}

impl AudioError {
    pub(crate) fn load_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AudioError::LoadFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
