use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during microphone capture operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MicrophoneError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ArgumentError),

    #[error("device not available: {0}")]
    DeviceUnavailable(String),

    #[error("device enumeration failed: {0}")]
    Enumeration(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Rejected caller input. The session is left exactly as it was.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("buffer has not been initialized or is of zero length")]
    BufferNotInitialized,

    #[error("buffer does not satisfy alignment requirements: expected at least {required} bytes, got {actual}")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("offset {offset} is out of bounds for a destination of {destination_len} bytes")]
    OffsetOutOfRange { offset: usize, destination_len: usize },

    #[error("offset {offset} does not satisfy alignment requirements of a {buffer_len}-byte chunk")]
    OffsetBeyondChunk { offset: usize, buffer_len: usize },

    #[error("offset {offset} plus count {count} exceeds destination length {destination_len}")]
    CountOutOfRange {
        offset: usize,
        count: usize,
        destination_len: usize,
    },

    #[error("buffer duration {0:?} must be between 100ms and 1000ms in 10ms increments")]
    BufferDurationOutOfRange(Duration),

    #[error("duration {0:?} is too large to express as a byte count")]
    DurationOutOfRange(Duration),
}

pub type Result<T> = std::result::Result<T, MicrophoneError>;
