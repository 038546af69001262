use thiserror::Error;

/// Fatal configuration and construction errors.
///
/// Everything recoverable (publish failures, malformed host blocks) is
/// handled locally and never surfaces through this type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The host supplied a zero or negative sample rate at activation.
    #[error("Sample rate must be positive, got {value}")]
    InvalidSampleRate { value: f64 },
    /// The host supplied a zero maximum block size at activation.
    #[error("Maximum block size must be positive")]
    InvalidBlockSize,
    /// The configured analysis window cannot be used for the transform.
    #[error("Analysis window size must be a nonzero power of two, got {value}")]
    InvalidWindowSize { value: usize },
    /// The configured pitch band is empty or inverted.
    #[error("Pitch band is invalid: {min_hz} Hz .. {max_hz} Hz")]
    InvalidPitchBand { min_hz: f32, max_hz: f32 },
}
