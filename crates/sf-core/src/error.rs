//! Error types shared across the Soundfield crates

use thiserror::Error;

/// Errors reported by the spatial-audio crates
#[derive(Error, Debug)]
pub enum SpatialError {
    /// Invalid Ambisonic order
    #[error("Invalid Ambisonic order: {0} (supported: 1-7)")]
    InvalidOrder(usize),

    /// Invalid channel count
    #[error("Invalid channel count: expected {expected}, got {got}")]
    InvalidChannelCount { expected: usize, got: usize },

    /// Invalid sensor count
    #[error("Invalid sensor count: {got} (supported: 1-{max})")]
    InvalidSensorCount { got: usize, max: usize },

    /// Sensor index out of range
    #[error("Sensor index {index} out of range (array has {count} sensors)")]
    SensorIndexOutOfRange { index: usize, count: usize },

    /// FuMa conventions only cover first order
    #[error("FuMa ordering/normalization is only defined up to order 1 (requested order {0})")]
    FumaOrderUnsupported(usize),

    /// Invalid array geometry
    #[error("Invalid array geometry: {0}")]
    InvalidGeometry(String),

    /// Unknown preset name
    #[error("Unknown microphone-array preset: {0}")]
    UnknownPreset(String),

    /// Filterbank frame size mismatch
    #[error("Frame size mismatch: expected {expected}, got {got}")]
    FrameSizeMismatch { expected: usize, got: usize },

    /// Processing error
    #[error("Processing error: {0}")]
    ProcessingError(String),
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;
