// THEORY:
// Every fallible operation in the engine reports through a single error enum.
// Two families exist: precondition violations caught at the API boundary
// (bad dimensions, bad wheel sizes, out-of-range parameters, frames that do not
// match the model they are fed to) and arena growth failures. Nothing here is
// transient: the same inputs always produce the same error.

/// Errors produced by the vision engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VisionError {
    #[error("Invalid frame dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Buffer size mismatch: expected {expected} bytes, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },

    #[error("Invalid wheel size {wheel_size}: must be in 1..={max} for this scan")]
    InvalidWheelSize { wheel_size: usize, max: usize },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Frame is {got_width}x{got_height} but the model was built for {width}x{height}")]
    FrameSizeMismatch {
        width: usize,
        height: usize,
        got_width: usize,
        got_height: usize,
    },

    #[error("Unable to grow the {pool} pool by {requested} records")]
    PoolExhausted { pool: &'static str, requested: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for vision engine operations.
pub type VisionResult<T> = Result<T, VisionError>;
