//! Error types for the batching engines.

use std::fmt;

use crate::backend::TextureHandle;

/// Errors raised by the batching engines.
///
/// Every variant is a programming-contract violation: the call fails
/// immediately, nothing is retried, and no engine state has been mutated by
/// the time the error is returned. Conditions that are expected in steady
/// state (no texture bound, empty batches, unregistered handles on the safe
/// routing path) are not errors and return silently instead.
#[derive(Debug)]
pub enum BatchError {
    /// `begin` was called while a recording was already open.
    RecordingAlreadyStarted,

    /// `end` was called with no matching `begin`.
    RecordingNotStarted,

    /// An operation that mutates capacity or the texture set was attempted
    /// mid-recording.
    RecordingInProgress {
        /// The rejected operation.
        operation: &'static str,
    },

    /// A viewport dimension was zero.
    InvalidViewport {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
    },

    /// A batch capacity of zero was requested.
    InvalidCapacity,

    /// A slot index was out of range for the registered texture set.
    SlotOutOfRange {
        /// The requested slot index.
        index: usize,
        /// Number of registered slots.
        slots: usize,
    },

    /// The texture provider knows nothing about this handle.
    UnknownTexture {
        /// The handle that failed to resolve.
        texture: TextureHandle,
    },
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::RecordingAlreadyStarted => {
                write!(f, "begin cannot be called again until end has been called")
            }
            BatchError::RecordingNotStarted => {
                write!(f, "begin must be called before calling end")
            }
            BatchError::RecordingInProgress { operation } => {
                write!(f, "{} is not allowed while recording", operation)
            }
            BatchError::InvalidViewport { width, height } => {
                write!(f, "viewport dimensions must be non-zero, got {}x{}", width, height)
            }
            BatchError::InvalidCapacity => {
                write!(f, "batch capacity must be at least 1")
            }
            BatchError::SlotOutOfRange { index, slots } => {
                write!(f, "slot index {} out of range for {} registered slots", index, slots)
            }
            BatchError::UnknownTexture { texture } => {
                write!(f, "texture {:?} is not known to the texture provider", texture)
            }
        }
    }
}

impl std::error::Error for BatchError {}

/// Result type alias for batching operations.
pub type BatchResult<T> = Result<T, BatchError>;
