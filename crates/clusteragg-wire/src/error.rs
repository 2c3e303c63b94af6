//! Wire protocol error types.

use thiserror::Error;

use crate::codec::FRAME_HEADER_SIZE;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur while encoding or decoding frames.
///
/// [`WireError::InvalidLength`] and [`WireError::FrameTooLarge`] leave the
/// receive buffer in a state that cannot be resynchronised and are fatal to
/// the connection. The other variants only affect a single frame.
#[derive(Debug, Error)]
pub enum WireError {
    /// Declared frame length is shorter than the frame header.
    #[error("frame declares length {0}, shorter than the {FRAME_HEADER_SIZE}-byte header")]
    InvalidLength(u32),

    /// Frame exceeds the maximum allowed size.
    #[error("frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Type tag is not in the message registry.
    #[error("unknown message type tag {0:#04x}")]
    UnknownMessageType(u8),

    /// Payload could not be (de)serialized.
    #[error("payload serialization error: {0}")]
    Serialization(#[from] postcard::Error),
}

impl WireError {
    /// Returns true if the error invalidates the whole receive buffer.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidLength(_) | Self::FrameTooLarge { .. })
    }
}
