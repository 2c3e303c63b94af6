//! Frame encoding and decoding.
//!
//! ```text
//! ┌──────────────────────┬──────────┬────────────────────────────┐
//! │ total_length: u32 BE │ type: u8 │ payload (total_length - 5) │
//! └──────────────────────┴──────────┴────────────────────────────┘
//! ```
//!
//! `total_length` covers the whole frame, header included. Decoding never
//! waits: a short buffer yields [`Decoded::Incomplete`] and the caller keeps
//! its bytes until more arrive.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{trace, warn};

use crate::error::{WireError, WireResult};
use crate::message::{Message, MessageType};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the frame header: length prefix plus type tag.
pub const FRAME_HEADER_SIZE: usize = LENGTH_PREFIX_SIZE + 1;

/// Largest frame accepted or produced (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Outcome of a single [`decode`] attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The buffer does not yet hold a whole frame.
    Incomplete,
    /// A frame was decoded; `length` bytes were consumed.
    Message { message: Message, length: usize },
    /// A frame with an unknown tag or corrupt payload was dropped. The
    /// declared `length` bytes must still be consumed.
    Skipped { length: usize },
}

/// Attempts to decode one frame from the front of `buf`.
///
/// Unknown tags and payloads that fail to deserialize are logged and
/// reported as [`Decoded::Skipped`], consuming exactly the declared length.
///
/// # Errors
///
/// Returns [`WireError::InvalidLength`] or [`WireError::FrameTooLarge`] when
/// the declared length cannot be trusted. Both are fatal to the stream.
pub fn decode(buf: &[u8]) -> WireResult<Decoded> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(Decoded::Incomplete);
    }

    let declared = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let length = declared as usize;
    if length < FRAME_HEADER_SIZE {
        return Err(WireError::InvalidLength(declared));
    }
    if length > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }
    if buf.len() < length {
        trace!(have = buf.len(), need = length, "partial frame");
        return Ok(Decoded::Incomplete);
    }

    let tag = buf[LENGTH_PREFIX_SIZE];
    let payload = &buf[FRAME_HEADER_SIZE..length];

    let Some(message_type) = MessageType::from_tag(tag) else {
        warn!(tag, length, "unsupported message type, skipping frame");
        return Ok(Decoded::Skipped { length });
    };

    match message_type.decode_payload(payload) {
        Ok(message) => Ok(Decoded::Message { message, length }),
        Err(e) => {
            warn!(
                message_type = message_type.name(),
                length,
                error = %e,
                "invalid payload, skipping frame"
            );
            Ok(Decoded::Skipped { length })
        }
    }
}

/// Encodes `message` as a complete frame.
pub fn encode(message: &Message) -> WireResult<Bytes> {
    let mut buf = BytesMut::new();
    encode_into(message, &mut buf)?;
    Ok(buf.freeze())
}

/// Appends the frame for `message` to `buf` and returns the frame length.
pub fn encode_into(message: &Message, buf: &mut BytesMut) -> WireResult<usize> {
    let payload = message.encode_payload()?;
    let length = payload.len() + FRAME_HEADER_SIZE;
    if length > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    buf.reserve(length);
    buf.put_u32(length as u32);
    buf.put_u8(message.message_type().tag());
    buf.put_slice(&payload);
    Ok(length)
}
