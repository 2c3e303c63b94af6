//! # clusteragg-wire: Binary wire protocol for `clusteragg`
//!
//! Remote hosts stream aggregation records over long-lived TCP connections.
//! Every message travels in a length-prefixed, type-tagged frame:
//!
//! ```text
//! [total_length: u32 BE][type: u8][payload: total_length - 5 bytes]
//! ```
//!
//! Payloads are serialized with `postcard`. The tag registry lives in
//! [`MessageType`]; the [`FrameBuffer`] turns fragmented socket reads into
//! whole [`Message`]s.

mod codec;
mod error;
mod framer;
mod message;

pub use codec::{
    Decoded, FRAME_HEADER_SIZE, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE, decode, encode, encode_into,
};
pub use error::{WireError, WireResult};
pub use framer::{Drain, FrameBuffer, STALLED_FRAME_WARNING_DRAINS};
pub use message::{
    AggregationRecord, HeartbeatRecord, HostIdentification, LegacyAggRecord, Message, MessageType,
};
