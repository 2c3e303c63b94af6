//! Receive buffer that turns arbitrary TCP chunks into whole messages.

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::codec::{self, Decoded, LENGTH_PREFIX_SIZE};
use crate::error::WireResult;
use crate::message::Message;

/// Drains that may end on the same incomplete frame before it is reported
/// as a protocol warning.
pub const STALLED_FRAME_WARNING_DRAINS: u32 = 8;

/// Accumulates bytes from a socket and extracts complete frames.
///
/// Only undecoded trailing bytes are retained. Decoded and skipped frames
/// are removed from the front of the buffer as [`Drain`] yields them.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
    skipped: u64,
    stalled: u32,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            skipped: 0,
            stalled: 0,
        }
    }

    /// Appends newly received bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns a lazy iterator over the complete messages currently buffered.
    ///
    /// The iterator ends when no further frame can be decoded. A fatal
    /// [`WireError`](crate::WireError) is yielded once and ends iteration; the
    /// buffer contents are then untrustworthy and the connection should be
    /// dropped.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain {
            buffer: self,
            failed: false,
        }
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Returns the retained, undecoded bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total frames dropped for an unknown tag or corrupt payload.
    pub fn frames_skipped(&self) -> u64 {
        self.skipped
    }

    /// Consecutive drains that ended on the same incomplete frame.
    pub fn stalled_drains(&self) -> u32 {
        self.stalled
    }
}

/// Iterator returned by [`FrameBuffer::drain`].
#[derive(Debug)]
pub struct Drain<'a> {
    buffer: &'a mut FrameBuffer,
    failed: bool,
}

impl Iterator for Drain<'_> {
    type Item = WireResult<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let buf = &mut self.buffer.buf;
            if buf.len() <= LENGTH_PREFIX_SIZE {
                return None;
            }

            match codec::decode(&buf[..]) {
                Ok(Decoded::Message { message, length }) => {
                    buf.advance(length);
                    self.buffer.stalled = 0;
                    return Some(Ok(message));
                }
                Ok(Decoded::Skipped { length }) => {
                    buf.advance(length);
                    self.buffer.skipped += 1;
                    self.buffer.stalled = 0;
                }
                Ok(Decoded::Incomplete) => {
                    let buffered = buf.len();
                    self.buffer.stalled = self.buffer.stalled.saturating_add(1);
                    if self.buffer.stalled == STALLED_FRAME_WARNING_DRAINS {
                        warn!(
                            buffered,
                            drains = self.buffer.stalled,
                            "frame still incomplete after repeated reads, stream may be corrupt"
                        );
                    } else {
                        debug!(
                            buffered,
                            "frame header present but frame incomplete, waiting for more bytes"
                        );
                    }
                    return None;
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl std::iter::FusedIterator for Drain<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WireError;
    use crate::codec::encode;
    use crate::message::{AggregationRecord, HeartbeatRecord, HostIdentification};
    use proptest::prelude::*;

    fn sample_messages() -> Vec<Message> {
        vec![
            HostIdentification {
                host_name: Some("web1".to_string()),
                cluster_name: Some("prod".to_string()),
            }
            .into(),
            AggregationRecord {
                service: "checkout".to_string(),
                metric: "latency".to_string(),
                period: "PT1M".to_string(),
                period_start: "2015-01-01T00:00:00Z".to_string(),
                statistic: "tp99".to_string(),
                statistic_value: 12.5,
                unit: Some("MILLISECOND".to_string()),
                samples: vec![1.0, 2.0, 12.5],
                population_size: 3,
            }
            .into(),
            HeartbeatRecord {
                timestamp: "2015-01-01T00:00:30Z".to_string(),
            }
            .into(),
        ]
    }

    fn stream(messages: &[Message]) -> Vec<u8> {
        messages
            .iter()
            .flat_map(|m| encode(m).unwrap().to_vec())
            .collect()
    }

    fn collect(framer: &mut FrameBuffer) -> Vec<Message> {
        framer.drain().map(Result::unwrap).collect()
    }

    #[test]
    fn drains_every_complete_frame() {
        let messages = sample_messages();
        let mut framer = FrameBuffer::new();
        framer.feed(&stream(&messages));

        assert_eq!(collect(&mut framer), messages);
        assert!(framer.is_empty());
    }

    #[test]
    fn retains_partial_tail() {
        let messages = sample_messages();
        let bytes = stream(&messages);
        let mut framer = FrameBuffer::new();
        framer.feed(&bytes[..bytes.len() - 3]);

        assert_eq!(collect(&mut framer), messages[..2].to_vec());
        let tail_len = framer.buffered();
        assert!(tail_len > 0);

        // Draining again with no new input yields nothing and keeps the tail.
        assert!(collect(&mut framer).is_empty());
        assert_eq!(framer.buffered(), tail_len);

        framer.feed(&bytes[bytes.len() - 3..]);
        assert_eq!(collect(&mut framer), messages[2..].to_vec());
        assert!(framer.is_empty());
    }

    #[test]
    fn stops_at_four_buffered_bytes() {
        let mut framer = FrameBuffer::new();
        framer.feed(&[0, 0, 0, 1]);
        assert!(collect(&mut framer).is_empty());
        assert_eq!(framer.remaining(), &[0, 0, 0, 1]);
    }

    #[test]
    fn unknown_frame_is_skipped_and_stream_continues() {
        let messages = sample_messages();
        let mut bytes = vec![0, 0, 0, 9, 0xFF, 0xDE, 0xAD, 0xBE, 0xEF];
        bytes.extend(stream(&messages));

        let mut framer = FrameBuffer::new();
        framer.feed(&bytes);
        assert_eq!(collect(&mut framer), messages);
        assert!(framer.is_empty());
        assert_eq!(framer.frames_skipped(), 1);
    }

    #[test]
    fn fatal_length_ends_the_drain() {
        let mut framer = FrameBuffer::new();
        framer.feed(&[0, 0, 0, 2, 0x01, 0x00]);

        let mut drain = framer.drain();
        assert!(matches!(drain.next(), Some(Err(WireError::InvalidLength(2)))));
        assert!(drain.next().is_none());
    }

    #[test]
    fn stalled_frame_is_counted_until_completed() {
        let messages = sample_messages();
        let bytes = stream(&messages[..1]);
        let (head, tail) = bytes.split_at(LENGTH_PREFIX_SIZE + 1);
        let mut framer = FrameBuffer::new();
        framer.feed(head);

        for expected in 1..=STALLED_FRAME_WARNING_DRAINS + 2 {
            assert!(collect(&mut framer).is_empty());
            assert_eq!(framer.stalled_drains(), expected);
        }

        framer.feed(tail);
        assert_eq!(collect(&mut framer), messages[..1].to_vec());
        assert_eq!(framer.stalled_drains(), 0);
    }

    #[test]
    fn short_buffer_is_not_a_stalled_frame() {
        let mut framer = FrameBuffer::new();
        framer.feed(&[0, 0, 0]);
        assert!(collect(&mut framer).is_empty());
        assert_eq!(framer.stalled_drains(), 0);
    }

    #[test]
    fn drain_is_lazy() {
        let messages = sample_messages();
        let bytes = stream(&messages);
        let mut framer = FrameBuffer::new();
        framer.feed(&bytes);

        let first = framer.drain().next().unwrap().unwrap();
        assert_eq!(first, messages[0]);

        // Only the first frame was consumed.
        let first_len = encode(&messages[0]).unwrap().len();
        assert_eq!(framer.buffered(), bytes.len() - first_len);
        assert_eq!(collect(&mut framer), messages[1..].to_vec());
    }

    proptest! {
        #[test]
        fn any_split_yields_the_same_messages(cuts in proptest::collection::vec(any::<prop::sample::Index>(), 1..6)) {
            let messages = sample_messages();
            let bytes = stream(&messages);

            let mut positions: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len())).collect();
            positions.sort_unstable();
            positions.dedup();

            let mut framer = FrameBuffer::new();
            let mut decoded = Vec::new();
            let mut start = 0;
            for pos in positions.into_iter().chain(std::iter::once(bytes.len())) {
                framer.feed(&bytes[start..pos]);
                decoded.extend(collect(&mut framer));
                start = pos;
            }

            prop_assert_eq!(decoded, messages);
            prop_assert!(framer.is_empty());
        }
    }

    #[test]
    fn byte_at_a_time() {
        let messages = sample_messages();
        let mut framer = FrameBuffer::new();
        let mut decoded = Vec::new();
        for byte in stream(&messages) {
            framer.feed(&[byte]);
            decoded.extend(collect(&mut framer));
        }
        assert_eq!(decoded, messages);
        assert!(framer.is_empty());
    }
}
