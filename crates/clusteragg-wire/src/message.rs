//! Message payloads and the type-tag registry.
//!
//! ```text
//! tag   message              notes
//! 0x01  HostIdentification   sent once after connect
//! 0x02  AggregationRecord    current record format
//! 0x03  HeartbeatRecord      informational only
//! 0x04  LegacyAggRecord      older clients; optional start and sample count
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{WireError, WireResult};

// ============================================================================
// Type Registry
// ============================================================================

/// Type tag carried in byte 4 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    HostIdentification = 0x01,
    AggregationRecord = 0x02,
    HeartbeatRecord = 0x03,
    LegacyAggRecord = 0x04,
}

impl MessageType {
    /// Looks up the message type for a tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::HostIdentification),
            0x02 => Some(Self::AggregationRecord),
            0x03 => Some(Self::HeartbeatRecord),
            0x04 => Some(Self::LegacyAggRecord),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Short name used in logs and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            Self::HostIdentification => "host_identification",
            Self::AggregationRecord => "aggregation_record",
            Self::HeartbeatRecord => "heartbeat_record",
            Self::LegacyAggRecord => "legacy_agg_record",
        }
    }

    /// Decodes a payload according to this type's schema.
    pub fn decode_payload(self, payload: &[u8]) -> WireResult<Message> {
        let message = match self {
            Self::HostIdentification => Message::HostIdentification(postcard::from_bytes(payload)?),
            Self::AggregationRecord => Message::AggregationRecord(postcard::from_bytes(payload)?),
            Self::HeartbeatRecord => Message::HeartbeatRecord(postcard::from_bytes(payload)?),
            Self::LegacyAggRecord => Message::LegacyAggRecord(postcard::from_bytes(payload)?),
        };
        Ok(message)
    }
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::from_tag(tag).ok_or(WireError::UnknownMessageType(tag))
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Identifies the sending host and its cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentification {
    pub host_name: Option<String>,
    pub cluster_name: Option<String>,
}

/// A single aggregated statistic for one period (current format).
///
/// The cluster is not carried per record; it comes from the connection's
/// [`HostIdentification`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationRecord {
    pub service: String,
    pub metric: String,
    /// ISO-8601 duration, e.g. `PT1M`.
    pub period: String,
    /// ISO-8601 timestamp of the period start.
    pub period_start: String,
    pub statistic: String,
    pub statistic_value: f64,
    /// Upper-case unit name; empty or absent means unitless.
    pub unit: Option<String>,
    pub samples: Vec<f64>,
    pub population_size: u64,
}

/// A single aggregated statistic sent by older clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyAggRecord {
    pub service: String,
    pub metric: String,
    pub period: String,
    pub period_start: Option<String>,
    pub statistic: String,
    pub statistic_value: f64,
    pub statistic_samples: Vec<f64>,
    pub raw_sample_count: Option<u64>,
}

/// Liveness signal from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub timestamp: String,
}

// ============================================================================
// Message
// ============================================================================

/// Every message that can travel inside a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    HostIdentification(HostIdentification),
    AggregationRecord(AggregationRecord),
    HeartbeatRecord(HeartbeatRecord),
    LegacyAggRecord(LegacyAggRecord),
}

impl Message {
    /// Returns the registry entry for this message. The tag is derived
    /// from the variant only.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::HostIdentification(_) => MessageType::HostIdentification,
            Self::AggregationRecord(_) => MessageType::AggregationRecord,
            Self::HeartbeatRecord(_) => MessageType::HeartbeatRecord,
            Self::LegacyAggRecord(_) => MessageType::LegacyAggRecord,
        }
    }

    /// Serializes the payload (without the frame header).
    pub fn encode_payload(&self) -> WireResult<Vec<u8>> {
        let payload = match self {
            Self::HostIdentification(m) => postcard::to_allocvec(m)?,
            Self::AggregationRecord(m) => postcard::to_allocvec(m)?,
            Self::HeartbeatRecord(m) => postcard::to_allocvec(m)?,
            Self::LegacyAggRecord(m) => postcard::to_allocvec(m)?,
        };
        Ok(payload)
    }
}

impl From<HostIdentification> for Message {
    fn from(value: HostIdentification) -> Self {
        Self::HostIdentification(value)
    }
}

impl From<AggregationRecord> for Message {
    fn from(value: AggregationRecord) -> Self {
        Self::AggregationRecord(value)
    }
}

impl From<HeartbeatRecord> for Message {
    fn from(value: HeartbeatRecord) -> Self {
        Self::HeartbeatRecord(value)
    }
}

impl From<LegacyAggRecord> for Message {
    fn from(value: LegacyAggRecord) -> Self {
        Self::LegacyAggRecord(value)
    }
}
