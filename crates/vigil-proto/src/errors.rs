//! Error types for PDU decoding.
//!
//! All errors are structured and testable. A decode failure never says
//! anything about the connection it arrived on; that policy belongs to the
//! receiver.

use std::fmt;

use thiserror::Error;

/// Which direction a stale packet's timestamp is skewed.
///
/// Both directions are rejections; the distinction exists purely for
/// diagnostics (a fleet with drifting clocks looks different from a replay
/// of old traffic).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skew {
    /// The packet claims a timestamp earlier than the receiver's clock.
    Past,
    /// The packet claims a timestamp later than the receiver's clock.
    Future,
}

impl fmt::Display for Skew {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Past => write!(f, "past"),
            Self::Future => write!(f, "future"),
        }
    }
}

/// Reasons a wire record fails to decode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input is not exactly one record long (includes empty input).
    #[error("wrong record size: expected {expected} bytes, got {actual}")]
    WrongSize {
        /// Required record size in bytes.
        expected: usize,
        /// Size of the input actually presented.
        actual: usize,
    },

    /// The CRC32 carried in the record does not match the computed one.
    #[error("checksum mismatch: packet declares {declared:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum extracted from the record.
        declared: u32,
        /// Checksum computed over the record with the field zeroed.
        computed: u32,
    },

    /// The record carries a protocol version other than the supported one.
    #[error("unsupported protocol version: got {0}, wanted {}", crate::pdu::PROTOCOL_VERSION)]
    VersionMismatch(u16),

    /// The record's timestamp is outside the freshness window.
    #[error("stale packet: timestamp is {age}s in the {skew}")]
    Stale {
        /// Absolute clock difference in seconds.
        age: u32,
        /// Whether the timestamp lies ahead of or behind the receiver.
        skew: Skew,
    },
}
