//! Wire protocol for the vigil passive check result receiver.
//!
//! Remote agents push check outcomes to a monitoring host as fixed-size
//! binary records (PDUs) over plain TCP. This crate owns everything about
//! that record format and nothing about I/O:
//!
//! - [`pdu`]: the 4300-byte record, pack/unpack with CRC, version, and
//!   freshness validation
//! - [`crc`]: the table-driven CRC32 engine the codec checksums with
//! - [`text`]: the tab-delimited line format the sender tool reads
//! - [`errors`]: structured decode errors
//!
//! The codec is pure: [`Pdu::unpack`] takes the caller's clock reading as a
//! parameter instead of consulting the system time, so validation is fully
//! deterministic under test.

#![deny(missing_docs)]

pub mod crc;
pub mod errors;
pub mod pdu;
pub mod text;

pub use errors::{DecodeError, Skew};
pub use pdu::Pdu;
