//! Fixed-layout check result record (PDU).
//!
//! The PDU is a 4300-byte structure serialized as raw binary with all
//! multi-byte integers in network (big-endian) order. Both ends of the wire
//! read and write exactly this many bytes per record, so the receiver can
//! reassemble by byte count alone with no delimiter scanning.
//!
//! Layout on the wire:
//!
//! ```text
//! crc32:       u32   checksum over the record, field zeroed during computation
//! timestamp:   u32   seconds since the epoch when the check was produced
//! version:     u16   must equal PROTOCOL_VERSION
//! return_code: u16   check outcome (0 OK / 1 WARNING / 2 CRITICAL / 3 UNKNOWN)
//! host:        64B   NUL-terminated host name
//! service:    128B   NUL-terminated service name, "HOST" for host checks
//! output:    4096B   NUL-terminated human-readable output
//! ```
//!
//! Fields are stored as raw byte arrays in network representation; accessor
//! methods convert on read. Byte-order conversion is unconditional — the
//! wire is big-endian even when the host happens to be too.
//!
//! The record offers **integrity only** (a CRC against accidental
//! corruption). It is not authenticated and not encrypted; deployments are
//! expected to restrict who can reach the listen port.

use std::borrow::Cow;
use std::fmt;

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::crc;
use crate::errors::{DecodeError, Skew};

/// Capacity of the `host` field in bytes, terminator included.
pub const HOST_LEN: usize = 64;

/// Capacity of the `service` field in bytes, terminator included.
pub const SERVICE_LEN: usize = 128;

/// Capacity of the `output` field in bytes, terminator included.
pub const OUTPUT_LEN: usize = 4096;

/// The single protocol version this build speaks.
pub const PROTOCOL_VERSION: u16 = 1;

/// Freshness window in seconds.
///
/// A record whose timestamp differs from the receiver's clock by more than
/// this, in either direction, is rejected. Fixed at build time, not
/// configurable.
pub const MAX_AGE_SECS: u32 = 30;

/// Reserved service name marking a host-level check.
pub const HOST_SENTINEL: &str = "HOST";

/// One passive check result in wire representation.
#[repr(C)]
#[derive(Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Pdu {
    crc32: [u8; 4],
    timestamp: [u8; 4],
    version: [u8; 2],
    return_code: [u8; 2],
    host: [u8; HOST_LEN],
    service: [u8; SERVICE_LEN],
    output: [u8; OUTPUT_LEN],
}

impl Pdu {
    /// Size of one serialized record (4300 bytes).
    pub const SIZE: usize = 4300;

    /// Builds a record from its logical parts.
    ///
    /// Text that exceeds a field's capacity is truncated to capacity minus
    /// one, leaving room for the NUL terminator. `service == None` writes
    /// the [`HOST_SENTINEL`], marking a host-level check. The checksum field
    /// is left zero; [`Pdu::pack`] fills it in.
    ///
    /// `return_code` is carried through unchecked — what the codes mean is
    /// the monitoring core's business, and the wire layer does not constrain
    /// them.
    #[must_use]
    pub fn new(
        host: &str,
        service: Option<&str>,
        return_code: u16,
        output: &str,
        timestamp: u32,
    ) -> Self {
        let mut pdu = Self::new_zeroed();
        pdu.timestamp = timestamp.to_be_bytes();
        pdu.version = PROTOCOL_VERSION.to_be_bytes();
        pdu.return_code = return_code.to_be_bytes();
        copy_truncated(&mut pdu.host, host);
        copy_truncated(&mut pdu.service, service.unwrap_or(HOST_SENTINEL));
        copy_truncated(&mut pdu.output, output);
        pdu
    }

    /// Serializes the record for the wire.
    ///
    /// Computes the CRC32 over the record with the checksum field zeroed and
    /// stores it back in network order. Pure transform; no I/O.
    #[must_use]
    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut wire = [0u8; Self::SIZE];
        wire.copy_from_slice(self.as_bytes());
        wire[0..4].fill(0);
        let sum = crc::checksum(&wire);
        wire[0..4].copy_from_slice(&sum.to_be_bytes());
        wire
    }

    /// Validates and decodes one wire record.
    ///
    /// `now` is the receiver's clock in seconds since the epoch; it is a
    /// parameter rather than a system call so the freshness check is
    /// deterministic under test.
    ///
    /// Validation order:
    ///
    /// 1. the input must be exactly [`Pdu::SIZE`] bytes
    /// 2. the CRC32 (computed with the checksum field zeroed) must match the
    ///    one the record declares
    /// 3. the version must equal [`PROTOCOL_VERSION`]
    /// 4. the timestamp must be within [`MAX_AGE_SECS`] of `now`, in either
    ///    direction
    ///
    /// # Errors
    ///
    /// Returns the corresponding [`DecodeError`] for the first check that
    /// fails. A failed decode says nothing about the connection the record
    /// arrived on.
    pub fn unpack(bytes: &[u8], now: u32) -> Result<Self, DecodeError> {
        if bytes.len() != Self::SIZE {
            return Err(DecodeError::WrongSize { expected: Self::SIZE, actual: bytes.len() });
        }

        let pdu = Self::read_from_bytes(bytes)
            .map_err(|_| DecodeError::WrongSize { expected: Self::SIZE, actual: bytes.len() })?;

        let mut scratch = [0u8; Self::SIZE];
        scratch.copy_from_slice(bytes);
        scratch[0..4].fill(0);
        let computed = crc::checksum(&scratch);
        let declared = u32::from_be_bytes(pdu.crc32);
        if computed != declared {
            return Err(DecodeError::ChecksumMismatch { declared, computed });
        }

        if pdu.version() != PROTOCOL_VERSION {
            return Err(DecodeError::VersionMismatch(pdu.version()));
        }

        let ts = pdu.timestamp();
        let (age, skew) = if ts > now { (ts - now, Skew::Future) } else { (now - ts, Skew::Past) };
        if age > MAX_AGE_SECS {
            return Err(DecodeError::Stale { age, skew });
        }

        Ok(pdu)
    }

    /// The checksum carried in the record.
    #[must_use]
    pub fn crc32(&self) -> u32 {
        u32::from_be_bytes(self.crc32)
    }

    /// Seconds since the epoch when the check was produced.
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes(self.timestamp)
    }

    /// Protocol version carried in the record.
    #[must_use]
    pub fn version(&self) -> u16 {
        u16::from_be_bytes(self.version)
    }

    /// Check outcome code.
    #[must_use]
    pub fn return_code(&self) -> u16 {
        u16::from_be_bytes(self.return_code)
    }

    /// Host name, up to the first NUL.
    #[must_use]
    pub fn host(&self) -> Cow<'_, str> {
        text_field(&self.host)
    }

    /// Service name as carried on the wire, sentinel included.
    #[must_use]
    pub fn service_raw(&self) -> Cow<'_, str> {
        text_field(&self.service)
    }

    /// Service name, or `None` when this is a host-level check.
    #[must_use]
    pub fn service(&self) -> Option<Cow<'_, str>> {
        let raw = self.service_raw();
        if raw == HOST_SENTINEL { None } else { Some(raw) }
    }

    /// Whether the record is a host-level check.
    #[must_use]
    pub fn is_host_check(&self) -> bool {
        self.service_raw() == HOST_SENTINEL
    }

    /// Human-readable check output, up to the first NUL.
    #[must_use]
    pub fn output(&self) -> Cow<'_, str> {
        text_field(&self.output)
    }
}

/// Copies `src` into the NUL-terminated field `dst`, truncating silently at
/// capacity minus one.
fn copy_truncated(dst: &mut [u8], src: &str) {
    dst.fill(0);
    let n = src.len().min(dst.len() - 1);
    dst[..n].copy_from_slice(&src.as_bytes()[..n]);
}

fn text_field(buf: &[u8]) -> Cow<'_, str> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end])
}

impl fmt::Debug for Pdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pdu")
            .field("crc32", &format_args!("{:#010x}", self.crc32()))
            .field("timestamp", &self.timestamp())
            .field("version", &self.version())
            .field("return_code", &self.return_code())
            .field("host", &self.host())
            .field("service", &self.service_raw())
            .field("output", &self.output())
            .finish()
    }
}

impl PartialEq for Pdu {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Pdu {}

/// Renders a byte buffer as an offset/hex/ASCII dump, 16 bytes per row.
///
/// Debug aid for logging rejected records; runs entirely in-process.
#[must_use]
pub fn hex_dump(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}  ", row * 16);
        for i in 0..16 {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, "{b:02x} ");
                },
                None => out.push_str("   "),
            }
            if i == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        for &b in chunk {
            out.push(if (0x20..0x7f).contains(&b) { b as char } else { '.' });
        }
        out.push_str("|\n");
    }
    out
}
