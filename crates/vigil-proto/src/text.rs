//! Tab-delimited input format for the sender tool.
//!
//! Agents feed check results to the sender as text, one record per line:
//!
//! ```text
//! host<TAB>service<TAB>return_code<TAB>output
//! ```
//!
//! Records are separated by the ASCII ETB byte (`0x17`) rather than a
//! newline, so check output may itself span lines. An empty service field
//! marks a host-level check.
//!
//! Parsing is forgiving the way a pipe consumer should be: a record that is
//! malformed (fewer than four fields, empty host, or a return code that is
//! not a single digit `0`-`3`) is skipped and counted, never fatal.

use crate::pdu::Pdu;

/// Byte separating records in the sender's input stream (ASCII ETB).
pub const RECORD_SEPARATOR: u8 = 0x17;

/// One parsed input record, ready to be stamped and packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Host the check ran against.
    pub host: String,
    /// Service checked, or `None` for a host-level check.
    pub service: Option<String>,
    /// Check outcome, `0` through `3`.
    pub return_code: u16,
    /// Human-readable check output.
    pub output: String,
}

impl Record {
    /// Converts the record into a wire PDU stamped with `timestamp`.
    #[must_use]
    pub fn into_pdu(self, timestamp: u32) -> Pdu {
        Pdu::new(&self.host, self.service.as_deref(), self.return_code, &self.output, timestamp)
    }
}

/// Outcome of parsing a sender input stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Records that parsed cleanly, in input order.
    pub records: Vec<Record>,
    /// Number of records skipped as malformed.
    pub skipped: usize,
}

/// Splits `input` on [`RECORD_SEPARATOR`] and parses each chunk.
///
/// Chunks that are empty after trimming ASCII whitespace are ignored
/// outright (a trailing separator is normal); chunks that fail to parse are
/// counted in [`ParseOutcome::skipped`].
#[must_use]
pub fn parse_records(input: &[u8]) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    for chunk in input.split(|&b| b == RECORD_SEPARATOR) {
        let text = String::from_utf8_lossy(chunk);
        let trimmed = text.trim_matches(|c: char| c.is_ascii_whitespace());
        if trimmed.is_empty() {
            continue;
        }
        match parse_one(trimmed) {
            Some(record) => outcome.records.push(record),
            None => outcome.skipped += 1,
        }
    }
    outcome
}

fn parse_one(text: &str) -> Option<Record> {
    let mut fields = text.splitn(4, '\t');
    let host = fields.next()?;
    let service = fields.next()?;
    let return_code = fields.next()?;
    let output = fields.next()?;

    if host.is_empty() {
        return None;
    }
    // A single ASCII digit 0-3; "10" or "-1" is an agent bug, not a code.
    let return_code = match return_code.as_bytes() {
        [d @ b'0'..=b'3'] => u16::from(d - b'0'),
        _ => return None,
    };

    Some(Record {
        host: host.to_owned(),
        service: if service.is_empty() { None } else { Some(service.to_owned()) },
        return_code,
        output: output.to_owned(),
    })
}
