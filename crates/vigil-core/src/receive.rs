//! Per-connection byte reassembly and decode policy.
//!
//! TCP gives no message boundaries, so each connection carries an
//! [`Assembler`]: a buffer of exactly one record that fills across however
//! many reads the kernel delivers. The stream layer never scans for
//! delimiters; a record is complete when the byte count says so.
//!
//! Decode policy lives here too: a record that fails validation is logged
//! and discarded, and the connection keeps going. One corrupted or stale
//! record says nothing about the next one, and dropping the connection
//! would punish an agent mid-batch for a single bad entry.

use std::io::{self, Read};

use tracing::{debug, warn};

use vigil_proto::pdu::hex_dump;
use vigil_proto::Pdu;

use crate::clients::Session;
use crate::submit::{CheckResult, ResultSink};

/// Reassembly buffer for exactly one wire record.
#[derive(Debug)]
pub struct Assembler {
    buf: Box<[u8; Pdu::SIZE]>,
    offset: usize,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: Box::new([0u8; Pdu::SIZE]), offset: 0 }
    }

    /// The unfilled tail of the record, for the next read to land in.
    ///
    /// Never empty: completing a record requires calling [`Assembler::reset`]
    /// before asking for more space.
    pub fn vacant(&mut self) -> &mut [u8] {
        &mut self.buf[self.offset..]
    }

    /// Marks `n` freshly read bytes as filled.
    ///
    /// Returns `true` when the record is now complete. `n` must not exceed
    /// what [`Assembler::vacant`] last returned.
    pub fn advance(&mut self, n: usize) -> bool {
        debug_assert!(self.offset + n <= Pdu::SIZE);
        self.offset += n;
        self.offset == Pdu::SIZE
    }

    /// The completed record. Meaningful only after [`Assembler::advance`]
    /// returned `true`.
    #[must_use]
    pub fn record(&self) -> &[u8] {
        &self.buf[..]
    }

    /// Number of bytes accumulated toward the current record.
    #[must_use]
    pub fn filled(&self) -> usize {
        self.offset
    }

    /// Discards the current record and starts the next one.
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

/// What a read pass concluded about the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvState {
    /// The socket drained cleanly; keep the connection registered.
    Open,
    /// EOF or a hard error; the caller must close the connection.
    Closed,
}

/// Drains one readable connection.
///
/// Reads until the socket reports `WouldBlock` (required under
/// edge-triggered readiness, where the event will not repeat while data
/// sits unread), decoding and submitting every record that completes along
/// the way. `now` is the receiver's clock in seconds since the epoch,
/// passed down to record validation.
pub fn recv_data<S: Read, K: ResultSink>(
    session: &mut Session<S>,
    sink: &mut K,
    now: u32,
) -> RecvState {
    let Session { stream, peer, assembler, bytes_total, .. } = session;

    loop {
        match stream.read(assembler.vacant()) {
            Ok(0) => {
                debug!(peer = %peer, partial = assembler.filled(), "peer closed connection");
                return RecvState::Closed;
            },
            Ok(n) => {
                *bytes_total += n as u64;
                if assembler.advance(n) {
                    match Pdu::unpack(assembler.record(), now) {
                        Ok(pdu) => sink.submit(CheckResult::from_pdu(&pdu)),
                        Err(err) => {
                            warn!(peer = %peer, error = %err, "discarding invalid record");
                            debug!(peer = %peer, "rejected record\n{}", hex_dump(assembler.record()));
                        },
                    }
                    assembler.reset();
                }
            },
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return RecvState::Open,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {},
            Err(err) => {
                warn!(peer = %peer, error = %err, "read failed, dropping connection");
                return RecvState::Closed;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::{Duration, Instant};

    use proptest::prelude::*;

    use crate::submit::RecordingSink;

    use super::*;

    const NOW: u32 = 1_700_000_000;

    /// Read impl that replays a script of chunks and errors.
    struct ScriptedReader {
        steps: VecDeque<Step>,
    }

    enum Step {
        Data(Vec<u8>),
        WouldBlock,
        Eof,
        Fail(io::ErrorKind),
    }

    impl ScriptedReader {
        fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self { steps: steps.into_iter().collect() }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.front_mut() {
                Some(Step::Data(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    bytes.drain(..n);
                    if bytes.is_empty() {
                        self.steps.pop_front();
                    }
                    Ok(n)
                },
                Some(Step::WouldBlock) => {
                    self.steps.pop_front();
                    Err(io::ErrorKind::WouldBlock.into())
                },
                Some(Step::Eof) | None => Ok(0),
                Some(Step::Fail(kind)) => {
                    let kind = *kind;
                    self.steps.pop_front();
                    Err(kind.into())
                },
            }
        }
    }

    fn session(steps: impl IntoIterator<Item = Step>) -> Session<ScriptedReader> {
        Session::new(
            ScriptedReader::new(steps),
            "test-peer".into(),
            Instant::now() + Duration::from_secs(300),
        )
    }

    fn wire(host: &str, rc: u16) -> Vec<u8> {
        Pdu::new(host, Some("svc"), rc, "out", NOW).pack().to_vec()
    }

    #[test]
    fn whole_record_in_one_read() {
        let mut s = session([Step::Data(wire("a", 0)), Step::WouldBlock]);
        let mut sink = RecordingSink::new();

        assert_eq!(recv_data(&mut s, &mut sink, NOW), RecvState::Open);
        let results = sink.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].host, "a");
        assert_eq!(s.bytes_total, Pdu::SIZE as u64);
    }

    #[test]
    fn record_split_across_reads() {
        let full = wire("split", 1);
        let mut s = session([
            Step::Data(full[..4].to_vec()),
            Step::WouldBlock,
            Step::Data(full[4..].to_vec()),
            Step::WouldBlock,
        ]);
        let mut sink = RecordingSink::new();

        assert_eq!(recv_data(&mut s, &mut sink, NOW), RecvState::Open);
        assert!(sink.is_empty());
        assert_eq!(s.assembler.filled(), 4);

        assert_eq!(recv_data(&mut s, &mut sink, NOW), RecvState::Open);
        assert_eq!(sink.results()[0].host, "split");
        assert_eq!(s.assembler.filled(), 0);
    }

    #[test]
    fn back_to_back_records_in_one_burst() {
        let mut both = wire("one", 0);
        both.extend_from_slice(&wire("two", 2));
        let mut s = session([Step::Data(both), Step::WouldBlock]);
        let mut sink = RecordingSink::new();

        assert_eq!(recv_data(&mut s, &mut sink, NOW), RecvState::Open);
        let hosts: Vec<String> = sink.results().into_iter().map(|r| r.host).collect();
        assert_eq!(hosts, ["one", "two"]);
    }

    #[test]
    fn invalid_record_is_discarded_and_connection_survives() {
        let mut corrupt = wire("bad", 0);
        corrupt[100] ^= 0xFF;
        let mut s = session([
            Step::Data(corrupt),
            Step::Data(wire("good", 0)),
            Step::WouldBlock,
        ]);
        let mut sink = RecordingSink::new();

        assert_eq!(recv_data(&mut s, &mut sink, NOW), RecvState::Open);
        let results = sink.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].host, "good");
    }

    #[test]
    fn eof_closes() {
        let mut s = session([Step::Data(wire("a", 0)), Step::Eof]);
        let mut sink = RecordingSink::new();

        assert_eq!(recv_data(&mut s, &mut sink, NOW), RecvState::Closed);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn eof_mid_record_discards_partial() {
        let mut s = session([Step::Data(wire("a", 0)[..100].to_vec()), Step::Eof]);
        let mut sink = RecordingSink::new();

        assert_eq!(recv_data(&mut s, &mut sink, NOW), RecvState::Closed);
        assert!(sink.is_empty());
    }

    #[test]
    fn interrupted_is_retried() {
        let mut s = session([
            Step::Fail(io::ErrorKind::Interrupted),
            Step::Data(wire("a", 0)),
            Step::WouldBlock,
        ]);
        let mut sink = RecordingSink::new();

        assert_eq!(recv_data(&mut s, &mut sink, NOW), RecvState::Open);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn hard_error_closes() {
        let mut s = session([Step::Fail(io::ErrorKind::ConnectionReset)]);
        let mut sink = RecordingSink::new();
        assert_eq!(recv_data(&mut s, &mut sink, NOW), RecvState::Closed);
    }

    proptest! {
        /// However the byte stream is chopped up, every record comes out.
        #[test]
        fn arbitrary_chunking_reassembles(cuts in proptest::collection::vec(1usize..9000, 0..6)) {
            let mut stream = Vec::new();
            for i in 0..3u16 {
                stream.extend_from_slice(&wire(&format!("host-{i}"), i));
            }

            let mut steps = Vec::new();
            let mut rest = stream.as_slice();
            for cut in cuts {
                let cut = cut.min(rest.len());
                if cut == 0 {
                    break;
                }
                let (head, tail) = rest.split_at(cut);
                steps.push(Step::Data(head.to_vec()));
                rest = tail;
            }
            if !rest.is_empty() {
                steps.push(Step::Data(rest.to_vec()));
            }
            steps.push(Step::WouldBlock);

            let mut s = session(steps);
            let mut sink = RecordingSink::new();
            prop_assert_eq!(recv_data(&mut s, &mut sink, NOW), RecvState::Open);

            let hosts: Vec<String> = sink.results().into_iter().map(|r| r.host).collect();
            prop_assert_eq!(hosts, vec!["host-0", "host-1", "host-2"]);
        }
    }
}
