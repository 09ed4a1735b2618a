//! Decoded results and the sink they are delivered to.
//!
//! The receiver does not know what happens to a check result after it is
//! validated; the embedding process does. [`ResultSink`] is that seam: the
//! daemon wires in a sink that feeds the monitoring core, tests wire in a
//! recorder and assert on what arrived.

use std::sync::{Arc, Mutex};

use vigil_proto::Pdu;

/// One validated passive check result, in host representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Host the check ran against.
    pub host: String,
    /// Service checked, or `None` for a host-level check.
    pub service: Option<String>,
    /// Check outcome code.
    pub return_code: u16,
    /// Human-readable check output.
    pub output: String,
    /// Seconds since the epoch when the check was produced.
    pub timestamp: u32,
}

impl CheckResult {
    /// Extracts the logical result from a validated PDU.
    #[must_use]
    pub fn from_pdu(pdu: &Pdu) -> Self {
        Self {
            host: pdu.host().into_owned(),
            service: pdu.service().map(std::borrow::Cow::into_owned),
            return_code: pdu.return_code(),
            output: pdu.output().into_owned(),
            timestamp: pdu.timestamp(),
        }
    }
}

/// Destination for validated check results.
///
/// Called from the poll loop, one result at a time, in arrival order per
/// connection. Implementations must not block for long; a slow sink stalls
/// every client.
pub trait ResultSink {
    /// Delivers one validated result.
    fn submit(&mut self, result: CheckResult);
}

/// Sink that appends every result to a shared vector.
///
/// Made for tests: the handle side stays with the test while the sink side
/// moves into the server thread.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    results: Arc<Mutex<Vec<CheckResult>>>,
}

impl RecordingSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything submitted so far.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the lock panicked.
    #[must_use]
    pub fn results(&self) -> Vec<CheckResult> {
        self.results.lock().unwrap().clone()
    }

    /// Number of results submitted so far.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the lock panicked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    /// Whether nothing has been submitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultSink for RecordingSink {
    fn submit(&mut self, result: CheckResult) {
        self.results.lock().unwrap().push(result);
    }
}
