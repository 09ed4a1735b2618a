//! Fuzzer for the sender's tab-delimited input format.
//!
//! The parser's contract is total: any byte soup in, some split of
//! parsed-vs-skipped out, no panic. Every record that does parse must pack
//! into a PDU without truncating the host to nothing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_proto::text;

fuzz_target!(|data: &[u8]| {
    let outcome = text::parse_records(data);
    for record in outcome.records {
        assert!(!record.host.is_empty());
        assert!(record.return_code <= 3);
        let pdu = record.into_pdu(0);
        assert!(!pdu.host().is_empty());
    }
});
