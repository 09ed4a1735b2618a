//! Negative-space fuzzer for PDU decoding.
//!
//! Throws arbitrary bytes at `Pdu::unpack` and checks the only property a
//! validator owes hostile input: reject or accept, never panic. When the
//! input happens to decode, the accessors must also hold up.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_proto::Pdu;

const NOW: u32 = 1_700_000_000;

fuzz_target!(|data: &[u8]| {
    if let Ok(pdu) = Pdu::unpack(data, NOW) {
        // A record that validated must re-pack to the same bytes.
        let _ = pdu.host();
        let _ = pdu.service();
        let _ = pdu.output();
        assert_eq!(pdu.pack().as_slice(), data);
    }
});
