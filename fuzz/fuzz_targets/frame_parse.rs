//! Robustness fuzzer for frame parsing.
//!
//! Frame parsers run on decrypted radio bytes. They must reject or accept
//! without panicking for every input size and content, and an accepted
//! frame must re-serialize to the bytes it was parsed from.

#![no_main]

use hauslink_proto::{AckFrame, PayloadFrame};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: &[u8]| {
    if let Ok(frame) = PayloadFrame::from_bytes(input) {
        let bytes = frame.to_bytes();
        assert_eq!(&bytes[..input.len()], input, "accepted payload frames re-serialize");
        assert!(frame.wire_len() <= PayloadFrame::SIZE);
    }

    if let Ok(ack) = AckFrame::from_bytes(input) {
        assert_eq!(ack.to_bytes().as_slice(), input, "accepted ack frames re-serialize");
    }
});
