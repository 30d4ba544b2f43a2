//! Decoding arbitrary bytes as either frame kind must never panic, and any
//! frame that decodes must re-encode to the same bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use stsafe_proto::{CommandFrame, ResponseFrame};

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = CommandFrame::decode(data) {
        let mut wire = Vec::new();
        frame.encode(&mut wire);
        assert_eq!(wire, data);
    }

    if let Ok(frame) = ResponseFrame::decode(data) {
        let mut wire = Vec::new();
        frame.encode(&mut wire);
        assert_eq!(wire, data);
    }
});
