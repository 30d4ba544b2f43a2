//! Typed request and query-response decoders on arbitrary payloads.

#![no_main]

use libfuzzer_sys::fuzz_target;
use stsafe_proto::{CommandFrame, Request, payloads};

fuzz_target!(|data: &[u8]| {
    let Some((&header, payload)) = data.split_first() else {
        return;
    };

    let Ok(command) = stsafe_proto::Command::try_from(header) else {
        return;
    };
    if let Ok(frame) = CommandFrame::new(command, payload.to_vec()) {
        if let Ok(request) = Request::from_frame(&frame) {
            let _ = request.to_frame();
        }
    }

    let _ = payloads::decode_host_key_slot(data);
    let _ = payloads::decode_envelope_key_table(data);
});
