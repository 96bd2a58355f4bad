#![no_main]

use libfuzzer_sys::fuzz_target;
use p1_rs::d0::{negotiate, Mode};

fuzz_target!(|data: &[u8]| {
    if let Ok(negotiation) = negotiate(data) {
        assert!(data.starts_with(b"/") && data.ends_with(b"\r\n"));
        match negotiation.mode {
            Mode::A => assert!(negotiation.baud_rate.is_none()),
            _ => assert!(negotiation.baud_rate.is_some()),
        }
    }
});
