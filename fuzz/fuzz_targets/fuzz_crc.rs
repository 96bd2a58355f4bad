#![no_main]

use libfuzzer_sys::fuzz_target;
use p1_rs::p1::crc;

fuzz_target!(|data: &[u8]| {
    // Offsets from the end must never run off the buffer
    let computed = crc::compute(data);
    let _ = crc::embedded_crc(data);

    if crc::telegram_style(data) == Some(crc::TelegramStyle::Legacy) {
        assert_eq!(computed, 0);
    }
    if crc::verify(data) && crc::telegram_style(data) == Some(crc::TelegramStyle::CrcBearing) {
        assert_eq!(crc::embedded_crc(data), Some(computed));
    }
});
