//! # Telegram CRC Validation
//!
//! DSMR telegrams come in two framing styles:
//!
//! - legacy telegrams end with `!\r\n` and carry no CRC,
//! - newer telegrams end with `!HHHH\r\n`, where `HHHH` is the CRC16 of
//!   everything from `/` through `!` as 4 ASCII hex digits.
//!
//! The style is decided only by looking at fixed offsets from the end of the
//! buffer. The checksum is CRC-16/ARC (polynomial 0x8005 reflected, initial
//! value 0), computed bit by bit.

use crate::constants::{CRC_DIGITS, CRC_TAIL_LEN, LEGACY_TAIL_LEN, TELEGRAM_END};
use crate::util::hex::parse_crc_digits;

/// Reflected form of the CRC-16/ARC polynomial 0x8005
const CRC16_POLY: u16 = 0xA001;

/// Framing style of a delimited telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramStyle {
    /// Ends with `!\r\n`.
    Legacy,
    /// Ends with `!HHHH\r\n`.
    CrcBearing,
}

/// CRC16 over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// Byte `distance` positions before the end of `telegram`.
fn from_end(telegram: &[u8], distance: usize) -> Option<u8> {
    telegram
        .len()
        .checked_sub(distance)
        .and_then(|index| telegram.get(index))
        .copied()
}

/// Determines the framing style, or `None` for a malformed buffer.
pub fn telegram_style(telegram: &[u8]) -> Option<TelegramStyle> {
    if from_end(telegram, LEGACY_TAIL_LEN) == Some(TELEGRAM_END) {
        Some(TelegramStyle::Legacy)
    } else if from_end(telegram, CRC_TAIL_LEN) == Some(TELEGRAM_END) {
        Some(TelegramStyle::CrcBearing)
    } else {
        None
    }
}

/// CRC16 of a telegram, for verification.
///
/// Returns 0 ("nothing to check") for legacy telegrams and for buffers that
/// are not telegrams at all. For CRC-bearing telegrams the checksum covers
/// the start of the telegram up to and including `!`.
pub fn compute(telegram: &[u8]) -> u16 {
    match telegram_style(telegram) {
        Some(TelegramStyle::CrcBearing) => {
            crc16(&telegram[..telegram.len() - (CRC_TAIL_LEN - 1)])
        }
        Some(TelegramStyle::Legacy) | None => 0,
    }
}

/// CRC transmitted in the tail of a CRC-bearing telegram.
pub fn embedded_crc(telegram: &[u8]) -> Option<u16> {
    if telegram_style(telegram) != Some(TelegramStyle::CrcBearing) {
        return None;
    }
    let start = telegram.len() - (CRC_TAIL_LEN - 1);
    parse_crc_digits(&telegram[start..start + CRC_DIGITS]).ok()
}

/// Whether the embedded CRC (if any) matches the telegram data.
///
/// Legacy telegrams always pass.
pub fn verify(telegram: &[u8]) -> bool {
    match telegram_style(telegram) {
        Some(TelegramStyle::Legacy) => true,
        Some(TelegramStyle::CrcBearing) => embedded_crc(telegram) == Some(compute(telegram)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex::format_crc;
    use proptest::prelude::*;

    fn seal(body: &[u8]) -> Vec<u8> {
        let mut telegram = body.to_vec();
        telegram.extend_from_slice(format_crc(crc16(body)).as_bytes());
        telegram.extend_from_slice(b"\r\n");
        telegram
    }

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0xBB3D);
        assert_eq!(crc16(b""), 0);
    }

    #[test]
    fn test_legacy_telegram() {
        let telegram = b"/ISK5MT174\r\n\r\n1-0:1.8.1(001234.567*kWh)\r\n!\r\n";
        assert_eq!(telegram_style(telegram), Some(TelegramStyle::Legacy));
        assert_eq!(compute(telegram), 0);
        assert_eq!(embedded_crc(telegram), None);
        assert!(verify(telegram));
    }

    #[test]
    fn test_crc_bearing_telegram() {
        let body = b"/ISK5\\2MT382-1000\r\n\r\n1-0:1.8.1(000123.456*kWh)\r\n!";
        let telegram = seal(body);
        assert_eq!(telegram_style(&telegram), Some(TelegramStyle::CrcBearing));
        assert_eq!(compute(&telegram), crc16(body));
        assert_eq!(embedded_crc(&telegram), Some(crc16(body)));
        assert!(verify(&telegram));
    }

    #[test]
    fn test_corrupted_crc_fails_verification() {
        let mut telegram = seal(b"/XMX5LGBBFFB231237741\r\n\r\n0-0:96.14.0(0002)\r\n!");
        let len = telegram.len();
        telegram[len - 6] = if telegram[len - 6] == b'0' { b'1' } else { b'0' };
        assert!(!verify(&telegram));
    }

    #[test]
    fn test_malformed_buffers() {
        assert_eq!(compute(b"/no terminator here\r\n"), 0);
        assert_eq!(telegram_style(b"/x"), None);
        assert_eq!(compute(b""), 0);
        assert!(!verify(b"garbage"));
    }

    proptest! {
        #[test]
        fn prop_legacy_always_zero(prefix in proptest::collection::vec(any::<u8>(), 0..64),
                                   tail in proptest::collection::vec(any::<u8>(), 2)) {
            let mut telegram = prefix;
            telegram.push(b'!');
            telegram.extend(tail);
            prop_assert_eq!(compute(&telegram), 0);
        }

        #[test]
        fn prop_single_byte_change_detected(body in proptest::collection::vec(0x20u8..0x7f, 1..128),
                                            index in any::<prop::sample::Index>(),
                                            delta in 1u8..=255) {
            let mut framed = vec![b'/'];
            framed.extend(body.iter().map(|&b| if b == b'!' { b'.' } else { b }));
            framed.push(b'!');
            let telegram = seal(&framed);

            // Leave the `!` itself alone so the style stays CRC-bearing
            let position = index.index(framed.len() - 1);
            let mut corrupted = telegram.clone();
            corrupted[position] = corrupted[position].wrapping_add(delta);

            prop_assert_ne!(compute(&corrupted), compute(&telegram));
        }
    }
}
