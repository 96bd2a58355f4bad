//! # Hex Utilities
//!
//! Hex helpers for the ASCII-encoded telegram CRC and for dumping raw
//! serial traffic in logs.

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Expected {expected} hex digits, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Decode the 4 ASCII hex digits of a telegram CRC (`"EF2F"` -> `0xEF2F`).
///
/// Upper and lower case digits are accepted.
pub fn parse_crc_digits(digits: &[u8]) -> Result<u16, HexError> {
    if digits.len() != 4 {
        return Err(HexError::WrongLength {
            expected: 4,
            actual: digits.len(),
        });
    }

    let mut raw = [0u8; 2];
    hex::decode_to_slice(digits, &mut raw).map_err(|e| HexError::DecodeError(e.to_string()))?;
    Ok(u16::from_be_bytes(raw))
}

/// Encode a CRC the way meters transmit it: 4 upper case hex digits.
pub fn format_crc(crc: u16) -> String {
    hex::encode_upper(crc.to_be_bytes())
}

/// Pretty-print hex data with offsets and an ASCII column
pub fn pretty_hex(data: &[u8], bytes_per_line: usize) -> String {
    if data.is_empty() || bytes_per_line == 0 {
        return String::new();
    }

    data.chunks(bytes_per_line)
        .enumerate()
        .map(|(i, chunk)| {
            let hex = format_hex_compact(chunk);
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!(
                "{:04x}: {:<width$} |{}|",
                i * bytes_per_line,
                hex,
                ascii,
                width = bytes_per_line * 3 - 1
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format hex data for compact display (useful for logs)
///
/// Formats data as "06 30 35 30" with spaces between bytes.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
