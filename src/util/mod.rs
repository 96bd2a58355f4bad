//! # Utility Modules
//!
//! Common helpers used throughout the p1-rs crate: hex encoding for CRC
//! digits and traffic dumps, and the append-only dump sink.

pub mod dump;
pub mod hex;

pub use dump::DumpSink;
pub use hex::{format_crc, format_hex_compact, parse_crc_digits, pretty_hex, HexError};
