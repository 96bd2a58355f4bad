//! The p1 module contains the byte-level telegram handling shared by the P1 and
//! D0 paths: the session buffer, the CRC16 check over both framing styles, and
//! the framer that finds telegram boundaries in a raw byte stream.

pub mod buffer;
pub mod crc;
pub mod framer;

pub use buffer::TelegramBuffer;
pub use crc::{compute, crc16, embedded_crc, telegram_style, verify, TelegramStyle};
pub use framer::TelegramFramer;
