//! P1 / D0 Protocol Constants
//!
//! This module defines the byte-exact markers and timing constants used by the
//! DSMR P1 telegram framing and the IEC 62056-21 optical ("D0") handshake.

use std::time::Duration;

/// Telegram start marker
pub const TELEGRAM_START: u8 = b'/';

/// Telegram end marker, followed by either CR LF or a 4-digit CRC and CR LF
pub const TELEGRAM_END: u8 = b'!';

pub const CR: u8 = b'\r';
pub const LF: u8 = b'\n';

/// Start-of-text control byte preceding an IEC 62056-21 data block
pub const STX: u8 = 0x02;

/// End-of-text control byte
pub const ETX: u8 = 0x03;

/// Start-of-header control byte
pub const SOH: u8 = 0x01;

/// Positive acknowledgement control byte
pub const ACK: u8 = 0x06;

/// Tail length of a legacy telegram, counted from and including `!`
pub const LEGACY_TAIL_LEN: usize = 3;

/// Tail length of a CRC-bearing telegram, counted from and including `!`
pub const CRC_TAIL_LEN: usize = 7;

/// Number of ASCII hex digits carrying the telegram CRC
pub const CRC_DIGITS: usize = 4;

// ----------------------------------------------------------------------------
// Session defaults
// ----------------------------------------------------------------------------

/// Default telegram buffer capacity in bytes
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Default inter-character read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// P1 baseline baud rate (DSMR 4.0 and later)
pub const P1_BAUD_RATE: u32 = 115_200;

/// Fallback baud rate used by older DSMR meters
pub const P1_LEGACY_BAUD_RATE: u32 = 9600;

/// D0 sign-on baud rate
pub const D0_BAUD_RATE: u32 = 300;

// ----------------------------------------------------------------------------
// IEC 62056-21 handshake
// ----------------------------------------------------------------------------

/// Number of NUL bytes in the wake-up sequence
pub const D0_WAKE_UP_LEN: usize = 65;

/// Dead time after the wake-up sequence before the meter listens
pub const D0_SETTLE_TIME: Duration = Duration::from_millis(2700);

/// Sign-on request
pub const D0_SIGN_ON: &[u8] = b"/?!\r\n";

/// ACK + break sequence that completely signs off from the meter
pub const D0_SIGN_OFF: [u8; 6] = [ACK, SOH, b'B', b'0', ETX, b'q'];

/// Offset of the baud rate identifier in the identification line
pub const D0_BAUD_ID_OFFSET: usize = 4;

/// Offset of the optional protocol mode marker (`\`) in the identification line
pub const D0_MODE_MARKER_OFFSET: usize = 5;

/// Protocol mode marker selecting mode E
pub const D0_MODE_E_MARKER: u8 = b'\\';

/// Mode E protocol identifier for the binary HDLC variant
pub const D0_HDLC_PROTOCOL_ID: u8 = b'2';

/// Baud rate identifiers: (mode C/E digit, mode B letter, baud rate)
pub const D0_BAUD_TABLE: [(u8, u8, u32); 7] = [
    (b'0', b'A', 300),
    (b'1', b'B', 600),
    (b'2', b'C', 1200),
    (b'3', b'D', 2400),
    (b'4', b'E', 4800),
    (b'5', b'F', 9600),
    (b'6', b'G', 19200),
];
