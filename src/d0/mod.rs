//! The d0 module implements the IEC 62056-21 optical interface: deciding the
//! protocol mode and baud rate from the meter identification line, and the
//! handshake that wakes the meter up and captures its telegram.

pub mod handshake;

pub use handshake::{D0Capture, D0HandshakeEngine, Handshake};

use crate::constants::{
    ACK, CR, D0_BAUD_ID_OFFSET, D0_BAUD_TABLE, D0_HDLC_PROTOCOL_ID, D0_MODE_E_MARKER,
    D0_MODE_MARKER_OFFSET, LF, STX, TELEGRAM_END, TELEGRAM_START,
};
use crate::error::P1Error;
use serde::Serialize;
use std::fmt;

/// Transmission mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Mode {
    /// Direct P1 reading, no handshake. May alternate baud rates.
    Probe,
    /// Fixed baud rate, no baud switch.
    A,
    /// Baud switch without acknowledgement.
    B,
    /// Baud switch after acknowledgement.
    C,
    /// Never negotiated: mode D meters look like mode C and are treated as such.
    D,
    /// Like mode C, with the protocol marker `\` in the identification line.
    E,
}

impl Mode {
    pub fn letter(self) -> char {
        match self {
            Mode::Probe => 'P',
            Mode::A => 'A',
            Mode::B => 'B',
            Mode::C => 'C',
            Mode::D => 'D',
            Mode::E => 'E',
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Outcome of inspecting an identification line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    pub mode: Mode,
    /// Baud rate identifier at offset 4 of the identification line.
    pub baud_id: u8,
    /// Baud rate to switch to; `None` keeps the current rate.
    pub baud_rate: Option<u32>,
}

impl Negotiation {
    /// Modes C and E only transmit after an acknowledgement.
    pub fn sends_ack(&self) -> bool {
        matches!(self.mode, Mode::C | Mode::E)
    }

    /// Acknowledgement selecting data readout at the announced baud rate.
    pub fn ack_sequence(&self) -> [u8; 6] {
        [ACK, b'0', self.baud_id, b'0', CR, LF]
    }
}

fn invalid_identification(line: &[u8]) -> P1Error {
    P1Error::InvalidIdentification(String::from_utf8_lossy(line).into_owned())
}

/// Decides mode and baud rate from a complete identification line.
///
/// | offset 4       | mode                                   | baud       |
/// |----------------|----------------------------------------|------------|
/// | `0`..`6`       | C; E with `\`; rejected with `\2` (HDLC) | 300..19200 |
/// | `A`..`G`       | B                                      | 300..19200 |
/// | other printable| A                                      | unchanged  |
///
/// Mode E with protocol identifier `2` (binary HDLC) is rejected.
pub fn negotiate(line: &[u8]) -> Result<Negotiation, P1Error> {
    if line.first() != Some(&TELEGRAM_START) || !line.ends_with(&[CR, LF]) {
        return Err(invalid_identification(line));
    }

    let baud_id = line
        .get(D0_BAUD_ID_OFFSET)
        .copied()
        .ok_or_else(|| invalid_identification(line))?;

    if let Some(&(_, _, baud)) = D0_BAUD_TABLE.iter().find(|(digit, _, _)| *digit == baud_id) {
        let mode = if line.get(D0_MODE_MARKER_OFFSET) == Some(&D0_MODE_E_MARKER) {
            if line.get(D0_MODE_MARKER_OFFSET + 1) == Some(&D0_HDLC_PROTOCOL_ID) {
                return Err(P1Error::UnsupportedBinaryProtocol);
            }
            Mode::E
        } else {
            Mode::C
        };
        return Ok(Negotiation {
            mode,
            baud_id,
            baud_rate: Some(baud),
        });
    }

    if let Some(&(_, _, baud)) = D0_BAUD_TABLE.iter().find(|(_, letter, _)| *letter == baud_id) {
        return Ok(Negotiation {
            mode: Mode::B,
            baud_id,
            baud_rate: Some(baud),
        });
    }

    if (0x20..=0x7e).contains(&baud_id) && baud_id != TELEGRAM_START && baud_id != TELEGRAM_END {
        return Ok(Negotiation {
            mode: Mode::A,
            baud_id,
            baud_rate: None,
        });
    }

    Err(invalid_identification(line))
}

/// Bytes accepted in a D0 telegram body besides the terminating `!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyBytePolicy {
    /// 0x20..=0x7e only.
    Printable,
    /// Printable bytes plus CR, LF and STX, as found in IEC 62056-21 data blocks.
    #[default]
    PrintableAndLineControl,
}

impl BodyBytePolicy {
    pub fn accepts(self, byte: u8) -> bool {
        let printable = (0x20..=0x7e).contains(&byte);
        match self {
            BodyBytePolicy::Printable => printable,
            BodyBytePolicy::PrintableAndLineControl => {
                printable || matches!(byte, CR | LF | STX)
            }
        }
    }
}
