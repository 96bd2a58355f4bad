//! # P1 Error Handling
//!
//! This module defines the P1Error enum, which represents the different error
//! types that can occur in the p1-rs crate. Every variant maps to a distinct
//! negative integer code through [`P1Error::code`].

use thiserror::Error;

/// Broad classification of a [`P1Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Session not usable, the caller must re-open.
    Configuration,
    /// Read or write failure on the serial channel.
    Transport,
    /// The meter violated the framing or handshake protocol.
    Protocol,
    /// Computed and embedded CRC disagree.
    Integrity,
}

/// Represents the different error types that can occur in the P1 crate.
#[derive(Debug, Error)]
pub enum P1Error {
    /// The session has been closed.
    #[error("Session is closed")]
    SessionClosed,

    /// The session owns no telegram buffer.
    #[error("No telegram buffer")]
    NoBuffer,

    /// The session owns no usable transport.
    #[error("No usable transport")]
    NoTransport,

    /// The input device or file could not be opened.
    #[error("Could not open input device {path}: {reason}")]
    DeviceOpen { path: String, reason: String },

    /// The dump file could not be opened.
    #[error("Could not open dump file {path}: {reason}")]
    DumpOpen { path: String, reason: String },

    /// The telegram buffer could not be allocated.
    #[error("Could not allocate {0} byte telegram buffer")]
    BufferAllocation(usize),

    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    Transport(String),

    /// The D0 wake-up sequence could not be written.
    #[error("Unable to send wake-up sequence: {0}")]
    WakeUp(String),

    /// The D0 sign-on request could not be written completely.
    #[error("Unable to send sign-on sequence ({written} of {expected} bytes)")]
    SignOn { written: usize, expected: usize },

    /// Reading the meter identification failed.
    #[error("Error reading meter ID string: {0}")]
    IdentificationRead(String),

    /// The meter did not answer with an identification line.
    #[error("Did not receive a valid meter ID string")]
    NoIdentification,

    /// The identification line is malformed.
    #[error("Invalid meter ID string: {0:?}")]
    InvalidIdentification(String),

    /// The telegram did not fit into the buffer.
    #[error("Buffer too small to hold telegram")]
    BufferTooSmall,

    /// The meter announced the binary HDLC variant of mode E.
    #[error("The IEC 62056-21 binary HDLC protocol is not supported")]
    UnsupportedBinaryProtocol,

    /// A byte outside the accepted range was found in the telegram body.
    #[error("Non-printable byte 0x{0:02X} in telegram")]
    NonPrintableByte(u8),

    /// Indicates a CRC mismatch between telegram data and the embedded CRC.
    #[error("Data CRC 0x{computed:04X} does not match telegram CRC 0x{embedded:04X}")]
    CrcMismatch { computed: u16, embedded: u16 },
}

impl P1Error {
    /// Distinct negative code per failure reason.
    pub fn code(&self) -> i32 {
        match self {
            P1Error::SessionClosed => -1,
            P1Error::NoBuffer => -2,
            P1Error::NoTransport => -3,
            P1Error::DeviceOpen { .. } => -4,
            P1Error::DumpOpen { .. } => -5,
            P1Error::BufferAllocation(_) => -6,
            P1Error::Transport(_) => -10,
            P1Error::WakeUp(_) => -11,
            P1Error::SignOn { .. } => -12,
            P1Error::IdentificationRead(_) => -13,
            P1Error::NoIdentification => -20,
            P1Error::InvalidIdentification(_) => -21,
            P1Error::BufferTooSmall => -22,
            P1Error::UnsupportedBinaryProtocol => -23,
            P1Error::NonPrintableByte(_) => -24,
            P1Error::CrcMismatch { .. } => -30,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            P1Error::SessionClosed
            | P1Error::NoBuffer
            | P1Error::NoTransport
            | P1Error::DeviceOpen { .. }
            | P1Error::DumpOpen { .. }
            | P1Error::BufferAllocation(_) => ErrorClass::Configuration,
            P1Error::Transport(_)
            | P1Error::WakeUp(_)
            | P1Error::SignOn { .. }
            | P1Error::IdentificationRead(_) => ErrorClass::Transport,
            P1Error::NoIdentification
            | P1Error::InvalidIdentification(_)
            | P1Error::BufferTooSmall
            | P1Error::UnsupportedBinaryProtocol
            | P1Error::NonPrintableByte(_) => ErrorClass::Protocol,
            P1Error::CrcMismatch { .. } => ErrorClass::Integrity,
        }
    }

    /// Whether retrying on the same session can succeed.
    pub fn is_recoverable(&self) -> bool {
        self.class() != ErrorClass::Configuration
    }
}

impl From<std::io::Error> for P1Error {
    fn from(e: std::io::Error) -> Self {
        P1Error::Transport(e.to_string())
    }
}

impl From<tokio_serial::Error> for P1Error {
    fn from(e: tokio_serial::Error) -> Self {
        P1Error::Transport(e.to_string())
    }
}
