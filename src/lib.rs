//! # p1-rs - A Rust Crate for Reading Smart-Meter Telegrams
//!
//! The p1-rs crate reads telegrams from the serial interfaces of smart meters:
//! the always-on DSMR "P1" port, and the optical IEC 62056-21 "D0" port that
//! needs a wake-up and handshake before the meter transmits.
//!
//! ## Features
//!
//! - Find telegram boundaries in a raw byte stream and resynchronise after line noise
//! - Verify the CRC16 of telegrams that carry one, accept legacy telegrams without
//! - Negotiate protocol mode and baud rate with D0 meters (modes A, B, C and E)
//! - Fall back to 9600 baud for older P1 meters
//! - Parse telegram contents into OBIS records with a pluggable grammar
//! - Replay captured traffic from plain files
//! - Support for logging and error handling
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! p1-rs = "1.0.0"
//! ```
//!
//! ```no_run
//! use p1_rs::{ParserSession, SessionConfig};
//!
//! # async fn example() -> Result<(), p1_rs::P1Error> {
//! let mut session = ParserSession::open("/dev/ttyUSB0", SessionConfig::default()).await?;
//! if session.read().await? > 0 {
//!     if let Some(telegram) = session.parsed() {
//!         println!("{} records", telegram.records.len());
//!     }
//! }
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod d0;
pub mod error;
pub mod grammar;
pub mod logging;
pub mod p1;
pub mod session;
pub mod transport;
pub mod util;

pub use crate::error::{ErrorClass, P1Error};
pub use crate::logging::{init_logger, log_info};

// Core types
pub use d0::{BodyBytePolicy, D0Capture, D0HandshakeEngine, Mode, Negotiation};
pub use grammar::{
    ObisGrammar, ObisRecord, ObisValue, ParseOutcome, ParseStatus, ParsedTelegram,
    TelegramGrammar,
};
pub use p1::{TelegramBuffer, TelegramFramer};
pub use session::{ParserSession, SessionConfig};
pub use transport::{MockTransport, SerialDevice, SerialTransport, TransportConfig};

/// Open a P1 session with default settings.
///
/// # Arguments
/// * `path` - Serial device (e.g., "/dev/ttyUSB0") or a file with captured traffic
///
/// # Returns
/// * `Ok(ParserSession)` - Session ready for reading
/// * `Err(P1Error)` - The device could not be opened or configured
pub async fn open(path: &str) -> Result<ParserSession, P1Error> {
    ParserSession::open(path, SessionConfig::default()).await
}

/// Open a D0 session with default settings.
///
/// # Arguments
/// * `path` - Serial device of the optical probe, or a file with captured traffic
///
/// # Returns
/// * `Ok(ParserSession)` - Session ready for reading
/// * `Err(P1Error)` - The device could not be opened or configured
pub async fn open_d0(path: &str) -> Result<ParserSession, P1Error> {
    ParserSession::open_d0(path, SessionConfig::default()).await
}

/// Read the next telegram from a session.
///
/// # Returns
/// * `Ok(Some(ParsedTelegram))` - A telegram was read and its header parsed
/// * `Ok(None)` - No telegram arrived before the source ran dry
/// * `Err(P1Error)` - Handshake, transport or CRC failure
pub async fn read(session: &mut ParserSession) -> Result<Option<ParsedTelegram>, P1Error> {
    if session.read().await? == 0 {
        return Ok(None);
    }
    Ok(session.parsed().cloned())
}

/// Close a session, restoring the serial port settings.
pub fn close(session: &mut ParserSession) -> Result<(), P1Error> {
    session.close()
}
