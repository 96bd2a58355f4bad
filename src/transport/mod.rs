//! The transport module abstracts the duplex byte channel telegrams arrive on:
//! a real serial terminal, a plain file holding captured traffic, or a mock
//! used in tests.

pub mod serial;
pub mod serial_mock;

pub use serial::SerialDevice;
pub use serial_mock::{MockEvent, MockTransport};

use crate::constants::{D0_BAUD_RATE, P1_BAUD_RATE};
use crate::error::P1Error;
use std::time::Duration;
use tokio_serial::{DataBits, FlowControl, Parity, StopBits};

/// Line settings pushed to a transport.
///
/// The channel is always used in raw (non-canonical, no echo) mode, and modem
/// control lines are ignored (`FlowControl::None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Inter-character timeout. An expired read yields no byte.
    pub timeout: Duration,
}

impl TransportConfig {
    /// P1 baseline: 115200 baud, 8N1.
    pub fn p1(timeout: Duration) -> Self {
        TransportConfig {
            baud_rate: P1_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout,
        }
    }

    /// D0 baseline: 300 baud, 7E1.
    pub fn d0(timeout: Duration) -> Self {
        TransportConfig {
            baud_rate: D0_BAUD_RATE,
            data_bits: DataBits::Seven,
            parity: Parity::Even,
            ..Self::p1(timeout)
        }
    }

    pub fn with_baud_rate(self, baud_rate: u32) -> Self {
        TransportConfig { baud_rate, ..self }
    }

    /// Timeout in tenths of a second, clamped to what termios `VTIME` holds.
    pub fn vtime_deciseconds(&self) -> u8 {
        let tenths = self.timeout.as_millis() / 100;
        u8::try_from(tenths).unwrap_or(u8::MAX)
    }
}

/// Duplex byte channel driven by the framer and the D0 handshake.
///
/// Implementations must treat an expired inter-character timeout as "no byte"
/// (`Ok(None)`), never as an error. End of file is reported the same way.
#[async_trait::async_trait]
pub trait SerialTransport: Send {
    /// Whether the channel is a real serial terminal (probed when opened).
    fn is_terminal(&self) -> bool;

    /// Settings currently in effect.
    fn config(&self) -> TransportConfig;

    /// Pushes new settings, discarding pending input received under the old ones.
    fn apply(&mut self, config: TransportConfig) -> Result<(), P1Error>;

    /// Returns the device to the settings it had before it was opened.
    fn restore(&mut self) -> Result<(), P1Error>;

    /// Reads a single byte, waiting at most the configured timeout.
    async fn read_byte(&mut self) -> Result<Option<u8>, P1Error>;

    /// Writes `bytes`, returning how many were accepted.
    async fn write(&mut self, bytes: &[u8]) -> Result<usize, P1Error>;

    /// Blocks until all written bytes have left the output queue.
    async fn drain(&mut self) -> Result<(), P1Error>;
}
