//! # Serial Device Transport
//!
//! This module opens the input path, probes whether it is a real serial
//! terminal, and drives it through `tokio-serial`. Paths that are not
//! terminals (captured traffic in a plain file) are read as files instead.
//!
//! On Unix the terminal attributes found at open time are kept so that
//! [`SerialTransport::restore`] can hand the port back unchanged.

use super::{SerialTransport, TransportConfig};
use crate::error::P1Error;
use log::debug;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

enum Channel {
    Terminal(SerialStream),
    File(tokio::fs::File),
}

#[cfg(unix)]
struct SavedTermios {
    fd: std::fs::File,
    termios: nix::sys::termios::Termios,
}

/// Transport over a device node or file.
pub struct SerialDevice {
    path: String,
    channel: Channel,
    config: TransportConfig,
    #[cfg(unix)]
    saved: Option<SavedTermios>,
}

impl std::fmt::Debug for SerialDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialDevice")
            .field("path", &self.path)
            .field("terminal", &self.is_terminal())
            .field("config", &self.config)
            .finish()
    }
}

fn open_error(path: &str, e: impl ToString) -> P1Error {
    P1Error::DeviceOpen {
        path: path.to_string(),
        reason: e.to_string(),
    }
}

fn open_stream(path: &str, config: &TransportConfig) -> Result<SerialStream, P1Error> {
    let stream = tokio_serial::new(path, config.baud_rate)
        .data_bits(config.data_bits)
        .parity(config.parity)
        .stop_bits(config.stop_bits)
        .flow_control(config.flow_control)
        .timeout(config.timeout)
        .open_native_async()
        .map_err(|e| open_error(path, e))?;

    // Drop anything received before we took over the port
    stream.clear(ClearBuffer::Input)?;
    Ok(stream)
}

impl SerialDevice {
    /// Opens `path`, probing whether it is a serial terminal.
    ///
    /// Terminals are configured with `config` right away; plain files keep
    /// `config` only as bookkeeping.
    #[cfg(unix)]
    pub async fn open(path: &str, config: TransportConfig) -> Result<Self, P1Error> {
        use nix::fcntl::OFlag;
        use std::os::unix::fs::OpenOptionsExt;

        // Make sure a serial device doesn't become the controlling TTY
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NOCTTY.bits())
            .open(path)
            .map_err(|e| open_error(path, e))?;

        match nix::sys::termios::tcgetattr(&file) {
            Ok(termios) => {
                debug!("Input device {path} seems to be a serial terminal");
                let stream = open_stream(path, &config)?;
                Ok(SerialDevice {
                    path: path.to_string(),
                    channel: Channel::Terminal(stream),
                    config,
                    saved: Some(SavedTermios { fd: file, termios }),
                })
            }
            Err(errno) => {
                debug!("Input {path} is not a terminal ({errno}), reading it as a file");
                Ok(SerialDevice {
                    path: path.to_string(),
                    channel: Channel::File(tokio::fs::File::from_std(file)),
                    config,
                    saved: None,
                })
            }
        }
    }

    /// Opens `path`, probing whether it is a serial port.
    #[cfg(not(unix))]
    pub async fn open(path: &str, config: TransportConfig) -> Result<Self, P1Error> {
        match open_stream(path, &config) {
            Ok(stream) => Ok(SerialDevice {
                path: path.to_string(),
                channel: Channel::Terminal(stream),
                config,
            }),
            Err(serial_err) => {
                debug!("Input {path} is not a serial port ({serial_err}), reading it as a file");
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| open_error(path, e))?;
                Ok(SerialDevice {
                    path: path.to_string(),
                    channel: Channel::File(file),
                    config,
                })
            }
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait::async_trait]
impl SerialTransport for SerialDevice {
    fn is_terminal(&self) -> bool {
        matches!(self.channel, Channel::Terminal(_))
    }

    fn config(&self) -> TransportConfig {
        self.config
    }

    fn apply(&mut self, config: TransportConfig) -> Result<(), P1Error> {
        if let Channel::Terminal(stream) = &mut self.channel {
            // Data framed under the old settings would only confuse the parsers
            stream.clear(ClearBuffer::Input)?;
            stream.set_baud_rate(config.baud_rate)?;
            stream.set_data_bits(config.data_bits)?;
            stream.set_parity(config.parity)?;
            stream.set_stop_bits(config.stop_bits)?;
            stream.set_flow_control(config.flow_control)?;
            stream.set_timeout(config.timeout)?;
            debug!(
                "{}: {} baud, timeout {} ds",
                self.path,
                config.baud_rate,
                config.vtime_deciseconds()
            );
        }
        self.config = config;
        Ok(())
    }

    #[cfg(unix)]
    fn restore(&mut self) -> Result<(), P1Error> {
        use nix::sys::termios::{tcsetattr, SetArg};

        match &self.saved {
            Some(saved) => tcsetattr(&saved.fd, SetArg::TCSANOW, &saved.termios)
                .map_err(|e| P1Error::Transport(format!("restoring port settings: {e}"))),
            None => Ok(()),
        }
    }

    #[cfg(not(unix))]
    fn restore(&mut self) -> Result<(), P1Error> {
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<Option<u8>, P1Error> {
        let mut byte = [0u8; 1];
        let result = match &mut self.channel {
            Channel::Terminal(stream) => {
                match tokio::time::timeout(self.config.timeout, stream.read(&mut byte)).await {
                    Ok(result) => result,
                    Err(_elapsed) => return Ok(None),
                }
            }
            Channel::File(file) => file.read(&mut byte).await,
        };

        match result {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<usize, P1Error> {
        let written = match &mut self.channel {
            Channel::Terminal(stream) => stream.write(bytes).await?,
            Channel::File(file) => file.write(bytes).await?,
        };
        Ok(written)
    }

    async fn drain(&mut self) -> Result<(), P1Error> {
        // For a tty, flush waits for the output queue to empty (tcdrain)
        match &mut self.channel {
            Channel::Terminal(stream) => stream.flush().await?,
            Channel::File(file) => file.flush().await?,
        }
        Ok(())
    }
}
