//! # D0 Handshake
//!
//! Drives a [`SerialTransport`] through the IEC 62056-21 readout sequence:
//!
//! ```text
//! Idle -> Awake -> SignedOn -> Identified -> Negotiated -> Receiving -> Captured
//! ```
//!
//! Each state is a type and each transition consumes the handshake and returns
//! the next state, so an acknowledgement can only be sent once the mode has
//! been negotiated and capture only starts after the baud switch. Any failure
//! aborts the whole readout; retrying is up to the caller.

use super::{negotiate, BodyBytePolicy, Mode, Negotiation};
use crate::constants::{
    D0_SETTLE_TIME, D0_SIGN_OFF, D0_SIGN_ON, D0_WAKE_UP_LEN, LF, TELEGRAM_END, TELEGRAM_START,
};
use crate::error::P1Error;
use crate::p1::buffer::TelegramBuffer;
use crate::transport::SerialTransport;
use crate::util::hex::format_hex_compact;
use log::{debug, error, info, warn};

/// Fresh handshake, nothing sent yet.
#[derive(Debug)]
pub struct Idle;

/// Wake-up sequence sent and settle time elapsed.
#[derive(Debug)]
pub struct Awake;

/// Sign-on request sent.
#[derive(Debug)]
pub struct SignedOn;

/// Identification line received into the buffer.
#[derive(Debug)]
pub struct Identified {
    len: usize,
}

/// Mode and baud rate decided.
#[derive(Debug)]
pub struct Negotiated {
    negotiation: Negotiation,
}

/// Ready to capture telegram bytes into the buffer.
#[derive(Debug)]
pub struct Receiving {
    mode: Option<Mode>,
}

/// Telegram bytes captured.
#[derive(Debug)]
pub struct Captured {
    mode: Option<Mode>,
    complete: bool,
}

/// Result of one readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct D0Capture {
    /// Negotiated mode; `None` when the source is not a terminal and no
    /// handshake took place.
    pub mode: Option<Mode>,
    /// Telegram length in the buffer, identification line included.
    pub len: usize,
    /// Whether the terminating `!` was received.
    pub complete: bool,
}

/// Handshake in state `S` over a borrowed transport and buffer.
pub struct Handshake<'a, T: ?Sized, S> {
    transport: &'a mut T,
    buffer: &'a mut TelegramBuffer,
    state: S,
}

impl<'a, T: ?Sized, S> Handshake<'a, T, S> {
    fn next<N>(self, state: N) -> Handshake<'a, T, N> {
        Handshake {
            transport: self.transport,
            buffer: self.buffer,
            state,
        }
    }
}

impl<'a, T: SerialTransport + ?Sized> Handshake<'a, T, Idle> {
    pub fn new(transport: &'a mut T, buffer: &'a mut TelegramBuffer) -> Self {
        buffer.clear();
        Handshake {
            transport,
            buffer,
            state: Idle,
        }
    }

    /// Sends 65 NUL bytes, drains, and waits 2.7 s for the meter to listen.
    pub async fn wake_up(self) -> Result<Handshake<'a, T, Awake>, P1Error> {
        for count in 0..D0_WAKE_UP_LEN {
            match self.transport.write(&[0]).await {
                Ok(1) => {}
                Ok(_) => {
                    warn!("Unable to send wake-up sequence: write stalled at byte {count}");
                    return Err(P1Error::WakeUp(format!("write stalled at byte {count}")));
                }
                Err(e) => {
                    warn!("Unable to send wake-up sequence: {e}");
                    return Err(P1Error::WakeUp(e.to_string()));
                }
            }
        }
        self.transport.drain().await?;
        tokio::time::sleep(D0_SETTLE_TIME).await;
        debug!("Wake-up sequence sent");
        Ok(self.next(Awake))
    }
}

impl<'a, T: SerialTransport + ?Sized> Handshake<'a, T, Awake> {
    /// Sends the `/?!\r\n` request.
    pub async fn sign_on(self) -> Result<Handshake<'a, T, SignedOn>, P1Error> {
        let written = match self.transport.write(D0_SIGN_ON).await {
            Ok(written) => written,
            Err(e) => {
                warn!("Unable to send sign-on sequence: {e}");
                0
            }
        };
        if written < D0_SIGN_ON.len() {
            warn!("Unable to send sign-on sequence.");
            return Err(P1Error::SignOn {
                written,
                expected: D0_SIGN_ON.len(),
            });
        }
        self.transport.drain().await?;
        debug!("Sign-on request sent");
        Ok(self.next(SignedOn))
    }
}

impl<'a, T: SerialTransport + ?Sized> Handshake<'a, T, SignedOn> {
    /// Reads the identification line (`/` through `\n`) into the buffer.
    pub async fn read_identification(self) -> Result<Handshake<'a, T, Identified>, P1Error> {
        self.buffer.clear();

        match self.transport.read_byte().await {
            Ok(Some(TELEGRAM_START)) => {
                self.buffer.push(TELEGRAM_START);
            }
            Ok(_) => {
                error!("Did not receive a valid meter ID string.");
                return Err(P1Error::NoIdentification);
            }
            Err(e) => {
                error!("reading meter ID string: {e}");
                return Err(P1Error::IdentificationRead(e.to_string()));
            }
        }

        while !self.buffer.is_full() {
            match self.transport.read_byte().await {
                Ok(Some(byte)) => {
                    self.buffer.push(byte);
                    if byte == LF {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("reading meter ID string: {e}");
                    return Err(P1Error::IdentificationRead(e.to_string()));
                }
            }
        }

        let len = self.buffer.len();
        info!(
            "Meter ID string received: {}",
            String::from_utf8_lossy(self.buffer.as_slice()).trim_end()
        );
        Ok(self.next(Identified { len }))
    }
}

impl<'a, T: SerialTransport + ?Sized> Handshake<'a, T, Identified> {
    /// Decides mode and baud rate from the identification line.
    pub fn negotiate(self) -> Result<Handshake<'a, T, Negotiated>, P1Error> {
        let line = self
            .buffer
            .as_slice()
            .get(..self.state.len)
            .unwrap_or_default();
        let negotiation = negotiate(line).map_err(|e| {
            error!("{e}");
            e
        })?;
        info!(
            "Meter detected or assumed to use mode {}",
            negotiation.mode
        );
        Ok(self.next(Negotiated { negotiation }))
    }
}

impl<'a, T: SerialTransport + ?Sized> Handshake<'a, T, Negotiated> {
    pub fn negotiation(&self) -> Negotiation {
        self.state.negotiation
    }

    /// Acknowledges (modes C and E) and switches the baud rate when announced.
    ///
    /// Switching flushes pending input received at the old rate.
    pub async fn acknowledge(self) -> Result<Handshake<'a, T, Receiving>, P1Error> {
        let negotiation = self.state.negotiation;

        if negotiation.sends_ack() {
            let ack = negotiation.ack_sequence();
            debug!("Sending ACK {}", format_hex_compact(&ack));
            self.transport.write(&ack).await?;
            self.transport.drain().await?;
        }

        if let Some(baud_rate) = negotiation.baud_rate {
            debug!("Switching to {baud_rate} baud");
            let config = self.transport.config().with_baud_rate(baud_rate);
            self.transport.apply(config)?;
        }

        Ok(self.next(Receiving {
            mode: Some(negotiation.mode),
        }))
    }
}

impl<'a, T: SerialTransport + ?Sized> Handshake<'a, T, Receiving> {
    /// Starts capturing without any handshake, for sources that are not
    /// terminals (captured traffic replayed from a file).
    pub fn passive(transport: &'a mut T, buffer: &'a mut TelegramBuffer) -> Self {
        buffer.clear();
        Handshake {
            transport,
            buffer,
            state: Receiving { mode: None },
        }
    }

    /// Reads telegram bytes until `!`.
    ///
    /// Fails on a byte `policy` rejects or when the buffer fills up. Running
    /// out of input or a read error ends the capture as incomplete.
    pub async fn capture(
        self,
        policy: BodyBytePolicy,
    ) -> Result<Handshake<'a, T, Captured>, P1Error> {
        if self.buffer.remaining() < 2 {
            error!("Buffer too small to hold telegram");
            return Err(P1Error::BufferTooSmall);
        }

        let mut complete = false;
        loop {
            if self.buffer.is_full() {
                error!("Buffer too small to hold telegram");
                return Err(P1Error::BufferTooSmall);
            }

            match self.transport.read_byte().await {
                Ok(Some(TELEGRAM_END)) => {
                    self.buffer.push(TELEGRAM_END);
                    debug!("Telegram terminator found at offset {}", self.buffer.len() - 1);
                    complete = true;
                    break;
                }
                Ok(Some(byte)) if policy.accepts(byte) => {
                    self.buffer.push(byte);
                }
                Ok(Some(byte)) => {
                    error!("Non-printable bytes in telegram, aborting parser");
                    return Err(P1Error::NonPrintableByte(byte));
                }
                Ok(None) => {
                    warn!("No bytes received when reading telegram data");
                    break;
                }
                Err(e) => {
                    error!("reading telegram data: {e}");
                    break;
                }
            }
        }

        let mode = self.state.mode;
        Ok(self.next(Captured { mode, complete }))
    }
}

impl<'a, T: SerialTransport + ?Sized> Handshake<'a, T, Captured> {
    /// Signs off after a complete readout from a terminal.
    pub async fn sign_off(self) -> Result<D0Capture, P1Error> {
        let Captured { mode, complete } = self.state;

        if complete && self.transport.is_terminal() && mode != Some(Mode::Probe) {
            debug!("Signing off");
            self.transport.write(&D0_SIGN_OFF).await?;
            self.transport.drain().await?;
        }

        Ok(D0Capture {
            mode,
            len: self.buffer.len(),
            complete,
        })
    }
}

/// Runs one complete readout per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct D0HandshakeEngine {
    policy: BodyBytePolicy,
}

impl D0HandshakeEngine {
    pub fn new(policy: BodyBytePolicy) -> Self {
        D0HandshakeEngine { policy }
    }

    /// Wakes the meter, negotiates, and captures one telegram into `buffer`.
    ///
    /// Sources that are not terminals skip straight to capture.
    pub async fn run<T>(&self, transport: &mut T, buffer: &mut TelegramBuffer) -> Result<D0Capture, P1Error>
    where
        T: SerialTransport + ?Sized,
    {
        let receiving = if transport.is_terminal() {
            Handshake::new(transport, buffer)
                .wake_up()
                .await?
                .sign_on()
                .await?
                .read_identification()
                .await?
                .negotiate()?
                .acknowledge()
                .await?
        } else {
            Handshake::passive(transport, buffer)
        };

        receiving.capture(self.policy).await?.sign_off().await
    }
}
