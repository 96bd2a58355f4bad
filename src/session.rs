//! # Parser Session
//!
//! A [`ParserSession`] owns one transport, one telegram buffer and one grammar,
//! and turns each call to [`ParserSession::read`] into at most one telegram.
//!
//! - P1 sessions run the [`TelegramFramer`] over the byte stream, check the
//!   CRC and hand the telegram to the grammar. When a terminal yields nothing
//!   the baud rate alternates between 115200 and 9600 for older meters.
//! - D0 sessions run a fresh [`D0HandshakeEngine`] readout on every call,
//!   since meters drop back to 300 baud after signing off.

use crate::constants::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_READ_TIMEOUT, P1_BAUD_RATE, P1_LEGACY_BAUD_RATE,
};
use crate::d0::{BodyBytePolicy, D0HandshakeEngine, Mode};
use crate::error::P1Error;
use crate::grammar::{ObisGrammar, ParseOutcome, ParsedTelegram, TelegramGrammar};
use crate::p1::{crc, TelegramBuffer, TelegramFramer};
use crate::transport::{SerialDevice, SerialTransport, TransportConfig};
use crate::util::dump::DumpSink;
use crate::util::hex::{format_crc, pretty_hex};
use log::{debug, error, info, log_enabled, trace, warn, Level};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for opening a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Telegram buffer size; 0 selects the default of 4096 bytes.
    pub buffer_capacity: usize,
    /// Inter-character timeout; zero selects the default of 10 s.
    pub timeout: Duration,
    /// Resync budget of the framer. `None` uses the buffer capacity,
    /// `Some(0)` never gives up.
    pub max_fail_bytes: Option<usize>,
    /// File receiving telegrams that parsed with errors.
    pub dump_path: Option<PathBuf>,
    /// Bytes accepted in a D0 telegram body.
    pub body_policy: BodyBytePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            timeout: DEFAULT_READ_TIMEOUT,
            max_fail_bytes: None,
            dump_path: None,
            body_policy: BodyBytePolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn buffer_capacity(&self) -> usize {
        if self.buffer_capacity == 0 {
            DEFAULT_BUFFER_CAPACITY
        } else {
            self.buffer_capacity
        }
    }

    pub fn timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_READ_TIMEOUT
        } else {
            self.timeout
        }
    }

    pub fn max_fail_bytes(&self) -> usize {
        self.max_fail_bytes.unwrap_or_else(|| self.buffer_capacity())
    }
}

/// Reads telegrams from one P1 or D0 source.
pub struct ParserSession<G: TelegramGrammar = ObisGrammar> {
    transport: Option<Box<dyn SerialTransport>>,
    buffer: TelegramBuffer,
    len: usize,
    /// `Some(Probe)` for P1; for D0 the last negotiated mode.
    mode: Option<Mode>,
    timeout: Duration,
    framer: TelegramFramer,
    engine: D0HandshakeEngine,
    grammar: G,
    outcome: ParseOutcome,
    computed_crc: u16,
    dump: Option<DumpSink>,
    closed: bool,
}

impl ParserSession<ObisGrammar> {
    /// Opens a P1 session on `path` with the default grammar.
    pub async fn open(path: &str, config: SessionConfig) -> Result<Self, P1Error> {
        Self::open_with_grammar(path, config, ObisGrammar::new()).await
    }

    /// Opens a D0 session on `path` with the default grammar.
    pub async fn open_d0(path: &str, config: SessionConfig) -> Result<Self, P1Error> {
        Self::open_d0_with_grammar(path, config, ObisGrammar::new()).await
    }

    /// Structured form of the last telegram, if its header parsed.
    pub fn parsed(&self) -> Option<&ParsedTelegram> {
        self.grammar.parsed()
    }
}

impl<G: TelegramGrammar> ParserSession<G> {
    pub async fn open_with_grammar(
        path: &str,
        config: SessionConfig,
        grammar: G,
    ) -> Result<Self, P1Error> {
        let device = SerialDevice::open(path, TransportConfig::p1(config.timeout())).await?;
        Self::with_transport(Box::new(device), config, grammar).await
    }

    pub async fn open_d0_with_grammar(
        path: &str,
        config: SessionConfig,
        grammar: G,
    ) -> Result<Self, P1Error> {
        let device = SerialDevice::open(path, TransportConfig::p1(config.timeout())).await?;
        Self::with_transport_d0(Box::new(device), config, grammar).await
    }

    /// Builds a P1 session over an already opened transport.
    ///
    /// Terminals are switched to the P1 baseline of 115200 baud 8N1.
    pub async fn with_transport(
        mut transport: Box<dyn SerialTransport>,
        config: SessionConfig,
        grammar: G,
    ) -> Result<Self, P1Error> {
        let timeout = config.timeout();

        if transport.is_terminal() {
            transport.apply(TransportConfig::p1(timeout))?;
        }

        let dump = match &config.dump_path {
            Some(path) => Some(DumpSink::open(path).await?),
            None => None,
        };

        let buffer = TelegramBuffer::with_capacity(config.buffer_capacity())?;

        Ok(ParserSession {
            transport: Some(transport),
            buffer,
            len: 0,
            mode: Some(Mode::Probe),
            timeout,
            framer: TelegramFramer::new(config.max_fail_bytes()),
            engine: D0HandshakeEngine::new(config.body_policy),
            grammar,
            outcome: ParseOutcome::default(),
            computed_crc: 0,
            dump,
            closed: false,
        })
    }

    /// Builds a D0 session: the P1 session setup followed by the D0 baseline
    /// of 300 baud 7E1.
    pub async fn with_transport_d0(
        transport: Box<dyn SerialTransport>,
        config: SessionConfig,
        grammar: G,
    ) -> Result<Self, P1Error> {
        let mut session = Self::with_transport(transport, config, grammar).await?;
        session.mode = None;

        let timeout = session.timeout;
        if let Some(transport) = session.transport.as_deref_mut() {
            if transport.is_terminal() {
                transport.apply(TransportConfig::d0(timeout))?;
            }
        }
        Ok(session)
    }

    /// Reads the next telegram and returns its length, 0 if none arrived.
    ///
    /// A CRC mismatch is reported as [`P1Error::CrcMismatch`]; the telegram
    /// and the parse outcome stay available through the accessors.
    pub async fn read(&mut self) -> Result<usize, P1Error> {
        if self.closed {
            return Err(P1Error::SessionClosed);
        }
        if self.buffer.capacity() == 0 {
            return Err(P1Error::NoBuffer);
        }
        if self.transport.is_none() {
            return Err(P1Error::NoTransport);
        }

        self.len = 0;
        self.outcome = ParseOutcome::default();
        self.computed_crc = 0;

        match self.mode {
            Some(Mode::Probe) => self.read_p1().await,
            _ => self.read_d0().await,
        }
    }

    async fn read_p1(&mut self) -> Result<usize, P1Error> {
        let transport = self.transport.as_deref_mut().ok_or(P1Error::NoTransport)?;

        self.len = self.framer.read_telegram(transport, &mut self.buffer).await;

        if self.len > 0 {
            self.parse_telegram().await;
            self.computed_crc = crc::compute(self.telegram());
            debug!(
                "Parsing finished with {:?}, data CRC 0x{}, telegram CRC 0x{}",
                self.outcome.status,
                format_crc(self.computed_crc),
                format_crc(self.outcome.crc.unwrap_or(0))
            );
        } else if transport.is_terminal() {
            // Maybe an old DSMR meter running at 9600 baud
            let current = transport.config();
            let next = if current.baud_rate == P1_BAUD_RATE {
                P1_LEGACY_BAUD_RATE
            } else {
                P1_BAUD_RATE
            };
            info!("No telegram at {} baud, switching to {next}", current.baud_rate);
            transport.apply(current.with_baud_rate(next))?;
        }

        match self.outcome.crc {
            Some(embedded) if embedded != 0 && embedded != self.computed_crc => {
                error!(
                    "data CRC 0x{} does not match telegram CRC 0x{}",
                    format_crc(self.computed_crc),
                    format_crc(embedded)
                );
                Err(P1Error::CrcMismatch {
                    computed: self.computed_crc,
                    embedded,
                })
            }
            _ => Ok(self.len),
        }
    }

    async fn read_d0(&mut self) -> Result<usize, P1Error> {
        let transport = self.transport.as_deref_mut().ok_or(P1Error::NoTransport)?;

        if transport.is_terminal() {
            let baseline = TransportConfig::d0(self.timeout);
            if transport.config() != baseline {
                debug!("Returning to {} baud for sign-on", baseline.baud_rate);
                transport.apply(baseline)?;
            }
        }

        let capture = self.engine.run(transport, &mut self.buffer).await?;
        if capture.mode.is_some() {
            self.mode = capture.mode;
        }
        self.len = capture.len;

        // Partial telegrams are parsed too
        self.parse_telegram().await;
        Ok(self.len)
    }

    async fn parse_telegram(&mut self) {
        let telegram = self.buffer.as_slice().get(..self.len).unwrap_or_default();

        self.grammar.init();
        self.grammar.execute(telegram, true);
        self.outcome = self.grammar.finish();

        if self.outcome.errors == 0 {
            return;
        }

        debug!("Parse errors: {}", self.outcome.errors);
        if log_enabled!(Level::Trace) {
            trace!("Telegram with parse errors:\n{}", pretty_hex(telegram, 16));
        }
        if let Some(dump) = self.dump.as_mut() {
            if let Err(e) = dump.append(telegram).await {
                warn!("Could not write to dump file {}: {e}", dump.path().display());
            }
        }
    }

    /// Releases the buffer and dump file and restores the transport settings.
    ///
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), P1Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.len = 0;
        self.buffer.release();
        self.dump = None;

        if let Some(mut transport) = self.transport.take() {
            if transport.is_terminal() {
                transport.restore()?;
            }
        }
        Ok(())
    }

    /// Last telegram read, empty when none.
    pub fn telegram(&self) -> &[u8] {
        self.buffer.as_slice().get(..self.len).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `Some(Mode::Probe)` for P1 sessions. D0 sessions report the mode of
    /// the last handshake, `None` before the first one or without a terminal.
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn outcome(&self) -> ParseOutcome {
        self.outcome
    }

    /// CRC computed over the last telegram, 0 for legacy telegrams.
    pub fn computed_crc(&self) -> u16 {
        self.computed_crc
    }

    pub fn grammar(&self) -> &G {
        &self.grammar
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_terminal(&self) -> bool {
        self.transport
            .as_deref()
            .map(|transport| transport.is_terminal())
            .unwrap_or(false)
    }

    /// Current transport settings, `None` once closed.
    pub fn transport_config(&self) -> Option<TransportConfig> {
        self.transport.as_deref().map(|transport| transport.config())
    }

    pub fn dump_path(&self) -> Option<&Path> {
        self.dump.as_ref().map(DumpSink::path)
    }
}

impl<G: TelegramGrammar> Drop for ParserSession<G> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Closing parser session: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig {
            buffer_capacity: 0,
            timeout: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert_eq!(config.buffer_capacity(), 4096);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.max_fail_bytes(), 4096);

        let config = SessionConfig {
            max_fail_bytes: Some(0),
            ..SessionConfig::default()
        };
        assert_eq!(config.max_fail_bytes(), 0);
    }

    #[tokio::test]
    async fn test_open_applies_p1_baseline() {
        let port = MockTransport::new();
        let session = ParserSession::with_transport(
            Box::new(port.clone()),
            SessionConfig::default(),
            ObisGrammar::new(),
        )
        .await
        .unwrap();

        assert_eq!(session.mode(), Some(Mode::Probe));
        assert_eq!(
            port.applied_configs(),
            vec![TransportConfig::p1(DEFAULT_READ_TIMEOUT)]
        );
    }

    #[tokio::test]
    async fn test_open_d0_applies_both_baselines() {
        let port = MockTransport::new();
        let session = ParserSession::with_transport_d0(
            Box::new(port.clone()),
            SessionConfig::default(),
            ObisGrammar::new(),
        )
        .await
        .unwrap();

        assert_eq!(session.mode(), None);
        let applied = port.applied_configs();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[1], TransportConfig::d0(DEFAULT_READ_TIMEOUT));
    }

    #[tokio::test]
    async fn test_file_source_is_not_configured() {
        let port = MockTransport::file();
        let _session = ParserSession::with_transport_d0(
            Box::new(port.clone()),
            SessionConfig::default(),
            ObisGrammar::new(),
        )
        .await
        .unwrap();
        assert!(port.applied_configs().is_empty());
    }

    #[tokio::test]
    async fn test_read_after_close() {
        let port = MockTransport::new();
        let mut session = ParserSession::with_transport(
            Box::new(port.clone()),
            SessionConfig::default(),
            ObisGrammar::new(),
        )
        .await
        .unwrap();

        session.close().unwrap();
        let err = session.read().await.unwrap_err();
        assert!(matches!(err, P1Error::SessionClosed));
        assert_eq!(err.code(), -1);
        assert_eq!(session.transport_config(), None);
    }
}
