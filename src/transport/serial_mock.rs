//! Mock transport implementation for testing
//!
//! This module provides a mock serial channel that can be used to test
//! the framer, the D0 handshake and whole sessions without a meter attached.

use super::{SerialTransport, TransportConfig};
use crate::error::P1Error;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One call made on the mock, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Write(Vec<u8>),
    Drain,
    Apply(TransportConfig),
    Restore,
}

/// One scripted read result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxItem {
    Byte(u8),
    /// A single read that times out
    Gap,
    /// A single read that fails
    Error(io::ErrorKind),
}

fn rx_items(data: &[u8]) -> impl Iterator<Item = RxItem> + '_ {
    data.iter().copied().map(RxItem::Byte)
}

/// Mock serial channel that simulates bidirectional communication
///
/// Clones share all buffers, so a test can keep one clone for inspection
/// while a session owns another.
#[derive(Clone, Debug)]
pub struct MockTransport {
    /// Data written to the port (outgoing)
    pub tx_buffer: Arc<Mutex<Vec<u8>>>,
    /// Data to be read from the port (incoming), with scripted gaps and errors
    rx_buffer: Arc<Mutex<VecDeque<RxItem>>>,
    /// Segments moved into `rx_buffer` one per `apply`, after the flush
    staged_rx: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Every configuration pushed through `apply`, in order
    pub applied: Arc<Mutex<Vec<TransportConfig>>>,
    /// Number of `restore` calls
    pub restores: Arc<Mutex<usize>>,
    /// Error returned by the next write
    pub next_write_error: Arc<Mutex<Option<io::Error>>>,
    /// Error returned by the next read
    pub next_read_error: Arc<Mutex<Option<io::Error>>>,
    /// Maximum number of bytes accepted per write
    pub write_limit: Arc<Mutex<Option<usize>>>,
    /// Log of writes, drains, applies and restores
    pub events: Arc<Mutex<Vec<MockEvent>>>,
    config: Arc<Mutex<TransportConfig>>,
    terminal: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Mock behaving like a serial terminal.
    pub fn new() -> Self {
        MockTransport {
            tx_buffer: Arc::new(Mutex::new(Vec::new())),
            rx_buffer: Arc::new(Mutex::new(VecDeque::new())),
            staged_rx: Arc::new(Mutex::new(VecDeque::new())),
            applied: Arc::new(Mutex::new(Vec::new())),
            restores: Arc::new(Mutex::new(0)),
            next_write_error: Arc::new(Mutex::new(None)),
            next_read_error: Arc::new(Mutex::new(None)),
            write_limit: Arc::new(Mutex::new(None)),
            events: Arc::new(Mutex::new(Vec::new())),
            config: Arc::new(Mutex::new(TransportConfig::p1(Duration::from_secs(1)))),
            terminal: true,
        }
    }

    /// Mock behaving like a plain file.
    pub fn file() -> Self {
        MockTransport {
            terminal: false,
            ..Self::new()
        }
    }

    /// Queue data to be read from the port
    pub fn queue_rx_data(&self, data: &[u8]) {
        self.rx_buffer.lock().unwrap().extend(rx_items(data));
    }

    /// Queue one read that times out before the data queued after it
    pub fn queue_rx_gap(&self) {
        self.rx_buffer.lock().unwrap().push_back(RxItem::Gap);
    }

    /// Queue one read that fails with `kind` once the data before it is consumed
    pub fn queue_rx_error(&self, kind: io::ErrorKind) {
        self.rx_buffer.lock().unwrap().push_back(RxItem::Error(kind));
    }

    /// Stage data that only arrives after the next `apply`
    pub fn stage_rx_after_apply(&self, data: &[u8]) {
        self.staged_rx.lock().unwrap().push_back(data.to_vec());
    }

    /// Get data that was written to the port
    pub fn get_tx_data(&self) -> Vec<u8> {
        self.tx_buffer.lock().unwrap().clone()
    }

    /// Scripted reads still waiting, gaps and errors included
    pub fn pending_rx(&self) -> usize {
        self.rx_buffer.lock().unwrap().len()
    }

    pub fn applied_configs(&self) -> Vec<TransportConfig> {
        self.applied.lock().unwrap().clone()
    }

    pub fn restore_count(&self) -> usize {
        *self.restores.lock().unwrap()
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn set_next_write_error(&self, error: io::Error) {
        *self.next_write_error.lock().unwrap() = Some(error);
    }

    pub fn set_next_read_error(&self, error: io::Error) {
        *self.next_read_error.lock().unwrap() = Some(error);
    }

    pub fn set_write_limit(&self, limit: Option<usize>) {
        *self.write_limit.lock().unwrap() = limit;
    }

    /// Clear all buffers and recorded calls
    pub fn clear(&self) {
        self.tx_buffer.lock().unwrap().clear();
        self.rx_buffer.lock().unwrap().clear();
        self.staged_rx.lock().unwrap().clear();
        self.events.lock().unwrap().clear();
        self.applied.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl SerialTransport for MockTransport {
    fn is_terminal(&self) -> bool {
        self.terminal
    }

    fn config(&self) -> TransportConfig {
        *self.config.lock().unwrap()
    }

    fn apply(&mut self, config: TransportConfig) -> Result<(), P1Error> {
        *self.config.lock().unwrap() = config;
        self.applied.lock().unwrap().push(config);
        self.events.lock().unwrap().push(MockEvent::Apply(config));

        let mut rx = self.rx_buffer.lock().unwrap();
        rx.clear();
        if let Some(segment) = self.staged_rx.lock().unwrap().pop_front() {
            rx.extend(rx_items(&segment));
        }
        Ok(())
    }

    fn restore(&mut self) -> Result<(), P1Error> {
        *self.restores.lock().unwrap() += 1;
        self.events.lock().unwrap().push(MockEvent::Restore);
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<Option<u8>, P1Error> {
        if let Some(error) = self.next_read_error.lock().unwrap().take() {
            return Err(error.into());
        }
        // An empty queue behaves like an expired timeout
        match self.rx_buffer.lock().unwrap().pop_front() {
            Some(RxItem::Byte(byte)) => Ok(Some(byte)),
            Some(RxItem::Gap) | None => Ok(None),
            Some(RxItem::Error(kind)) => Err(io::Error::new(kind, "scripted read error").into()),
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<usize, P1Error> {
        if let Some(error) = self.next_write_error.lock().unwrap().take() {
            return Err(error.into());
        }

        let accepted = match *self.write_limit.lock().unwrap() {
            Some(limit) => bytes.len().min(limit),
            None => bytes.len(),
        };
        self.tx_buffer
            .lock()
            .unwrap()
            .extend_from_slice(&bytes[..accepted]);
        self.events
            .lock()
            .unwrap()
            .push(MockEvent::Write(bytes[..accepted].to_vec()));
        Ok(accepted)
    }

    async fn drain(&mut self) -> Result<(), P1Error> {
        self.events.lock().unwrap().push(MockEvent::Drain);
        Ok(())
    }
}
