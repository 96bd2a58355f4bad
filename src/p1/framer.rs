//! # Telegram Framer
//!
//! Pulls bytes one at a time from a [`SerialTransport`] and delimits the next
//! telegram. The scan has three states:
//!
//! - *searching*: everything up to the next `/` is discarded,
//! - *accumulating*: bytes are collected until `!` or until the buffer fills,
//! - *verifying tail*: the bytes after `!` decide between a legacy (`!\r\n`)
//!   and a CRC-bearing (`!HHHH\r\n`) telegram.
//!
//! A candidate that overflows the buffer or has a malformed tail is dropped,
//! its bytes are charged to a failure counter, and scanning resumes. Scanning
//! gives up when the source runs dry or when the counter reaches the budget.

use crate::constants::{CR, TELEGRAM_END, TELEGRAM_START};
use crate::p1::buffer::TelegramBuffer;
use crate::transport::SerialTransport;
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Searching,
    Accumulating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TailVerdict {
    Legacy,
    CrcBearing,
    /// Not a telegram; `dropped` probe bytes did not fit into the buffer.
    Invalid { dropped: usize },
}

/// Result of reading a fixed number of bytes after `!`.
#[derive(Debug, Clone, Copy)]
struct Probe {
    requested: usize,
    obtained: usize,
    dropped: usize,
}

impl Probe {
    fn complete(&self) -> bool {
        self.obtained == self.requested && self.dropped == 0
    }
}

/// Byte-stream framer with a bounded resync budget.
#[derive(Debug, Clone, Copy)]
pub struct TelegramFramer {
    max_fail_bytes: usize,
}

impl TelegramFramer {
    /// `max_fail_bytes == 0` allows unbounded resync attempts.
    pub fn new(max_fail_bytes: usize) -> Self {
        TelegramFramer { max_fail_bytes }
    }

    /// Reads the next complete telegram into `buffer` and returns its length.
    ///
    /// Returns 0 when the source yields no more bytes (timeout, end of file
    /// or read error) or when the failure budget is exhausted. On success the
    /// buffer holds exactly the telegram, from `/` through the final `\n`.
    pub async fn read_telegram<S>(&self, source: &mut S, buffer: &mut TelegramBuffer) -> usize
    where
        S: SerialTransport + ?Sized,
    {
        let mut state = ScanState::Searching;
        let mut failed = 0usize;
        let mut skipped = 0usize;
        buffer.clear();

        loop {
            let Some(byte) = next_byte(source).await else {
                debug!("Source exhausted after {failed} failed and {skipped} skipped bytes");
                buffer.clear();
                return 0;
            };

            match state {
                ScanState::Searching => {
                    if byte == TELEGRAM_START {
                        debug!("Possible telegram found after {skipped} skipped bytes");
                        buffer.clear();
                        if buffer.push(byte) {
                            state = ScanState::Accumulating;
                        }
                        skipped = 0;
                    } else {
                        skipped += 1;
                    }
                }
                ScanState::Accumulating => {
                    if !buffer.push(byte) {
                        debug!("Buffer overflow before valid telegram end, restart scanning");
                        failed += buffer.len();
                        buffer.clear();
                        state = ScanState::Searching;
                    } else if byte == TELEGRAM_END {
                        debug!("Possible telegram end at offset {}", buffer.len() - 1);
                        match verify_tail(source, buffer).await {
                            TailVerdict::Legacy => {
                                debug!("Old-style telegram with length {}", buffer.len());
                                return buffer.len();
                            }
                            TailVerdict::CrcBearing => {
                                debug!("New-style telegram with length {}", buffer.len());
                                return buffer.len();
                            }
                            TailVerdict::Invalid { dropped } => {
                                debug!("Invalid telegram, restart scanning");
                                failed += buffer.len() + dropped;
                                buffer.clear();
                                state = ScanState::Searching;
                            }
                        }
                    }
                }
            }

            if self.max_fail_bytes != 0 && failed >= self.max_fail_bytes {
                debug!("Giving up after {failed} bytes without a valid telegram");
                buffer.clear();
                return 0;
            }
        }
    }
}

async fn next_byte<S>(source: &mut S) -> Option<u8>
where
    S: SerialTransport + ?Sized,
{
    match source.read_byte().await {
        Ok(byte) => byte,
        Err(e) => {
            warn!("Read error while scanning for telegram: {e}");
            None
        }
    }
}

/// Attempts `count` reads, appending whatever arrives.
///
/// Every read is attempted even after a miss so the byte count after `!`
/// stays in step with the stream.
async fn probe<S>(source: &mut S, buffer: &mut TelegramBuffer, count: usize) -> Probe
where
    S: SerialTransport + ?Sized,
{
    let mut result = Probe {
        requested: count,
        obtained: 0,
        dropped: 0,
    };

    for _ in 0..count {
        if let Some(byte) = next_byte(source).await {
            result.obtained += 1;
            if !buffer.push(byte) {
                result.dropped += 1;
            }
        }
    }

    result
}

/// Decides what follows the `!` that was just appended to `buffer`.
async fn verify_tail<S>(source: &mut S, buffer: &mut TelegramBuffer) -> TailVerdict
where
    S: SerialTransport + ?Sized,
{
    let end = buffer.len() - 1;

    let first = probe(source, buffer, 2).await;
    if !first.complete() {
        return TailVerdict::Invalid {
            dropped: first.dropped,
        };
    }
    if buffer.get(end + 1) == Some(CR) {
        return TailVerdict::Legacy;
    }

    // Two CRC digits read so far, two more plus CR LF to go
    let second = probe(source, buffer, 4).await;
    if second.complete() && buffer.get(end + 5) == Some(CR) {
        TailVerdict::CrcBearing
    } else {
        TailVerdict::Invalid {
            dropped: second.dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    async fn frame(input: &[u8], capacity: usize, max_fail_bytes: usize) -> (usize, Vec<u8>) {
        let mut source = MockTransport::new();
        source.queue_rx_data(input);
        let mut buffer = TelegramBuffer::with_capacity(capacity).unwrap();
        let len = TelegramFramer::new(max_fail_bytes)
            .read_telegram(&mut source, &mut buffer)
            .await;
        (len, buffer.as_slice().to_vec())
    }

    #[tokio::test]
    async fn test_legacy_telegram() {
        let (len, data) = frame(b"xx/KFM5\r\n\r\n0-0:96.1.1(1)\r\n!\r\nyy", 256, 0).await;
        assert_eq!(len, 27);
        assert_eq!(data, b"/KFM5\r\n\r\n0-0:96.1.1(1)\r\n!\r\n");
    }

    #[tokio::test]
    async fn test_crc_telegram() {
        let (len, data) = frame(b"/ISK5\r\n!ABCD\r\n", 256, 0).await;
        assert_eq!(len, 14);
        assert_eq!(data, b"/ISK5\r\n!ABCD\r\n");
    }

    #[tokio::test]
    async fn test_minimal_legacy_frame() {
        let (len, data) = frame(b"/!\r\n", 4, 0).await;
        assert_eq!(len, 4);
        assert_eq!(data, b"/!\r\n");
    }

    #[tokio::test]
    async fn test_empty_source() {
        let (len, data) = frame(b"", 64, 0).await;
        assert_eq!(len, 0);
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_noise_without_start_marker_is_not_charged() {
        // 300 bytes of noise never reach a 10 byte budget: only candidates count
        let noise = vec![b'x'; 300];
        let mut input = noise.clone();
        input.extend_from_slice(b"/A!\r\n");
        let (len, data) = frame(&input, 64, 10).await;
        assert_eq!(len, 5);
        assert_eq!(data, b"/A!\r\n");
    }

    #[tokio::test]
    async fn test_truncated_crc_tail_is_rejected() {
        let (len, _) = frame(b"/ISK5\r\n!AB", 256, 0).await;
        assert_eq!(len, 0);
    }

    #[tokio::test]
    async fn test_tail_that_does_not_fit_is_rejected() {
        // "!" lands in the last slot, the CRC tail has nowhere to go
        let (len, data) = frame(b"/ABCDEFG!ABCD\r\n/A!\r\n", 9, 0).await;
        assert_eq!(len, 5);
        assert_eq!(data, b"/A!\r\n");
    }

    #[tokio::test]
    async fn test_read_error_ends_scan() {
        let mut source = MockTransport::new();
        source.queue_rx_data(b"/A!\r\n");
        source.set_next_read_error(std::io::Error::new(
            std::io::ErrorKind::Other,
            "line broke",
        ));
        let mut buffer = TelegramBuffer::with_capacity(64).unwrap();
        let len = TelegramFramer::new(0)
            .read_telegram(&mut source, &mut buffer)
            .await;
        assert_eq!(len, 0);
        assert_eq!(source.pending_rx(), 5);
    }
}
