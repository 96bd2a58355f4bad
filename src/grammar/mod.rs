//! The grammar module defines the bridge between a delimited telegram and the
//! parser that interprets its contents. The session only needs three calls
//! (`init`, `execute`, `finish`) and the resulting [`ParseOutcome`], so any
//! parser, hand-written or generated, can sit behind [`TelegramGrammar`].

pub mod obis;

pub use obis::{ObisGrammar, ObisRecord, ObisValue, ParsedTelegram, TelegramHeader, TelegramTimestamp};

use serde::Serialize;

/// Completion status reported by a grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ParseStatus {
    /// The final state was not reached.
    #[default]
    Incomplete,
    /// The final state was reached.
    Accepted,
    /// The input can never become a valid telegram.
    Rejected,
}

/// Result of one parse cycle. Not kept beyond the next read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ParseOutcome {
    pub status: ParseStatus,
    /// Number of malformed elements skipped while parsing.
    pub errors: u32,
    /// CRC field found in the telegram tail, if any.
    pub crc: Option<u16>,
}

impl ParseOutcome {
    /// Accepted with no errors.
    pub fn is_success(&self) -> bool {
        self.status == ParseStatus::Accepted && self.errors == 0
    }
}

/// Byte-sequence acceptor driven once per candidate telegram.
pub trait TelegramGrammar: Send {
    /// Resets all state from a previous telegram.
    fn init(&mut self);

    /// Feeds the next chunk; `is_final` marks the last chunk of the telegram.
    fn execute(&mut self, bytes: &[u8], is_final: bool);

    /// Reports the outcome for everything fed since `init`.
    fn finish(&mut self) -> ParseOutcome;
}
