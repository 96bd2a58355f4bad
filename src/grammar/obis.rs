//! # OBIS Telegram Grammar
//!
//! Parses the ASCII contents of DSMR P1 and IEC 62056-21 D0 telegrams with
//! `nom`:
//!
//! ```text
//! /ISK5\2MT382-1000            header: '/', 3 letter manufacturer, baud id, identification
//!
//! 1-0:1.8.1(000123.456*kWh)    data line: OBIS id followed by one or more (value[*unit])
//! 0-1:24.3.0(090212160000)(m3) values may continue on a line starting with '('
//! (00000.000)
//! !1E2B                        terminator: '!' with optional 4 hex digit CRC
//! ```
//!
//! D0 data blocks may start with STX (0x02) and stop right at `!`.
//!
//! Lines are parsed independently: a malformed data line is counted as an
//! error and skipped, a malformed header rejects the telegram, and a telegram
//! without terminator stays incomplete.

use super::{ParseOutcome, ParseStatus, TelegramGrammar};
use crate::constants::STX;
use chrono::NaiveDateTime;
use log::debug;
use nom::{
    bytes::complete::{take_till, take_while1, take_while_m_n},
    character::complete::{anychar, char},
    combinator::{all_consuming, map, map_res, opt},
    multi::many1,
    sequence::{delimited, pair, preceded},
    IResult,
};
use serde::Serialize;

/// OBIS id of the telegram timestamp.
const TIMESTAMP_ID: &str = "0-0:1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelegramHeader {
    /// Three letter manufacturer code, e.g. `ISK`.
    pub manufacturer: String,
    /// Baud rate identifier (`5` for DSMR P1 meters).
    pub baud_id: char,
    /// Remainder of the identification line.
    pub identification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObisValue {
    /// Text between the parentheses.
    pub raw: String,
    /// Numeric part, when it parses as a number.
    pub number: Option<f64>,
    /// Unit after `*`, e.g. `kWh`.
    pub unit: Option<String>,
}

impl ObisValue {
    fn parse(raw: &str) -> Self {
        let (number, unit) = match raw.split_once('*') {
            Some((number, unit)) => (number, Some(unit.to_string())),
            None => (raw, None),
        };
        ObisValue {
            raw: raw.to_string(),
            number: number.parse::<f64>().ok(),
            unit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObisRecord {
    pub id: String,
    pub values: Vec<ObisValue>,
}

impl ObisRecord {
    /// First value, the only one for most records.
    pub fn value(&self) -> Option<&ObisValue> {
        self.values.first()
    }
}

/// Meter local time from `YYMMDDhhmmssX`, where `X` is `S` (summer) or `W`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelegramTimestamp {
    pub local: NaiveDateTime,
    pub dst: Option<bool>,
}

impl TelegramTimestamp {
    pub fn parse(raw: &str) -> Option<Self> {
        let digits = raw.get(..12)?;
        let local = NaiveDateTime::parse_from_str(digits, "%y%m%d%H%M%S").ok()?;
        let dst = match raw.get(12..) {
            Some("S") => Some(true),
            Some("W") => Some(false),
            _ => None,
        };
        Some(TelegramTimestamp { local, dst })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedTelegram {
    pub header: TelegramHeader,
    pub records: Vec<ObisRecord>,
    pub timestamp: Option<TelegramTimestamp>,
    pub crc: Option<u16>,
}

impl ParsedTelegram {
    pub fn get(&self, id: &str) -> Option<&ObisRecord> {
        self.records.iter().find(|record| record.id == id)
    }
}

fn header(input: &str) -> IResult<&str, TelegramHeader> {
    let (input, _) = char('/')(input)?;
    let (input, manufacturer) = take_while_m_n(3, 3, |c: char| c.is_ascii_alphabetic())(input)?;
    let (input, baud_id) = anychar(input)?;
    let (input, identification) = take_till(|c: char| c.is_ascii_control())(input)?;
    Ok((
        input,
        TelegramHeader {
            manufacturer: manufacturer.to_string(),
            baud_id,
            identification: identification.to_string(),
        },
    ))
}

fn obis_id(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '.' | '*' | '&'))(
        input,
    )
}

fn value_group(input: &str) -> IResult<&str, ObisValue> {
    map(
        delimited(char('('), take_till(|c: char| c == ')' || c == '('), char(')')),
        ObisValue::parse,
    )(input)
}

fn data_line(input: &str) -> IResult<&str, (&str, Vec<ObisValue>)> {
    all_consuming(pair(obis_id, many1(value_group)))(input)
}

fn continuation_line(input: &str) -> IResult<&str, Vec<ObisValue>> {
    all_consuming(many1(value_group))(input)
}

fn crc_digits(input: &str) -> IResult<&str, u16> {
    map_res(take_while_m_n(4, 4, |c: char| c.is_ascii_hexdigit()), |digits| {
        u16::from_str_radix(digits, 16)
    })(input)
}

fn terminator_line(input: &str) -> IResult<&str, Option<u16>> {
    all_consuming(preceded(char('!'), opt(crc_digits)))(input)
}

/// Default grammar for DSMR P1 and IEC 62056-21 telegrams.
#[derive(Debug, Default)]
pub struct ObisGrammar {
    data: Vec<u8>,
    is_final: bool,
    parsed: Option<ParsedTelegram>,
}

impl ObisGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Telegram parsed by the last `finish`, if the header was valid.
    pub fn parsed(&self) -> Option<&ParsedTelegram> {
        self.parsed.as_ref()
    }

    pub fn take_parsed(&mut self) -> Option<ParsedTelegram> {
        self.parsed.take()
    }

    fn parse(&self) -> (ParseOutcome, Option<ParsedTelegram>) {
        let mut outcome = ParseOutcome::default();
        if self.data.is_empty() {
            return (outcome, None);
        }

        let text = String::from_utf8_lossy(&self.data);
        let mut lines = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line));

        let header = match lines.next().map(header) {
            Some(Ok((_, header))) => header,
            _ => {
                debug!("Telegram header rejected");
                outcome.status = ParseStatus::Rejected;
                outcome.errors = 1;
                return (outcome, None);
            }
        };

        let mut telegram = ParsedTelegram {
            header,
            records: Vec::new(),
            timestamp: None,
            crc: None,
        };

        for line in lines {
            let line = line.trim_start_matches(char::from(STX)).trim_end();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('!') {
                match terminator_line(line) {
                    Ok((_, crc)) => telegram.crc = crc,
                    Err(_) => {
                        debug!("Malformed telegram terminator: {line:?}");
                        outcome.errors += 1;
                    }
                }
                outcome.status = ParseStatus::Accepted;
                break;
            }

            if line.starts_with('(') {
                match (continuation_line(line), telegram.records.last_mut()) {
                    (Ok((_, values)), Some(record)) => record.values.extend(values),
                    _ => {
                        debug!("Malformed continuation line: {line:?}");
                        outcome.errors += 1;
                    }
                }
                continue;
            }

            match data_line(line) {
                Ok((_, (id, values))) => telegram.records.push(ObisRecord {
                    id: id.to_string(),
                    values,
                }),
                Err(_) => {
                    debug!("Malformed data line: {line:?}");
                    outcome.errors += 1;
                }
            }
        }

        telegram.timestamp = telegram
            .get(TIMESTAMP_ID)
            .and_then(ObisRecord::value)
            .and_then(|value| TelegramTimestamp::parse(&value.raw));
        outcome.crc = telegram.crc;

        if outcome.status == ParseStatus::Incomplete && self.is_final {
            debug!("Final chunk parsed without telegram terminator");
        }

        (outcome, Some(telegram))
    }
}

impl TelegramGrammar for ObisGrammar {
    fn init(&mut self) {
        self.data.clear();
        self.is_final = false;
        self.parsed = None;
    }

    fn execute(&mut self, bytes: &[u8], is_final: bool) {
        self.data.extend_from_slice(bytes);
        self.is_final = is_final;
    }

    fn finish(&mut self) -> ParseOutcome {
        let (outcome, parsed) = self.parse();
        self.parsed = parsed;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const DSMR4: &[u8] = b"/ISK5\\2MT382-1000\r\n\
\r\n\
1-3:0.2.8(50)\r\n\
0-0:1.0.0(101209113020W)\r\n\
0-0:96.1.1(4B384547303034303436333935353037)\r\n\
1-0:1.8.1(123456.789*kWh)\r\n\
1-0:1.8.2(123456.789*kWh)\r\n\
0-0:96.14.0(0002)\r\n\
1-0:1.7.0(01.193*kW)\r\n\
0-0:96.13.0()\r\n\
!EF2F\r\n";

    fn parse(input: &[u8]) -> (ParseOutcome, Option<ParsedTelegram>) {
        let mut grammar = ObisGrammar::new();
        grammar.init();
        grammar.execute(input, true);
        let outcome = grammar.finish();
        (outcome, grammar.take_parsed())
    }

    #[test]
    fn test_dsmr4_telegram() {
        let (outcome, parsed) = parse(DSMR4);
        assert!(outcome.is_success());
        assert_eq!(outcome.crc, Some(0xEF2F));

        let telegram = parsed.unwrap();
        assert_eq!(telegram.header.manufacturer, "ISK");
        assert_eq!(telegram.header.baud_id, '5');
        assert_eq!(telegram.header.identification, "\\2MT382-1000");
        assert_eq!(telegram.records.len(), 8);

        let energy = telegram.get("1-0:1.8.1").unwrap().value().unwrap();
        assert_eq!(energy.number, Some(123456.789));
        assert_eq!(energy.unit.as_deref(), Some("kWh"));

        let empty = telegram.get("0-0:96.13.0").unwrap().value().unwrap();
        assert_eq!(empty.raw, "");
        assert_eq!(empty.number, None);
    }

    #[test]
    fn test_timestamp() {
        let (_, parsed) = parse(DSMR4);
        let timestamp = parsed.unwrap().timestamp.unwrap();
        let expected = NaiveDate::from_ymd_opt(2010, 12, 9)
            .unwrap()
            .and_hms_opt(11, 30, 20)
            .unwrap();
        assert_eq!(timestamp.local, expected);
        assert_eq!(timestamp.dst, Some(false));

        assert!(TelegramTimestamp::parse("101309113020W").is_none());
        assert_eq!(TelegramTimestamp::parse("200601120000S").unwrap().dst, Some(true));
    }

    #[test]
    fn test_d0_telegram_with_stx() {
        let (outcome, parsed) = parse(b"/ISk5MT174-0001\r\n\x020.0.0(00339188)\r\n1.8.0(0011404.409*kWh)\r\n!");
        assert_eq!(outcome.status, ParseStatus::Accepted);
        assert_eq!(outcome.errors, 0);
        assert_eq!(outcome.crc, None);

        let telegram = parsed.unwrap();
        assert_eq!(telegram.header.manufacturer, "ISk");
        assert_eq!(telegram.records[0].id, "0.0.0");
        assert_eq!(telegram.records[1].value().unwrap().number, Some(11404.409));
    }

    #[test]
    fn test_continuation_line() {
        let (outcome, parsed) = parse(
            b"/KMP5 KA6U001585575011\r\n\r\n0-1:24.3.0(090212160000)(00)(60)(1)(0-1:24.2.1)(m3)\r\n(00000.000)\r\n!\r\n",
        );
        assert!(outcome.is_success());
        let record = &parsed.unwrap().records[0];
        assert_eq!(record.values.len(), 7);
        assert_eq!(record.values[6].number, Some(0.0));
    }

    #[test]
    fn test_malformed_lines_are_counted() {
        let (outcome, parsed) = parse(b"/ISK5\\2MT382-1000\r\n1-0:1.8.1(1*kWh\r\ngarbage\r\n1-0:1.8.2(2*kWh)\r\n!\r\n");
        assert_eq!(outcome.status, ParseStatus::Accepted);
        assert_eq!(outcome.errors, 2);
        assert!(!outcome.is_success());
        assert_eq!(parsed.unwrap().records.len(), 1);
    }

    #[test]
    fn test_bad_header_rejects() {
        let (outcome, parsed) = parse(b"ISK5\r\n1-0:1.8.1(1*kWh)\r\n!\r\n");
        assert_eq!(outcome.status, ParseStatus::Rejected);
        assert!(parsed.is_none());

        let (outcome, _) = parse(b"/I5\r\n!\r\n");
        assert_eq!(outcome.status, ParseStatus::Rejected);
    }

    #[test]
    fn test_missing_terminator_is_incomplete() {
        let (outcome, parsed) = parse(b"/ISK5\\2MT382-1000\r\n\r\n1-0:1.8.1(1*kWh)\r\n");
        assert_eq!(outcome.status, ParseStatus::Incomplete);
        assert_eq!(parsed.unwrap().records.len(), 1);
    }

    #[test]
    fn test_malformed_crc_counts_as_error() {
        let (outcome, _) = parse(b"/ISK5\\2MT382-1000\r\n!12\r\n");
        assert_eq!(outcome.status, ParseStatus::Accepted);
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.crc, None);
    }

    #[test]
    fn test_init_resets_state() {
        let mut grammar = ObisGrammar::new();
        grammar.init();
        grammar.execute(DSMR4, true);
        grammar.finish();
        assert!(grammar.parsed().is_some());

        grammar.init();
        assert!(grammar.parsed().is_none());
        assert_eq!(grammar.finish().status, ParseStatus::Incomplete);
    }

    #[test]
    fn test_chunked_input() {
        let mut grammar = ObisGrammar::new();
        grammar.init();
        let (first, second) = DSMR4.split_at(40);
        grammar.execute(first, false);
        grammar.execute(second, true);
        assert!(grammar.finish().is_success());
    }
}
