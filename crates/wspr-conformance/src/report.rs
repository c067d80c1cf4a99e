//! Scanner for the reference encoder's console report.
//!
//! For every input the oracle prints, in order: a `Message:` line echoing the
//! input, a `Channel symbols` header followed by six lines of symbols, and a
//! `Decoded message:` line whose 3rd to 5th whitespace tokens are its own
//! decode. Anything else is ignored. Records may follow each other with no
//! separator.

use std::mem;

use serde::{Deserialize, Serialize};
use wspr_fixture::SYMBOL_GROUPS;

use crate::HarnessError;

pub const MESSAGE_MARKER: &str = "Message:";
pub const SYMBOLS_MARKER: &str = "Channel symbols";
pub const DECODED_MARKER: &str = "Decoded message:";

/// Token positions of the decoded message on the `Decoded message:` line.
const DECODED_TOKEN_START: usize = 2;
const DECODED_TOKEN_COUNT: usize = 3;

/// One record as reported by the oracle, before any consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRecord {
    /// 1-based line of the `Message:` marker in the raw output.
    pub line: usize,
    pub echoed: String,
    pub symbols: String,
    pub decoded: String,
}

#[derive(Debug)]
struct OpenRecord {
    line: usize,
    echoed: String,
    groups: Vec<String>,
}

#[derive(Debug, Default)]
enum ScanState {
    #[default]
    SeekMessage,
    SeekSymbolsHeader(OpenRecord),
    CollectingSymbols {
        record: OpenRecord,
        remaining: usize,
    },
    SeekDecoded(OpenRecord),
}

/// Line-at-a-time state machine over raw oracle output.
#[derive(Debug, Default)]
pub struct ReportScanner {
    state: ScanState,
    line_no: usize,
    records: Vec<ParsedRecord>,
}

impl ReportScanner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_line(&mut self, line: &str) {
        self.line_no += 1;
        self.state = match mem::take(&mut self.state) {
            ScanState::SeekMessage => match line.find(MESSAGE_MARKER) {
                Some(at) => ScanState::SeekSymbolsHeader(OpenRecord {
                    line: self.line_no,
                    echoed: line[at + MESSAGE_MARKER.len()..].trim().to_owned(),
                    groups: Vec::with_capacity(SYMBOL_GROUPS),
                }),
                None => ScanState::SeekMessage,
            },
            ScanState::SeekSymbolsHeader(record) => {
                if line.contains(SYMBOLS_MARKER) {
                    ScanState::CollectingSymbols {
                        record,
                        remaining: SYMBOL_GROUPS,
                    }
                } else {
                    ScanState::SeekSymbolsHeader(record)
                }
            }
            ScanState::CollectingSymbols {
                mut record,
                remaining,
            } => {
                record
                    .groups
                    .push(line.split_whitespace().collect::<Vec<_>>().join(" "));
                if remaining > 1 {
                    ScanState::CollectingSymbols {
                        record,
                        remaining: remaining - 1,
                    }
                } else {
                    ScanState::SeekDecoded(record)
                }
            }
            ScanState::SeekDecoded(record) => {
                if line.contains(DECODED_MARKER) {
                    let decoded = line
                        .split_whitespace()
                        .skip(DECODED_TOKEN_START)
                        .take(DECODED_TOKEN_COUNT)
                        .collect::<Vec<_>>()
                        .join(" ");
                    self.records.push(ParsedRecord {
                        line: record.line,
                        echoed: record.echoed,
                        symbols: record.groups.join(" "),
                        decoded,
                    });
                    ScanState::SeekMessage
                } else {
                    ScanState::SeekDecoded(record)
                }
            }
        };
    }

    /// Number of records closed so far.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.records.len()
    }

    /// Ends the scan. A record still open at end of input means the oracle
    /// output was truncated or its format changed.
    pub fn finish(self) -> Result<Vec<ParsedRecord>, HarnessError> {
        let (marker, record) = match self.state {
            ScanState::SeekMessage => return Ok(self.records),
            ScanState::SeekSymbolsHeader(record) => (SYMBOLS_MARKER, record),
            ScanState::CollectingSymbols { record, .. } => ("channel symbol lines", record),
            ScanState::SeekDecoded(record) => (DECODED_MARKER, record),
        };
        Err(HarnessError::MalformedReport {
            marker,
            opened_at_line: record.line,
            echoed: record.echoed,
        })
    }
}

pub fn parse_oracle_report(raw: &str) -> Result<Vec<ParsedRecord>, HarnessError> {
    let mut scanner = ReportScanner::new();
    for line in raw.lines() {
        scanner.feed_line(line);
    }
    scanner.finish()
}
