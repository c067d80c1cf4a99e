#![forbid(unsafe_code)]

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wspr_types::{FieldError, Message};

/// Symbol lines per record in the oracle's channel symbol section.
pub const SYMBOL_GROUPS: usize = 6;

/// Whitespace-separated fields that make up the message prefix of a line.
const MESSAGE_FIELDS: usize = 3;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("fixture line {line}: {detail}")]
    Format { line: usize, detail: String },
    #[error("fixture line {line}: {source}")]
    Field {
        line: usize,
        #[source]
        source: FieldError,
    },
}

/// A message the oracle round-tripped, paired with its channel symbols.
///
/// `symbols` is the six symbol lines joined by single spaces and is never
/// interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub message: String,
    pub symbols: String,
}

impl FixtureRecord {
    #[must_use]
    pub fn new(message: impl Into<String>, symbols: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            symbols: symbols.into(),
        }
    }

    /// `<message> <symbols>` without the trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{} {}", self.message, self.symbols)
    }

    pub fn parsed_message(&self) -> Result<Message, FieldError> {
        Message::parse(&self.message)
    }
}

/// Truncates `path` and writes one line per record, in order.
pub fn write_fixture_file(path: &Path, records: &[FixtureRecord]) -> Result<usize, FixtureError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let mut out = BufWriter::new(fs::File::create(path)?);
    for record in records {
        writeln!(out, "{}", record.to_line())?;
    }
    out.flush()?;
    Ok(records.len())
}

pub fn read_fixture_file(path: &Path) -> Result<Vec<FixtureRecord>, FixtureError> {
    parse_fixture_str(&fs::read_to_string(path)?)
}

pub fn parse_fixture_str(body: &str) -> Result<Vec<FixtureRecord>, FixtureError> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_fixture_line(line, idx + 1))
        .collect()
}

/// Splits one fixture line into its message and symbol block. `line_no` is
/// 1-based and only used in errors.
pub fn parse_fixture_line(line: &str, line_no: usize) -> Result<FixtureRecord, FixtureError> {
    let fields = line.split_whitespace().collect::<Vec<_>>();
    // Each symbol group contributes at least one token; WSPRcode's groups
    // carry 28 symbols apiece.
    if fields.len() < MESSAGE_FIELDS + SYMBOL_GROUPS {
        return Err(FixtureError::Format {
            line: line_no,
            detail: format!(
                "expected at least {} fields ({MESSAGE_FIELDS} message + {SYMBOL_GROUPS} symbol groups), found {}",
                MESSAGE_FIELDS + SYMBOL_GROUPS,
                fields.len()
            ),
        });
    }

    let Some((message, symbols)) = split_message_fields(line) else {
        return Err(FixtureError::Format {
            line: line_no,
            detail: "no separator between message and symbol block".to_owned(),
        });
    };
    let message = message.join(" ");
    Message::parse(&message).map_err(|source| FixtureError::Field {
        line: line_no,
        source,
    })?;

    Ok(FixtureRecord {
        message,
        symbols: symbols.to_owned(),
    })
}

/// The three message fields, and everything after the one separator that
/// follows them, untouched.
fn split_message_fields(line: &str) -> Option<([&str; MESSAGE_FIELDS], &str)> {
    let mut fields = [""; MESSAGE_FIELDS];
    let mut rest = line;
    for field in &mut fields {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        *field = &rest[..end];
        rest = &rest[end..];
    }
    let mut chars = rest.chars();
    chars.next()?;
    Some((fields, chars.as_str()))
}
