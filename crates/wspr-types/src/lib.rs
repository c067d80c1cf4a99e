#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod generate;

pub const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const LOCATOR_LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQR";
pub const DIGITS: &[u8] = b"1234567890";
pub const CALLSIGN_LEAD: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ 1234567890";

/// Letters allowed after the mandatory `<lead><letter><digit>` prefix.
pub const MAX_CALLSIGN_SUFFIX: usize = 3;

pub const POWER_LEVELS_DBM: [u8; 19] = [
    0, 3, 7, 10, 13, 17, 20, 23, 27, 30, 33, 37, 40, 43, 47, 50, 53, 57, 60,
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("callsign {value:?} has length {len}, expected 3..=6")]
    CallsignLength { value: String, len: usize },
    #[error("callsign {value:?} has invalid character {found:?} at position {position}")]
    CallsignChar {
        value: String,
        position: usize,
        found: char,
    },
    #[error("callsign {value:?} starts with a space but has no trailing letter")]
    CallsignTooShortAfterSpace { value: String },
    #[error("locator {value:?} must be exactly 4 characters")]
    LocatorLength { value: String },
    #[error("locator {value:?} has invalid character {found:?} at position {position}")]
    LocatorChar {
        value: String,
        position: usize,
        found: char,
    },
    #[error("power level {dbm} dBm is not a legal WSPR power code")]
    UnsupportedPower { dbm: u8 },
    #[error("power level {value:?} is not an integer dBm value")]
    PowerNotNumeric { value: String },
    #[error("message {value:?} must have 3 whitespace-separated fields, found {count}")]
    MessageFieldCount { value: String, count: usize },
}

/// Station identifier obeying the positional WSPR character grammar.
///
/// The stored form keeps a leading space when position 0 is blank; the
/// oracle and the fixture file only ever see [`Callsign::trimmed`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Callsign(String);

impl Callsign {
    /// Parses the padded form (`" K1ABC"`, `"AB1CD"`).
    pub fn parse(value: &str) -> Result<Self, FieldError> {
        let bytes = value.as_bytes();
        if !(3..=3 + MAX_CALLSIGN_SUFFIX).contains(&bytes.len()) {
            return Err(FieldError::CallsignLength {
                value: value.to_owned(),
                len: value.chars().count(),
            });
        }

        for (position, byte) in bytes.iter().enumerate() {
            let alphabet = match position {
                0 => CALLSIGN_LEAD,
                1 => LETTERS,
                2 => DIGITS,
                _ => LETTERS,
            };
            if !alphabet.contains(byte) {
                return Err(FieldError::CallsignChar {
                    value: value.to_owned(),
                    position,
                    found: value[position..].chars().next().unwrap_or('\u{fffd}'),
                });
            }
        }

        if bytes[0] == b' ' && bytes.len() < 4 {
            return Err(FieldError::CallsignTooShortAfterSpace {
                value: value.to_owned(),
            });
        }

        Ok(Self(value.to_owned()))
    }

    /// Parses a callsign as it appears inside a message, where a blank
    /// position 0 has already been trimmed away.
    pub fn parse_trimmed(value: &str) -> Result<Self, FieldError> {
        match Self::parse(value) {
            Ok(callsign) => Ok(callsign),
            Err(direct) => Self::parse(&format!(" {value}")).map_err(|_| direct),
        }
    }

    pub(crate) fn from_grammar(raw: String) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn trimmed(&self) -> &str {
        self.0.trim()
    }

    #[must_use]
    pub fn has_leading_space(&self) -> bool {
        self.0.starts_with(' ')
    }

    #[must_use]
    pub fn suffix_len(&self) -> usize {
        self.0.len().saturating_sub(3)
    }
}

impl TryFrom<String> for Callsign {
    type Error = FieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Callsign> for String {
    fn from(value: Callsign) -> Self {
        value.0
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.trimmed())
    }
}

/// Four-character Maidenhead grid square, `AA00`..`RR99`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator(String);

impl Locator {
    pub fn parse(value: &str) -> Result<Self, FieldError> {
        let bytes = value.as_bytes();
        if bytes.len() != 4 {
            return Err(FieldError::LocatorLength {
                value: value.to_owned(),
            });
        }
        for (position, byte) in bytes.iter().enumerate() {
            let alphabet = if position < 2 { LOCATOR_LETTERS } else { DIGITS };
            if !alphabet.contains(byte) {
                return Err(FieldError::LocatorChar {
                    value: value.to_owned(),
                    position,
                    found: value[position..].chars().next().unwrap_or('\u{fffd}'),
                });
            }
        }
        Ok(Self(value.to_owned()))
    }

    pub(crate) fn from_grammar(raw: String) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Locator {
    type Error = FieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(value: Locator) -> Self {
        value.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PowerLevel(u8);

impl PowerLevel {
    pub fn from_dbm(dbm: u8) -> Result<Self, FieldError> {
        if POWER_LEVELS_DBM.contains(&dbm) {
            Ok(Self(dbm))
        } else {
            Err(FieldError::UnsupportedPower { dbm })
        }
    }

    pub fn parse(value: &str) -> Result<Self, FieldError> {
        let dbm = value
            .parse::<u8>()
            .map_err(|_| FieldError::PowerNotNumeric {
                value: value.to_owned(),
            })?;
        Self::from_dbm(dbm)
    }

    pub(crate) fn from_grammar(dbm: u8) -> Self {
        Self(dbm)
    }

    #[must_use]
    pub fn dbm(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for PowerLevel {
    type Error = FieldError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_dbm(value)
    }
}

impl From<PowerLevel> for u8 {
    fn from(value: PowerLevel) -> Self {
        value.0
    }
}

impl fmt::Display for PowerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A standard WSPR message. `Display` yields the canonical form the oracle
/// consumes and echoes back: `"<callsign> <locator> <power>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    pub callsign: Callsign,
    pub locator: Locator,
    pub power: PowerLevel,
}

impl Message {
    #[must_use]
    pub fn new(callsign: Callsign, locator: Locator, power: PowerLevel) -> Self {
        Self {
            callsign,
            locator,
            power,
        }
    }

    pub fn parse(value: &str) -> Result<Self, FieldError> {
        let fields = value.split_whitespace().collect::<Vec<_>>();
        let [callsign, locator, power] = fields.as_slice() else {
            return Err(FieldError::MessageFieldCount {
                value: value.to_owned(),
                count: fields.len(),
            });
        };
        Ok(Self {
            callsign: Callsign::parse_trimmed(callsign)?,
            locator: Locator::parse(locator)?,
            power: PowerLevel::parse(power)?,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.callsign, self.locator, self.power)
    }
}

/// Collapses every whitespace run to one space and drops the ends.
#[must_use]
pub fn normalize_message(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::{Callsign, FieldError, Locator, Message, PowerLevel, normalize_message};

    #[test]
    fn padded_callsign_requires_trailing_letter() {
        assert!(Callsign::parse(" B3X").is_ok());
        let err = Callsign::parse(" B3").expect_err("blank lead needs a suffix");
        assert_eq!(
            err,
            FieldError::CallsignTooShortAfterSpace {
                value: " B3".to_owned()
            }
        );
    }

    #[test]
    fn callsign_rejects_out_of_position_characters() {
        let err = Callsign::parse("A11").expect_err("position 1 must be a letter");
        assert!(matches!(
            err,
            FieldError::CallsignChar {
                position: 1,
                found: '1',
                ..
            }
        ));
        assert!(Callsign::parse("AB1CDEF").is_err());
        assert!(Callsign::parse("AB1C2").is_err());
    }

    #[test]
    fn trimmed_callsign_recovers_blank_lead() {
        let callsign = Callsign::parse_trimmed("K1ABC").expect("padded form");
        assert_eq!(callsign.as_str(), " K1ABC");
        assert!(callsign.has_leading_space());
        assert_eq!(callsign.to_string(), "K1ABC");

        let direct = Callsign::parse_trimmed("DB2LA").expect("direct form");
        assert_eq!(direct.as_str(), "DB2LA");
        assert_eq!(direct.suffix_len(), 2);
    }

    #[test]
    fn locator_letters_stop_at_r() {
        assert!(Locator::parse("RR99").is_ok());
        assert!(matches!(
            Locator::parse("SA00"),
            Err(FieldError::LocatorChar { position: 0, .. })
        ));
        assert!(Locator::parse("JO4").is_err());
    }

    #[test]
    fn power_levels_are_a_closed_set() {
        assert_eq!(PowerLevel::from_dbm(37).expect("legal").dbm(), 37);
        assert_eq!(
            PowerLevel::from_dbm(38),
            Err(FieldError::UnsupportedPower { dbm: 38 })
        );
        assert!(matches!(
            PowerLevel::parse("3x"),
            Err(FieldError::PowerNotNumeric { .. })
        ));
    }

    #[test]
    fn message_display_is_canonical_and_reparses() {
        let message = Message::parse("K1ABC  FN42 37").expect("message");
        assert_eq!(message.to_string(), "K1ABC FN42 37");
        assert_eq!(Message::parse(&message.to_string()), Ok(message));
    }

    #[test]
    fn message_requires_three_fields() {
        assert!(matches!(
            Message::parse("K1ABC FN42"),
            Err(FieldError::MessageFieldCount { count: 2, .. })
        ));
    }

    #[test]
    fn normalization_collapses_whitespace() {
        assert_eq!(normalize_message("  K1ABC\tFN42   37 \n"), "K1ABC FN42 37");
    }

    #[test]
    fn serde_keeps_padded_callsign_and_validates() {
        let message = Message::parse("K1ABC FN42 37").expect("message");
        let json = serde_json::to_string(&message).expect("serialize");
        assert!(json.contains("\" K1ABC\""));
        let back: Message = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, message);

        let bad = r#"{"callsign":"K1ABC","locator":"FN42","power":37}"#;
        assert!(serde_json::from_str::<Message>(bad).is_err());
    }
}
