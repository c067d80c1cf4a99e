use serde::{Deserialize, Serialize};
use tracing::warn;
use wspr_fixture::FixtureRecord;
use wspr_types::normalize_message;

use crate::report::ParsedRecord;

/// The oracle decoded something other than what it was asked to encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleMismatch {
    pub line: usize,
    pub decoded: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub accepted: Vec<FixtureRecord>,
    pub mismatches: Vec<OracleMismatch>,
}

pub fn validate_record(record: ParsedRecord) -> Result<FixtureRecord, OracleMismatch> {
    if normalize_message(&record.decoded) == normalize_message(&record.echoed) {
        Ok(FixtureRecord::new(record.echoed, record.symbols))
    } else {
        Err(OracleMismatch {
            line: record.line,
            decoded: record.decoded,
            source: record.echoed,
        })
    }
}

/// Keeps self-consistent records in order and drops the rest, warning once
/// per dropped record.
pub fn validate_records(records: impl IntoIterator<Item = ParsedRecord>) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();
    for record in records {
        match validate_record(record) {
            Ok(accepted) => outcome.accepted.push(accepted),
            Err(mismatch) => {
                warn!(
                    line = mismatch.line,
                    decoded = %mismatch.decoded,
                    source = %mismatch.source,
                    "reference encoder mismatch, skipping this message"
                );
                outcome.mismatches.push(mismatch);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use wspr_fixture::FixtureRecord;

    use super::{OracleMismatch, validate_record, validate_records};
    use crate::report::ParsedRecord;

    fn parsed(echoed: &str, decoded: &str) -> ParsedRecord {
        ParsedRecord {
            line: 1,
            echoed: echoed.to_owned(),
            symbols: "111 222 333 444 555 666".to_owned(),
            decoded: decoded.to_owned(),
        }
    }

    #[test]
    fn matching_decode_becomes_fixture_record() {
        let record = validate_record(parsed("K1ABC AB12 37", "K1ABC AB12 37")).expect("accepted");
        assert_eq!(
            record,
            FixtureRecord::new("K1ABC AB12 37", "111 222 333 444 555 666")
        );
        assert_eq!(record.to_line(), "K1ABC AB12 37 111 222 333 444 555 666");
    }

    #[test]
    fn diverging_decode_is_rejected_with_both_values() {
        let mismatch =
            validate_record(parsed("K1ABC AB12 37", "K1ABD AB12 37")).expect_err("rejected");
        assert_eq!(
            mismatch,
            OracleMismatch {
                line: 1,
                decoded: "K1ABD AB12 37".to_owned(),
                source: "K1ABC AB12 37".to_owned(),
            }
        );
    }

    #[test]
    fn whitespace_differences_are_not_mismatches() {
        assert!(validate_record(parsed("K1ABC AB12 37", "K1ABC  AB12\t37")).is_ok());
    }

    #[test]
    fn filter_keeps_order_and_counts_each_mismatch_once() {
        let records = vec![
            parsed("K1ABC AB12 37", "K1ABC AB12 37"),
            parsed("K1ABD AB12 37", "K1ABD AB12 30"),
            parsed("DB2LA JO43 30", "DB2LA JO43 30"),
            parsed("Q0P RR99 0", "Q0P RR99"),
        ];
        let outcome = validate_records(records);
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.mismatches.len(), 2);
        assert_eq!(outcome.accepted[0].message, "K1ABC AB12 37");
        assert_eq!(outcome.accepted[1].message, "DB2LA JO43 30");
        assert_eq!(outcome.mismatches[0].source, "K1ABD AB12 37");
        assert_eq!(outcome.mismatches[1].source, "Q0P RR99 0");
    }
}
