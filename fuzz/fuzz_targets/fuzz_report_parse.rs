#![no_main]

use libfuzzer_sys::fuzz_target;
use wspr_conformance::{ReportScanner, parse_oracle_report, validate_records};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);

    let Ok(records) = parse_oracle_report(&raw) else {
        return;
    };

    // Feeding line by line must agree with the one-shot parse.
    let mut scanner = ReportScanner::new();
    for line in raw.lines() {
        scanner.feed_line(line);
    }
    assert_eq!(scanner.completed(), records.len());

    let count = records.len();
    let outcome = validate_records(records);
    assert_eq!(outcome.accepted.len() + outcome.mismatches.len(), count);
});
