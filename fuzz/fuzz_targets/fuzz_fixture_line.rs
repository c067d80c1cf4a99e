#![no_main]

use libfuzzer_sys::fuzz_target;
use wspr_fixture::{parse_fixture_line, parse_fixture_str};

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };
    let _ = parse_fixture_str(body);

    let Some(line) = body.lines().next() else {
        return;
    };
    if let Ok(record) = parse_fixture_line(line, 1) {
        let reparsed = parse_fixture_line(&record.to_line(), 1).expect("canonical line reparses");
        assert_eq!(reparsed, record);
    }
});
